//! Attribute option extraction from configurator schema documents.
//!
//! A schema document is the configurator's page export:
//! `d.Pages[].Screens[].ScreenOptions[]`. Only the first screen option of
//! each screen describes the attribute; its `DisplayType` selects the rule
//! that produces the allowed values.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{AttributeOptions, OptionValue};

/// Placeholder used for free-text controls.
pub const TEXT_PLACEHOLDER: &str = "test";
/// Placeholder used for numeric controls.
pub const NUMERIC_PLACEHOLDER: i64 = 12345;

// ---------------------------------------------------------------------------
// Document shape
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SchemaDocument {
    d: SchemaBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SchemaBody {
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Page {
    screens: Vec<Screen>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Screen {
    #[serde(default)]
    screen_options: Option<Vec<ScreenOption>>,
}

/// The attribute-bearing part of a screen.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScreenOption {
    pub name: String,
    pub display_type: String,
    #[serde(default)]
    pub selectable_values: Option<Vec<SelectableValue>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SelectableValue {
    pub value: OptionValue,
}

// ---------------------------------------------------------------------------
// Control kinds
// ---------------------------------------------------------------------------

/// The closed set of controls the extractor understands.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlKind {
    /// `CheckBox`
    Boolean,
    /// `TextBox`
    FreeText,
    /// `NumericTextBox`
    Numeric,
    /// Any other display type that carries a value list.
    Enumerated(Vec<OptionValue>),
    /// Any other display type without a value list.
    Unsupported(String),
}

impl ControlKind {
    pub fn classify(option: &ScreenOption) -> Self {
        match option.display_type.as_str() {
            "CheckBox" => ControlKind::Boolean,
            "TextBox" => ControlKind::FreeText,
            "NumericTextBox" => ControlKind::Numeric,
            other => match &option.selectable_values {
                Some(values) => {
                    ControlKind::Enumerated(values.iter().map(|v| v.value.clone()).collect())
                }
                None => ControlKind::Unsupported(other.to_string()),
            },
        }
    }

    /// Allowed values for this control. May be empty.
    pub fn options(self) -> Vec<OptionValue> {
        match self {
            ControlKind::Boolean => vec![OptionValue::Bool(true), OptionValue::Bool(false)],
            ControlKind::FreeText => vec![OptionValue::from(TEXT_PLACEHOLDER)],
            ControlKind::Numeric => vec![OptionValue::from(NUMERIC_PLACEHOLDER)],
            ControlKind::Enumerated(values) => values,
            ControlKind::Unsupported(_) => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Build attribute options from a parsed document.
///
/// Controls that yield no values are skipped. A later screen with the same
/// attribute name replaces an earlier one.
pub fn extract(document: &SchemaDocument) -> AttributeOptions {
    let mut options = AttributeOptions::new();

    for page in &document.d.pages {
        for screen in &page.screens {
            let Some(option) = screen.screen_options.as_ref().and_then(|o| o.first()) else {
                continue;
            };

            let kind = ControlKind::classify(option);
            if let ControlKind::Unsupported(ref display_type) = kind {
                debug!(attribute = %option.name, display_type = %display_type, "skipping unsupported control");
            }

            if !options.insert(option.name.clone(), kind.options()) {
                debug!(attribute = %option.name, "skipping control with no options");
            }
        }
    }

    options
}

impl AttributeOptions {
    /// Parse a schema document and extract its attribute options.
    pub fn from_schema_str(json: &str) -> Result<Self> {
        let document: SchemaDocument =
            serde_json::from_str(json).map_err(|e| Error::Schema(e.to_string()))?;
        Ok(extract(&document))
    }

    /// Read and extract a schema document from disk.
    pub fn from_schema_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_schema_str(&content)
            .map_err(|e| Error::Schema(format!("{}: {e}", path.display())))
    }
}

/// Schema files in a directory: regular `*.json` files, sorted by file name.
///
/// Generation carries one random stream across files, so the order is fixed
/// here rather than left to the directory listing.
pub fn schema_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();

    debug!(dir = %dir.display(), count = files.len(), "found schema files");
    Ok(files)
}
