//! Core data model.
//!
//! Attribute options come out of a configurator schema. A variant is one
//! concrete pick per attribute. Variants travel through the queue as their
//! canonical JSON and come back as outcomes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

// ---------------------------------------------------------------------------
// Option values
// ---------------------------------------------------------------------------

/// A single selectable value for an attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl OptionValue {
    pub fn is_bool(&self) -> bool {
        matches!(self, OptionValue::Bool(_))
    }
}

impl From<bool> for OptionValue {
    fn from(b: bool) -> Self {
        OptionValue::Bool(b)
    }
}

impl From<i64> for OptionValue {
    fn from(n: i64) -> Self {
        OptionValue::Number(n.into())
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        OptionValue::Text(s.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(s: String) -> Self {
        OptionValue::Text(s)
    }
}

impl std::fmt::Display for OptionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{b}"),
            OptionValue::Number(n) => write!(f, "{n}"),
            OptionValue::Text(s) => write!(f, "{s}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Attribute options
// ---------------------------------------------------------------------------

/// Attribute name to its allowed values.
///
/// Every list is non-empty. Iteration is in attribute-name order, which is
/// what makes seeded draws reproducible.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttributeOptions(BTreeMap<String, Vec<OptionValue>>);

impl AttributeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute. Returns `false` and leaves the map untouched when
    /// `values` is empty.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<OptionValue>) -> bool {
        if values.is_empty() {
            return false;
        }
        self.0.insert(name.into(), values);
        true
    }

    pub fn get(&self, name: &str) -> Option<&[OptionValue]> {
        self.0.get(name).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[OptionValue])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Size of the full Cartesian product, saturating at `u64::MAX`.
    pub fn combinations(&self) -> u64 {
        if self.0.is_empty() {
            return 0;
        }
        self.0
            .values()
            .fold(1u64, |acc, v| acc.saturating_mul(v.len() as u64))
    }
}

impl<K: Into<String>> FromIterator<(K, Vec<OptionValue>)> for AttributeOptions {
    fn from_iter<I: IntoIterator<Item = (K, Vec<OptionValue>)>>(iter: I) -> Self {
        let mut options = Self::new();
        for (name, values) in iter {
            options.insert(name, values);
        }
        options
    }
}

// ---------------------------------------------------------------------------
// Variant
// ---------------------------------------------------------------------------

/// One value per attribute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Variant(BTreeMap<String, OptionValue>);

impl Variant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: OptionValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compact JSON with keys in ascending order.
    pub fn canonical_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    /// Parse a payload previously produced by [`Variant::canonical_json`].
    pub fn from_canonical(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// Lowercase hex SHA-256 of a canonical payload.
pub fn content_hash(payload: &str) -> String {
    hex::encode(Sha256::digest(payload.as_bytes()))
}

// ---------------------------------------------------------------------------
// Queue entries
// ---------------------------------------------------------------------------

/// A variant ready to be appended to the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQueueEntry {
    pub hash: String,
    pub payload: String,
}

impl NewQueueEntry {
    pub fn from_variant(variant: &Variant) -> Result<Self> {
        let payload = variant.canonical_json()?;
        Ok(Self {
            hash: content_hash(&payload),
            payload,
        })
    }
}

/// A stored queue row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// Monotonic surrogate key.
    pub id: i64,
    /// Content hash, unique among live rows.
    pub hash: String,
    /// Canonical variant JSON.
    pub payload: String,
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of delivering one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        status: u16,
        body: String,
    },
    /// Non-200 status, or a transport error when `status` is `None`.
    Failure {
        status: Option<u16>,
        body: String,
    },
    Timeout,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    /// Metric / log label.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success { .. } => "success",
            Outcome::Failure { .. } => "failure",
            Outcome::Timeout => "timeout",
        }
    }
}

// ---------------------------------------------------------------------------
// Finished records
// ---------------------------------------------------------------------------

/// The outcome of one claimed queue entry, as written by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishedRecord {
    /// Id of the originating queue entry.
    pub id: i64,
    pub outcome: Outcome,
    pub finished_at: DateTime<Utc>,
}

impl FinishedRecord {
    pub fn new(id: i64, outcome: Outcome) -> Self {
        Self {
            id,
            outcome,
            finished_at: Utc::now(),
        }
    }
}
