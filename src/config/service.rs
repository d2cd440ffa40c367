//! Configurator service identity, loaded from TOML.
//!
//! ```toml
//! [service]
//! application_name = "DEMO_APP"
//! instance_name = "DEMO_APP"
//! service_url = "https://configurator.example.com/api/v3/ProductConfigurator.svc"
//! part_namespace = "Demo"
//! part_number = "OfficeTable"
//! profile = "Default"
//! header_id = "config_tester"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct ServiceFile {
    service: ServiceIdentity,
}

/// Fixed identity fields sent with every configure request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceIdentity {
    pub application_name: String,
    pub instance_name: String,
    pub service_url: String,
    pub part_namespace: String,
    pub part_number: String,
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_header_id")]
    pub header_id: String,
}

fn default_profile() -> String {
    "Default".to_string()
}

fn default_header_id() -> String {
    "config_tester".to_string()
}

impl ServiceIdentity {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ServiceFile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("bad service config: {e}")))?;
        Ok(file.service)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read service config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }
}
