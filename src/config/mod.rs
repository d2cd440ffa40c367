//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! The configurator API key is wrapped in secrecy::SecretString so it
//! never reaches the logs.

pub mod service;

use std::path::PathBuf;

use crate::error::{Error, Result};
use secrecy::SecretString;

pub use service::ServiceIdentity;

#[derive(Debug)]
pub struct Config {
    /// SQLite file holding the queue and finished tables.
    pub database_path: PathBuf,
    /// Configurator endpoint the HTTP sender posts to.
    pub endpoint: Option<String>,
    /// Optional bearer token for the endpoint.
    pub api_key: Option<SecretString>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            database_path: PathBuf::from(required_var(&lookup, "VARQ_DATABASE")?),
            endpoint: lookup("CONFIGURATOR_URL"),
            api_key: lookup("CONFIGURATOR_API_KEY").map(SecretString::from),
            otel_endpoint: lookup("OTEL_ENDPOINT"),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// The configurator endpoint, required for dispatching over HTTP.
    pub fn require_endpoint(&self) -> Result<&str> {
        self.endpoint.as_deref().ok_or_else(|| {
            Error::Config("required environment variable CONFIGURATOR_URL is not set".to_string())
        })
    }
}

fn required_var(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String> {
    lookup(name)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Config(format!("required environment variable {name} is not set")))
}
