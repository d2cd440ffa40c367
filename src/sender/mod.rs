//! Delivery of variants to a configurator.
//!
//! [`Sender`] is the one capability the dispatcher needs. Implementations
//! bound every call by a timeout and turn every failure into an
//! [`Outcome`]; nothing is returned as an error.

pub mod engine;
pub mod http;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, Serializer};

use crate::config::ServiceIdentity;
use crate::error::{Error, Result};
use crate::model::{OptionValue, Outcome, Variant};

pub use engine::{Configurator, EngineReply, EngineSender};
pub use http::HttpSender;

/// Default per-call bound.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Deliver one variant, given as its canonical JSON payload.
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send(&self, payload: &str) -> Outcome;
}

// ---------------------------------------------------------------------------
// Rapid options
// ---------------------------------------------------------------------------

/// Configurator value type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Strings and numbers.
    Scalar = 1,
    Boolean = 2,
}

impl Serialize for DataType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

/// One `{name, value, dataType}` triple.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RapidOption {
    pub name: String,
    pub value: OptionValue,
    pub data_type: DataType,
}

impl RapidOption {
    pub fn new(name: impl Into<String>, value: OptionValue) -> Self {
        let data_type = if value.is_bool() {
            DataType::Boolean
        } else {
            DataType::Scalar
        };
        Self {
            name: name.into(),
            value,
            data_type,
        }
    }
}

/// Flatten a canonical payload into rapid options, in attribute order.
pub fn rapid_options(payload: &str) -> Result<Vec<RapidOption>> {
    let variant = Variant::from_canonical(payload)
        .map_err(|e| Error::Other(format!("invalid variant payload: {e}")))?;
    Ok(variant
        .iter()
        .map(|(name, value)| RapidOption::new(name, value.clone()))
        .collect())
}

// ---------------------------------------------------------------------------
// Request envelope
// ---------------------------------------------------------------------------

/// The JSON document posted to the configurator.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<'a> {
    pub application_name: &'a str,
    pub instance_name: &'a str,
    pub service_url: &'a str,
    pub part_namespace: &'a str,
    pub part_number: &'a str,
    pub profile: &'a str,
    pub header_id: &'a str,
    pub rapid_options: Vec<RapidOption>,
    pub detail_id: &'a str,
    pub source_header_id: &'a str,
    pub source_detail_id: &'a str,
    pub page_caption: &'a str,
    pub redirect_url: &'a str,
}

impl<'a> Envelope<'a> {
    pub fn new(identity: &'a ServiceIdentity, rapid_options: Vec<RapidOption>) -> Self {
        Self {
            application_name: &identity.application_name,
            instance_name: &identity.instance_name,
            service_url: &identity.service_url,
            part_namespace: &identity.part_namespace,
            part_number: &identity.part_number,
            profile: &identity.profile,
            header_id: &identity.header_id,
            rapid_options,
            detail_id: "",
            source_header_id: "",
            source_detail_id: "",
            page_caption: "",
            redirect_url: "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn identity() -> ServiceIdentity {
        ServiceIdentity {
            application_name: "APP".into(),
            instance_name: "INST".into(),
            service_url: "https://configurator.example.com/svc".into(),
            part_namespace: "Demo".into(),
            part_number: "OfficeTable".into(),
            profile: "Default".into(),
            header_id: "config_tester".into(),
        }
    }

    #[test]
    fn data_type_distinguishes_booleans() {
        let options = rapid_options(r#"{"Color":"Red","Glass":true,"Legs":4}"#).unwrap();
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"name": "Color", "value": "Red", "dataType": 1},
                {"name": "Glass", "value": true, "dataType": 2},
                {"name": "Legs", "value": 4, "dataType": 1},
            ])
        );
    }

    #[test]
    fn envelope_carries_identity_and_empty_references() {
        let identity = identity();
        let options = rapid_options(r#"{"Glass":false}"#).unwrap();
        let json = serde_json::to_value(Envelope::new(&identity, options)).unwrap();

        assert_eq!(json["applicationName"], "APP");
        assert_eq!(json["partNumber"], "OfficeTable");
        assert_eq!(json["headerId"], "config_tester");
        assert_eq!(json["rapidOptions"][0]["dataType"], 2);
        for field in [
            "detailId",
            "sourceHeaderId",
            "sourceDetailId",
            "pageCaption",
            "redirectUrl",
        ] {
            assert_eq!(json[field], "", "{field} should be empty");
        }
    }

    #[test]
    fn non_object_payload_is_rejected() {
        assert!(rapid_options("[1,2,3]").is_err());
        assert!(rapid_options("not json").is_err());
    }
}
