//! Raw telemetry and API event records as they arrive from producers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::differ::DiffType;

/// One captured request/response pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Telemetry {
    #[serde(rename = "requestID", alias = "requestId")]
    pub request_id: String,
    pub scheme: String,
    pub source_address: String,
    pub destination_address: String,
    pub destination_namespace: String,
    pub request: Request,
    pub response: Response,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub host: String,
    pub common: Common,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Response {
    pub status_code: String,
    pub common: Common,
}

/// Fields shared by requests and responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Common {
    pub headers: Vec<Header>,
    #[serde(with = "base64_bytes")]
    pub body: Vec<u8>,
    #[serde(alias = "TruncatedBody")]
    pub truncated_body: bool,
    pub version: String,
    /// Milliseconds since the epoch; 0 when the producer sent garbage.
    #[serde(deserialize_with = "lenient_millis")]
    pub time: i64,
}

impl Common {
    /// First header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.key.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub key: String,
    pub value: String,
}

impl Header {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Stored API event the trace belongs to. The spec-diff handler fills in
/// the diff fields before persisting it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiEvent {
    pub id: u64,
    pub api_info_id: u32,
    pub time: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub host_spec_name: String,
    pub destination_port: u16,
    pub trace_source_id: Uuid,
    pub spec_diff_type: DiffType,
    pub has_spec_diff: bool,
    pub has_provided_spec_diff: bool,
    pub has_reconstructed_spec_diff: bool,
    pub old_provided_spec: String,
    pub new_provided_spec: String,
    pub old_reconstructed_spec: String,
    pub new_reconstructed_spec: String,
}

/// Payload of the *trace* topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceMessage {
    pub event: ApiEvent,
    pub telemetry: Telemetry,
}

impl TraceMessage {
    pub fn new(event: ApiEvent, telemetry: Telemetry) -> Self {
        Self { event, telemetry }
    }

    /// Traces of one API share a shard.
    pub fn partition_key(&self) -> i64 {
        i64::from(self.event.api_info_id)
    }
}

mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    const ENGINE: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use base64::Engine;
        ENGINE.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        use base64::Engine;
        let s = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        ENGINE.decode(s.trim()).map_err(serde::de::Error::custom)
    }
}

fn lenient_millis<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_form() {
        let json = r#"{
            "requestID": "r-1",
            "scheme": "http",
            "request": {
                "method": "POST",
                "path": "/pets?x=1",
                "host": "petstore",
                "common": {
                    "headers": [{"key": "Content-Type", "value": "application/json"}],
                    "body": "eyJhIjoxfQ==",
                    "TruncatedBody": true,
                    "time": "1700000000000"
                }
            },
            "response": {"statusCode": "201", "common": {"time": "not-a-time"}}
        }"#;

        let telemetry: Telemetry = serde_json::from_str(json).unwrap();
        assert_eq!(telemetry.request_id, "r-1");
        assert_eq!(telemetry.request.common.body, br#"{"a":1}"#);
        assert!(telemetry.request.common.truncated_body);
        assert_eq!(telemetry.request.common.time, 1_700_000_000_000);
        assert_eq!(telemetry.request.common.header("content-type"), Some("application/json"));
        assert_eq!(telemetry.response.status_code, "201");
        assert_eq!(telemetry.response.common.time, 0);
    }

    #[test]
    fn test_partition_key_is_api_id() {
        let message = TraceMessage {
            event: ApiEvent {
                api_info_id: 42,
                ..Default::default()
            },
            telemetry: Telemetry::default(),
        };
        assert_eq!(message.partition_key(), 42);
    }
}
