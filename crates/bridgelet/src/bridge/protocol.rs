//! Record types for bridge-collaborator communication.
//!
//! Wire format is fixed: byte fields travel as standard base64 strings, and
//! every outbound line is an [`Envelope`] tagging its payload with `app`.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Envelope tag for forwarded HTTP requests.
pub const APP_REQUEST: &str = "http.request";

/// Envelope tag for diagnostic and telemetry records.
pub const APP_RESPONSE_LOG: &str = "http.response.log";

/// Correlation key for one in-flight HTTP request.
///
/// UUID v4 - unique for the process lifetime, never reused. Carries no
/// meaning beyond matching a response line to the waiter it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(uuid::Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        let uuid = uuid::Uuid::parse_str(s)?;
        Ok(Self(uuid))
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One incoming HTTP request, emitted outbound exactly once.
///
/// Header values are multi-valued; value order is preserved per key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub method: String,
    pub header: HashMap<String, Vec<String>>,
    pub remote_addr: String,
    pub uri: String,
    #[serde(with = "base64_bytes", default)]
    pub body: Vec<u8>,
    pub request_id: RequestId,
}

/// One response line from the collaborator, consumed exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRecord {
    #[serde(with = "base64_bytes", default)]
    pub body: Vec<u8>,
    pub request_id: RequestId,
}

/// Diagnostic and telemetry record emitted on the outbound stream.
///
/// One type covers three events: orphaned responses, malformed inbound
/// lines, and normal completion timing. Absent fields are omitted from the
/// wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseLog {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Elapsed wall-clock time in milliseconds, rounded to one decimal place.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub took: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseRecord>,

    /// The raw bytes of a line that failed to decode.
    #[serde(
        with = "opt_base64_bytes",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub raw: Option<Vec<u8>>,
}

impl ResponseLog {
    /// A response arrived for an id with no registered waiter.
    pub fn orphaned(response: ResponseRecord) -> Self {
        Self {
            error: Some("unknown request".to_string()),
            response: Some(response),
            ..Default::default()
        }
    }

    /// An inbound line failed to decode; the raw payload rides along.
    pub fn malformed(error: impl std::fmt::Display, raw: Vec<u8>) -> Self {
        Self {
            error: Some(format!("malformed: {error}")),
            raw: Some(raw),
            ..Default::default()
        }
    }

    /// Normal completion telemetry for a delivered response.
    pub fn completed(response: ResponseRecord, elapsed: Duration) -> Self {
        let took = (elapsed.as_secs_f64() * 1_000.0 * 10.0).round() / 10.0;
        Self {
            took: Some(took),
            response: Some(response),
            ..Default::default()
        }
    }
}

/// Generic wrapper around every outbound line: `{app, content}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub app: String,
    pub content: serde_json::Value,
}

impl Envelope {
    pub fn new<T: Serialize>(app: impl Into<String>, content: &T) -> serde_json::Result<Self> {
        Ok(Self {
            app: app.into(),
            content: serde_json::to_value(content)?,
        })
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

mod opt_base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|encoded| STANDARD.decode(encoded).map_err(serde::de::Error::custom))
            .transpose()
    }
}
