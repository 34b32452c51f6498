use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::{BatchVisionError, Result};
use crate::job::FileBlob;
use crate::schema::Schema;

/// What the extraction service returned for one file, before validation.
#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
    /// An arbitrary object of field name to value.
    Fields(serde_json::Map<String, serde_json::Value>),
    /// The service answered `{"error": "..."}` instead of data.
    Rejected(String),
}

impl RawResponse {
    /// Interprets a decoded JSON body. A lone `error` string key is a
    /// rejection; any other object is field data.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(serde_json::Value::String(message)) = map.get("error") {
                        return Ok(RawResponse::Rejected(message.clone()));
                    }
                }
                Ok(RawResponse::Fields(map))
            }
            other => Err(BatchVisionError::Extraction(format!(
                "Expected a JSON object from the extraction service, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// The boundary to the extraction service: one request per call, no batching.
///
/// Implementations own their transport timeout policy; callers add none.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn submit(
        &self,
        file: &FileBlob,
        prompt: &str,
        schema: &Schema,
        credential: &SecretString,
    ) -> Result<RawResponse>;
}
