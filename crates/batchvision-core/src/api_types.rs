use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job::FieldMap;
use crate::result::ResultRecord;
use crate::schema::Schema;

// --- Health ---

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub processing: bool,
    pub item_count: usize,
}

// --- Batch ---

#[derive(Debug, Serialize, Deserialize)]
pub struct AddFilesResponse {
    pub added: Vec<Uuid>,
    pub total: usize,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RunBatchRequest {
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunBatchResponse {
    pub status: String,
    pub pending: usize,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResultsResponse {
    pub results: Vec<ResultRecord>,
    pub total: usize,
}

// --- Schema generation ---

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateSchemaRequest {
    pub images_of: String,
    pub schema_description: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateSchemaResponse {
    pub schema: Schema,
    pub prompt_text: String,
}

// --- Single image ---

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessImageResponse {
    pub filename: String,
    pub fields: FieldMap,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_errors: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
