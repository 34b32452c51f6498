use std::sync::Arc;

use batchvision_batch::BatchController;
use batchvision_core::{AppConfig, SecretString};
use batchvision_extraction::SchemaGenerator;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub batch: Arc<BatchController>,
    pub schema_generator: Arc<SchemaGenerator>,
}

impl AppState {
    /// The key supplied with the request, else the configured one.
    pub fn credential(&self, supplied: Option<&str>) -> Option<SecretString> {
        supplied
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(|key| SecretString::from(key.to_string()))
            .or_else(|| self.config.api_key())
    }
}
