use secrecy::SecretString;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONCURRENCY: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(skip)]
    pub openai_api_key: Option<SecretString>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub openai_max_tokens: u32,
    pub extraction_timeout_secs: u64,
    pub batch_concurrency: usize,
    pub server_host: String,
    pub server_port: u16,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty())
                .map(SecretString::from),
            openai_base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
            openai_model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".into()),
            openai_max_tokens: env_parse("OPENAI_MAX_TOKENS").unwrap_or(300),
            extraction_timeout_secs: env_parse("EXTRACTION_TIMEOUT_SECS").unwrap_or(120),
            batch_concurrency: env_parse("BATCH_CONCURRENCY")
                .filter(|k: &usize| *k > 0)
                .unwrap_or(DEFAULT_CONCURRENCY),
            server_host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            server_port: env_parse("SERVER_PORT").unwrap_or(8080),
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES").unwrap_or(25 * 1024 * 1024),
        }
    }

    /// The configured key, if one is set.
    pub fn api_key(&self) -> Option<SecretString> {
        self.openai_api_key.clone()
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
