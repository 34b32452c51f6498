use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use batchvision_core::config::AppConfig;
use batchvision_core::error::{BatchVisionError, Result};
use batchvision_core::schema::Schema;

// ── Chat Completions API request/response types ────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage {
    pub role: &'static str,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(content: MessageContent) -> Self {
        Self {
            role: "user",
            content,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
pub(crate) struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSchemaFormat<'a> {
    pub name: &'static str,
    pub schema: &'a Schema,
    pub strict: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ── Client ─────────────────────────────────────────────────────────────────

/// Thin wrapper over `POST {base_url}/chat/completions`.
#[derive(Clone)]
pub(crate) struct ChatClient {
    client: reqwest::Client,
    endpoint: String,
    pub model: String,
    pub max_tokens: u32,
}

impl ChatClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.extraction_timeout_secs))
            .build()
            .map_err(|e| BatchVisionError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/chat/completions",
                config.openai_base_url.trim_end_matches('/')
            ),
            model: config.openai_model.clone(),
            max_tokens: config.openai_max_tokens,
        })
    }

    /// Sends one completion request and returns the text of the first choice.
    pub async fn complete(
        &self,
        request: &ChatRequest<'_>,
        credential: &SecretString,
    ) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(credential.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(|e| BatchVisionError::Extraction(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(BatchVisionError::Extraction(api_error_message(
                status.as_u16(),
                &body,
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| BatchVisionError::Extraction(format!("Failed to parse API response: {e}")))?;

        let choice = chat.choices.into_iter().next();
        tracing::debug!(
            finish_reason = ?choice.as_ref().and_then(|c| c.finish_reason.as_deref()),
            "Received chat completion"
        );

        choice
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| {
                BatchVisionError::Extraction("No response from extraction service".to_string())
            })
    }
}

/// Uses the service's own error message when the body carries one.
fn api_error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) if body.trim().is_empty() => {
            format!("Extraction service returned status {status}")
        }
        Err(_) => format!("Extraction service returned status {status}: {body}"),
    }
}

/// Pulls the JSON object out of model output that may be wrapped in
/// markdown fences or surrounded by prose.
pub fn extract_json(content: &str) -> &str {
    let trimmed = content.trim();
    if trimmed.starts_with('{') {
        return trimmed;
    }
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_plain() {
        assert_eq!(extract_json("  {\"a\": 1} \n"), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_with_code_fences() {
        let content = "```json\n{\"date\": \"03/01/2024\"}\n```";
        assert_eq!(extract_json(content), "{\"date\": \"03/01/2024\"}");
    }

    #[test]
    fn test_extract_json_with_prose() {
        let content = "Here is the schema:\n{\"type\": \"object\"}\nHope this helps.";
        assert_eq!(extract_json(content), "{\"type\": \"object\"}");
    }

    #[test]
    fn test_extract_json_without_object() {
        assert_eq!(extract_json("no json here"), "no json here");
    }

    #[test]
    fn test_api_error_message_prefers_service_message() {
        let body = r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#;
        assert_eq!(api_error_message(401, body), "Incorrect API key provided");
    }

    #[test]
    fn test_api_error_message_falls_back_to_status() {
        assert_eq!(
            api_error_message(502, ""),
            "Extraction service returned status 502"
        );
        assert_eq!(
            api_error_message(500, "upstream exploded"),
            "Extraction service returned status 500: upstream exploded"
        );
    }

    #[test]
    fn test_vision_request_shape() {
        let schema = Schema::default();
        let request = ChatRequest {
            model: "gpt-4o",
            messages: vec![ChatMessage::user(MessageContent::Parts(vec![
                ContentPart::Text {
                    text: "Extract".into(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: "data:image/png;base64,AAAA".into(),
                    },
                },
            ]))],
            max_tokens: Some(300),
            temperature: None,
            response_format: Some(ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: "extracted_data",
                    schema: &schema,
                    strict: true,
                },
            }),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"][0]["type"], "text");
        assert_eq!(json["messages"][0]["content"][1]["type"], "image_url");
        assert_eq!(
            json["messages"][0]["content"][1]["image_url"]["url"],
            "data:image/png;base64,AAAA"
        );
        assert_eq!(json["response_format"]["type"], "json_schema");
        assert_eq!(
            json["response_format"]["json_schema"]["schema"]["properties"]["amount"]["type"],
            "number"
        );
        assert!(json.get("temperature").is_none());
    }
}
