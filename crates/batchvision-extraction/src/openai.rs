use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use secrecy::SecretString;

use batchvision_core::config::AppConfig;
use batchvision_core::error::{BatchVisionError, Result};
use batchvision_core::extraction::{Extractor, RawResponse};
use batchvision_core::job::FileBlob;
use batchvision_core::schema::Schema;

use crate::chat::{
    extract_json, ChatClient, ChatMessage, ChatRequest, ContentPart, ImageUrl, JsonSchemaFormat,
    MessageContent, ResponseFormat,
};

const FALLBACK_MIME_TYPE: &str = "image/jpeg";
const RESPONSE_FORMAT_NAME: &str = "extracted_data";

/// Vision extraction through an OpenAI-compatible chat completions endpoint.
///
/// Each call sends the prompt and the image as a data URL and asks for a
/// JSON object shaped by the batch schema.
#[derive(Clone)]
pub struct OpenAiExtractor {
    chat: ChatClient,
}

impl OpenAiExtractor {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            chat: ChatClient::new(config)?,
        })
    }

    fn build_request<'a>(
        &'a self,
        file: &FileBlob,
        prompt: &str,
        schema: &'a Schema,
    ) -> ChatRequest<'a> {
        let data_url = format!(
            "data:{};base64,{}",
            resolve_mime_type(file),
            BASE64.encode(&file.data)
        );

        ChatRequest {
            model: &self.chat.model,
            messages: vec![ChatMessage::user(MessageContent::Parts(vec![
                ContentPart::Text {
                    text: prompt.to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: data_url },
                },
            ]))],
            max_tokens: Some(self.chat.max_tokens),
            temperature: None,
            response_format: Some(ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: RESPONSE_FORMAT_NAME,
                    schema,
                    // Strict mode rejects schemas with optional properties.
                    strict: schema.all_required(),
                },
            }),
        }
    }

    fn parse_content(content: &str) -> Result<RawResponse> {
        let cleaned = extract_json(content);
        let value: serde_json::Value = serde_json::from_str(cleaned).map_err(|e| {
            tracing::error!(raw = %cleaned, error = %e, "Failed to parse extraction JSON");
            BatchVisionError::Extraction(format!("Failed to parse extraction JSON: {e}"))
        })?;
        RawResponse::from_value(value)
    }
}

/// The upload's own MIME type, else a guess from the filename, else JPEG.
pub fn resolve_mime_type(file: &FileBlob) -> String {
    file.mime_type
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty() && *m != "application/octet-stream")
        .map(str::to_string)
        .or_else(|| {
            mime_guess::from_path(&file.filename)
                .first()
                .map(|m| m.to_string())
        })
        .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string())
}

#[async_trait]
impl Extractor for OpenAiExtractor {
    async fn submit(
        &self,
        file: &FileBlob,
        prompt: &str,
        schema: &Schema,
        credential: &SecretString,
    ) -> Result<RawResponse> {
        tracing::debug!(
            model = %self.chat.model,
            filename = %file.filename,
            bytes = file.len(),
            "Sending extraction request"
        );

        let request = self.build_request(file, prompt, schema);
        let content = self.chat.complete(&request, credential).await?;
        let raw = Self::parse_content(&content)?;

        tracing::debug!(
            filename = %file.filename,
            rejected = matches!(raw, RawResponse::Rejected(_)),
            "Received extraction response"
        );

        Ok(raw)
    }
}
