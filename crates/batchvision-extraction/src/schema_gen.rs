use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use batchvision_core::config::AppConfig;
use batchvision_core::error::{BatchVisionError, Result};
use batchvision_core::schema::Schema;

use crate::chat::{extract_json, ChatClient, ChatMessage, ChatRequest, MessageContent};

const SYSTEM_PROMPT: &str = r#"You are a helpful assistant that converts natural language descriptions into JSON schemas.
The schema should follow this structure:
{
  "type": "object",
  "properties": {
    "property1": {
      "type": "string",
      "description": "Description of property1"
    },
    ...more properties
  },
  "required": ["property1", ...more required properties],
  "additionalProperties": false
}

The available property types are: string, number, boolean.
Create descriptive property names and clear descriptions.
"#;

const GENERATION_TEMPERATURE: f32 = 0.3;

/// A schema drafted from a plain-language description, plus the extraction
/// prompt rendered from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedSchema {
    pub schema: Schema,
    pub prompt_text: String,
}

/// Drafts extraction schemas with the same chat endpoint used for extraction.
#[derive(Clone)]
pub struct SchemaGenerator {
    chat: ChatClient,
}

impl SchemaGenerator {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            chat: ChatClient::new(config)?,
        })
    }

    #[tracing::instrument(skip(self, credential), fields(model = %self.chat.model))]
    pub async fn generate(
        &self,
        images_of: &str,
        description: &str,
        credential: &SecretString,
    ) -> Result<GeneratedSchema> {
        let images_of = images_of.trim();
        let description = description.trim();
        if images_of.is_empty() || description.is_empty() {
            return Err(BatchVisionError::InvalidSchema(
                "both the image subject and the field description are required".into(),
            ));
        }

        let user_prompt = format!(
            "I'm building a computer vision application that analyzes images of {images_of}.\n\
             I need to extract the following information from each image: {description}\n\
             Please create a JSON schema that defines these properties with appropriate types and descriptions."
        );

        let request = ChatRequest {
            model: &self.chat.model,
            messages: vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(MessageContent::Text(user_prompt)),
            ],
            max_tokens: None,
            temperature: Some(GENERATION_TEMPERATURE),
            response_format: None,
        };

        let content = self.chat.complete(&request, credential).await?;
        let schema = parse_generated(&content)?;

        tracing::info!(
            properties = schema.properties.len(),
            required = schema.required.len(),
            "Generated extraction schema"
        );

        Ok(GeneratedSchema {
            prompt_text: schema.prompt_for(images_of),
            schema,
        })
    }
}

/// Parses model output into a schema, checking the outline before the
/// typed parse so a malformed draft gets a clear message.
pub(crate) fn parse_generated(content: &str) -> Result<Schema> {
    let value: serde_json::Value = serde_json::from_str(extract_json(content))
        .map_err(|e| BatchVisionError::InvalidSchema(format!("Failed to parse generated schema: {e}")))?;

    let has_structure = value.get("type").is_some_and(|t| t.is_string())
        && value.get("properties").is_some_and(|p| p.is_object())
        && value.get("required").is_some_and(|r| r.is_array());
    if !has_structure {
        return Err(BatchVisionError::InvalidSchema(
            "Generated schema doesn't have the required structure".into(),
        ));
    }

    let schema: Schema = serde_json::from_value(value)
        .map_err(|e| BatchVisionError::InvalidSchema(format!("Failed to parse generated schema: {e}")))?;
    schema.validate()?;
    Ok(schema)
}
