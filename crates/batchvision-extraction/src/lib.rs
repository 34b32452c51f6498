mod chat;
mod openai;
mod schema_gen;

pub use chat::extract_json;
pub use openai::{resolve_mime_type, OpenAiExtractor};
pub use schema_gen::{GeneratedSchema, SchemaGenerator};
