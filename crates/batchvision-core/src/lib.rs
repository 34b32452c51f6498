pub mod api_types;
pub mod batch;
pub mod config;
pub mod error;
pub mod extraction;
pub mod job;
pub mod result;
pub mod schema;

pub use batch::{BatchEvent, BatchSettings, BatchSnapshot, RunSummary, StateCounts};
pub use config::AppConfig;
pub use error::{BatchVisionError, FieldError, Result, ValidationError};
pub use extraction::{Extractor, RawResponse};
pub use job::{Extraction, FieldMap, FieldValue, FileBlob, JobItem, JobState, Transition};
pub use result::ResultRecord;
pub use schema::{PropertySchema, PropertyType, Schema, SchemaProperty};

pub use secrecy::{ExposeSecret, SecretString};
