use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BatchVisionError, Result, ValidationError};

/// A typed value extracted for one field.
///
/// Declared properties always end up as `Number`, `Boolean` or `Text`;
/// `Other` carries undeclared fields through exactly as the service sent them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Boolean(bool),
    Text(String),
    Other(serde_json::Value),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Boolean(b) => write!(f, "{b}"),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Other(serde_json::Value::String(s)) => f.write_str(s),
            FieldValue::Other(v) => write!(f, "{v}"),
        }
    }
}

pub type FieldMap = BTreeMap<String, FieldValue>;

/// An input file: its name, optional MIME type and contents.
#[derive(Clone, Default)]
pub struct FileBlob {
    pub filename: String,
    pub mime_type: Option<String>,
    pub data: Bytes,
}

impl FileBlob {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: None,
            data: data.into(),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for FileBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileBlob")
            .field("filename", &self.filename)
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Ready,
    Processing,
    Done,
    Error,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Error)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Ready => write!(f, "ready"),
            JobState::Processing => write!(f, "processing"),
            JobState::Done => write!(f, "done"),
            JobState::Error => write!(f, "error"),
        }
    }
}

/// The validated outcome of one extraction.
///
/// A name is never both a field and a field error: recording one removes the other.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    fields: FieldMap,
    field_errors: BTreeMap<String, String>,
}

impl Extraction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_field(&mut self, name: impl Into<String>, value: FieldValue) {
        let name = name.into();
        self.field_errors.remove(&name);
        self.fields.insert(name, value);
    }

    pub fn insert_error(&mut self, name: impl Into<String>, message: impl Into<String>) {
        let name = name.into();
        self.fields.remove(&name);
        self.field_errors.insert(name, message.into());
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn field_errors(&self) -> &BTreeMap<String, String> {
        &self.field_errors
    }

    pub fn into_parts(self) -> (FieldMap, BTreeMap<String, String>) {
        (self.fields, self.field_errors)
    }
}

/// A state change requested for a job item. Each variant names its target
/// state and carries exactly the payload that state needs.
#[derive(Debug, Clone)]
pub enum Transition {
    /// `Error -> Ready`, when a new run retries a failed item.
    Requeue,
    /// `Ready -> Processing`, when the scheduler dequeues the item.
    Start,
    /// `Processing -> Done`
    Complete(Extraction),
    /// `Processing -> Error`
    Fail(String),
}

impl Transition {
    pub fn target(&self) -> JobState {
        match self {
            Transition::Requeue => JobState::Ready,
            Transition::Start => JobState::Processing,
            Transition::Complete(_) => JobState::Done,
            Transition::Fail(_) => JobState::Error,
        }
    }

    fn allowed_from(&self, state: JobState) -> bool {
        matches!(
            (self, state),
            (Transition::Requeue, JobState::Error)
                | (Transition::Start, JobState::Ready)
                | (Transition::Complete(_), JobState::Processing)
                | (Transition::Fail(_), JobState::Processing)
        )
    }
}

/// One tracked file and its processing state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobItem {
    id: Uuid,
    filename: String,
    #[serde(skip)]
    file: FileBlob,
    state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fields: Option<FieldMap>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    field_errors: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    added_at: DateTime<Utc>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    finished_at: Option<DateTime<Utc>>,
}

impl JobItem {
    pub fn new(file: FileBlob) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename: file.filename.clone(),
            file,
            state: JobState::Ready,
            fields: None,
            field_errors: BTreeMap::new(),
            error: None,
            added_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn file(&self) -> &FileBlob {
        &self.file
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn fields(&self) -> Option<&FieldMap> {
        self.fields.as_ref()
    }

    pub fn field_errors(&self) -> &BTreeMap<String, String> {
        &self.field_errors
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Applies a transition, attaching or clearing payload as the target
    /// state requires. Illegal transitions leave the item untouched.
    pub fn apply(&mut self, transition: Transition) -> Result<()> {
        if !transition.allowed_from(self.state) {
            return Err(BatchVisionError::InvalidTransition {
                item: self.id.to_string(),
                from: self.state,
                to: transition.target(),
            });
        }

        match transition {
            Transition::Requeue => {
                self.state = JobState::Ready;
                self.error = None;
                self.started_at = None;
                self.finished_at = None;
            }
            Transition::Start => {
                self.state = JobState::Processing;
                self.started_at = Some(Utc::now());
            }
            Transition::Complete(extraction) => {
                if extraction.fields().is_empty() {
                    return Err(ValidationError::NoUsableFields.into());
                }
                let (fields, field_errors) = extraction.into_parts();
                self.state = JobState::Done;
                self.fields = Some(fields);
                self.field_errors = field_errors;
                self.error = None;
                self.finished_at = Some(Utc::now());
            }
            Transition::Fail(message) => {
                self.state = JobState::Error;
                self.fields = None;
                self.field_errors.clear();
                self.error = Some(message);
                self.finished_at = Some(Utc::now());
            }
        }
        Ok(())
    }
}
