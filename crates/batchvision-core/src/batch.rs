use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BatchVisionError, Result};
use crate::job::{JobItem, JobState};
use crate::schema::Schema;

pub const DEFAULT_PROMPT: &str = "Please extract the date and the total amount from this image of a receipt. \
Totals should include tips where present. If you cannot find a total amount, respond with an error message. \
Respond only with a JSON object matching the requested schema. \
The amount should never be null. Do not include markdown formatting in your response.";

/// Prompt and schema shared by every file in a batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchSettings {
    pub prompt: String,
    pub schema: Schema,
}

impl BatchSettings {
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(BatchVisionError::Config("prompt must not be empty".into()));
        }
        self.schema.validate()
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            schema: Schema::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateCounts {
    pub ready: usize,
    pub processing: usize,
    pub done: usize,
    pub error: usize,
}

impl StateCounts {
    pub fn tally<'a>(items: impl IntoIterator<Item = &'a JobItem>) -> Self {
        items
            .into_iter()
            .fold(StateCounts::default(), |mut counts, item| {
                match item.state() {
                    JobState::Ready => counts.ready += 1,
                    JobState::Processing => counts.processing += 1,
                    JobState::Done => counts.done += 1,
                    JobState::Error => counts.error += 1,
                }
                counts
            })
    }

    pub fn total(&self) -> usize {
        self.ready + self.processing + self.done + self.error
    }
}

/// A point-in-time copy of the batch, safe to hand to any reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSnapshot {
    pub processing: bool,
    pub items: Vec<JobItem>,
    pub counts: StateCounts,
}

impl BatchSnapshot {
    pub fn new(processing: bool, items: Vec<JobItem>) -> Self {
        let counts = StateCounts::tally(&items);
        Self {
            processing,
            items,
            counts,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub dispatched: usize,
    pub done: usize,
    pub failed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Change notifications published to observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    FilesAdded { count: usize },
    ItemUpdated { item: JobItem },
    RunStarted { pending: usize },
    RunFinished { summary: RunSummary },
    Cleared,
}

impl BatchEvent {
    /// Same as the serialized `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            BatchEvent::FilesAdded { .. } => "files_added",
            BatchEvent::ItemUpdated { .. } => "item_updated",
            BatchEvent::RunStarted { .. } => "run_started",
            BatchEvent::RunFinished { .. } => "run_finished",
            BatchEvent::Cleared => "cleared",
        }
    }
}
