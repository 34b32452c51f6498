use std::sync::Arc;

use chrono::Utc;
use secrecy::SecretString;

use batchvision_core::batch::{BatchSettings, RunSummary};
use batchvision_core::error::BatchVisionError;
use batchvision_core::extraction::{Extractor, RawResponse};
use batchvision_core::job::{JobItem, JobState, Transition};
use batchvision_core::result::ResultRecord;

use crate::aggregate::ResultAggregate;
use crate::coerce::validate_response;
use crate::job_set::JobSet;
use crate::pool::WorkerPool;

const GENERIC_FAILURE: &str = "Failed to process image";

/// Drives extraction for a list of items through a bounded worker pool.
///
/// Item failures are recorded on the item and never abort the run.
#[derive(Clone)]
pub struct BatchScheduler {
    extractor: Arc<dyn Extractor>,
    pool: WorkerPool,
}

impl BatchScheduler {
    pub fn new(extractor: Arc<dyn Extractor>, concurrency: usize) -> Self {
        Self {
            extractor,
            pool: WorkerPool::new(concurrency),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.pool.limit()
    }

    pub fn extractor(&self) -> &Arc<dyn Extractor> {
        &self.extractor
    }

    /// Processes `items` and resolves once every one of them is terminal.
    pub async fn run(
        &self,
        jobs: &JobSet,
        results: &ResultAggregate,
        items: Vec<JobItem>,
        settings: &BatchSettings,
        credential: &SecretString,
    ) -> RunSummary {
        let started_at = Utc::now();
        let dispatched = items.len();

        let outcomes = self
            .pool
            .run(items, |item| {
                self.process(jobs, results, item, settings, credential)
            })
            .await;

        let done = outcomes
            .iter()
            .filter(|state| **state == Some(JobState::Done))
            .count();
        let failed = outcomes
            .iter()
            .filter(|state| **state == Some(JobState::Error))
            .count();

        RunSummary {
            dispatched,
            done,
            failed,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn process(
        &self,
        jobs: &JobSet,
        results: &ResultAggregate,
        item: JobItem,
        settings: &BatchSettings,
        credential: &SecretString,
    ) -> Option<JobState> {
        let id = item.id();
        if let Err(e) = jobs.transition(id, Transition::Start) {
            tracing::warn!(item = %id, error = %e, "Skipping item that cannot start");
            return None;
        }
        tracing::debug!(item = %id, filename = %item.filename(), "Dispatching item");

        let outcome = match self
            .extractor
            .submit(item.file(), &settings.prompt, &settings.schema, credential)
            .await
        {
            Ok(RawResponse::Fields(raw)) => {
                validate_response(&settings.schema, &raw).map_err(|e| e.to_string())
            }
            Ok(RawResponse::Rejected(message)) => Err(message),
            Err(e) => Err(failure_message(e)),
        };

        let settled = match outcome {
            Ok(extraction) => {
                let field_errors = extraction.field_errors().len();
                // The record lands before the Done item is visible or published.
                jobs.transition_with(id, Transition::Complete(extraction), |done| {
                    if let Some(record) = ResultRecord::from_item(done) {
                        results.append(record);
                    }
                })
                .map(|_| {
                    tracing::info!(
                        item = %id,
                        filename = %item.filename(),
                        field_errors,
                        "Extraction succeeded"
                    );
                })
                .map_err(|e| e.to_string())
            }
            Err(message) => Err(message),
        };

        match settled {
            Ok(()) => Some(JobState::Done),
            Err(message) => {
                tracing::warn!(
                    item = %id,
                    filename = %item.filename(),
                    error = %message,
                    "Extraction failed"
                );
                match jobs.transition(id, Transition::Fail(message)) {
                    Ok(_) => Some(JobState::Error),
                    Err(e) => {
                        tracing::error!(item = %id, error = %e, "Could not record failure");
                        None
                    }
                }
            }
        }
    }
}

/// The message shown on a failed item: the service's own words when it
/// gave any, otherwise a generic message.
fn failure_message(error: BatchVisionError) -> String {
    let message = match error {
        BatchVisionError::Extraction(message) | BatchVisionError::Rejected(message) => message,
        other => other.to_string(),
    };
    if message.trim().is_empty() {
        GENERIC_FAILURE.to_string()
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use batchvision_core::error::Result;
    use batchvision_core::job::{FieldValue, FileBlob};
    use batchvision_core::schema::Schema;
    use serde_json::json;

    use crate::events::EventBus;

    /// Answers from the filename: `fail*` errors, `reject*` rejects,
    /// everything else returns a valid receipt.
    struct ByName;

    #[async_trait]
    impl Extractor for ByName {
        async fn submit(
            &self,
            file: &FileBlob,
            _prompt: &str,
            _schema: &Schema,
            _credential: &SecretString,
        ) -> Result<RawResponse> {
            if file.filename.starts_with("fail") {
                return Err(BatchVisionError::Extraction("connection reset".into()));
            }
            if file.filename.starts_with("reject") {
                return Ok(RawResponse::Rejected("No receipt in image".into()));
            }
            match json!({"date": "03/01/2024", "amount": "$12.50"}) {
                serde_json::Value::Object(map) => Ok(RawResponse::Fields(map)),
                _ => unreachable!(),
            }
        }
    }

    #[tokio::test]
    async fn test_run_settles_every_item() {
        let jobs = JobSet::new(EventBus::default());
        let results = ResultAggregate::new();
        jobs.add(["ok.png", "fail.png", "reject.png", "ok2.png"].map(|n| FileBlob::new(n, vec![0u8])));

        let scheduler = BatchScheduler::new(Arc::new(ByName), 2);
        let summary = scheduler
            .run(
                &jobs,
                &results,
                jobs.pending(),
                &BatchSettings::default(),
                &SecretString::from("sk-test".to_string()),
            )
            .await;

        assert_eq!(summary.dispatched, 4);
        assert_eq!(summary.done, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(results.len(), 2);

        let items = jobs.snapshot();
        assert!(items.iter().all(|i| i.state().is_terminal()));
        assert_eq!(items[1].error(), Some("connection reset"));
        assert_eq!(items[2].error(), Some("No receipt in image"));
        assert_eq!(
            items[0].fields().and_then(|f| f.get("amount")),
            Some(&FieldValue::Number(12.5))
        );
    }

    #[test]
    fn test_failure_message() {
        assert_eq!(
            failure_message(BatchVisionError::Extraction("timeout".into())),
            "timeout"
        );
        assert_eq!(
            failure_message(BatchVisionError::Extraction("  ".into())),
            GENERIC_FAILURE
        );
        assert_eq!(
            failure_message(BatchVisionError::Internal("x".into())),
            "Internal error: x"
        );
    }
}
