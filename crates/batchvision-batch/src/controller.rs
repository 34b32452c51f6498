use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use secrecy::SecretString;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use batchvision_core::batch::{BatchEvent, BatchSettings, BatchSnapshot, RunSummary};
use batchvision_core::error::{BatchVisionError, Result};
use batchvision_core::extraction::Extractor;
use batchvision_core::job::{FileBlob, JobItem};
use batchvision_core::result::ResultRecord;

use crate::aggregate::ResultAggregate;
use crate::events::EventBus;
use crate::export::to_csv;
use crate::job_set::JobSet;
use crate::lock;
use crate::scheduler::BatchScheduler;

/// Clears the processing flag when dropped, however the run ends.
struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl RunGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| BatchVisionError::RunInProgress)?;
        Ok(Self {
            flag: Arc::clone(flag),
        })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Owns one batch: its files, settings, results and the single run that
/// may be active at a time.
pub struct BatchController {
    jobs: JobSet,
    results: ResultAggregate,
    settings: RwLock<BatchSettings>,
    scheduler: BatchScheduler,
    events: EventBus,
    processing: Arc<AtomicBool>,
}

impl BatchController {
    pub fn new(extractor: Arc<dyn Extractor>, concurrency: usize) -> Self {
        Self::with_settings(extractor, concurrency, BatchSettings::default())
    }

    pub fn with_settings(
        extractor: Arc<dyn Extractor>,
        concurrency: usize,
        settings: BatchSettings,
    ) -> Self {
        let events = EventBus::default();
        Self {
            jobs: JobSet::new(events.clone()),
            results: ResultAggregate::new(),
            settings: RwLock::new(settings),
            scheduler: BatchScheduler::new(extractor, concurrency),
            events,
            processing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn add_files(&self, files: impl IntoIterator<Item = FileBlob>) -> Vec<Uuid> {
        self.jobs.add(files)
    }

    /// Drops every item and result. Refused while a run is active.
    pub fn clear_batch(&self) -> Result<()> {
        let _guard = RunGuard::acquire(&self.processing)?;
        self.jobs.clear();
        self.results.clear();
        tracing::info!("Batch cleared");
        Ok(())
    }

    /// Processes every item not yet `Done` and resolves when all of them
    /// are terminal. Failed items from earlier runs are retried.
    pub async fn run_batch(&self, credential: SecretString) -> Result<RunSummary> {
        let guard = RunGuard::acquire(&self.processing)?;
        let pending = self.prepare_run();
        Ok(self.execute(pending, credential, guard).await)
    }

    /// Starts a run on the runtime and returns the number of items it will
    /// process together with a handle to its summary.
    pub fn spawn_run(
        self: &Arc<Self>,
        credential: SecretString,
    ) -> Result<(usize, JoinHandle<RunSummary>)> {
        let guard = RunGuard::acquire(&self.processing)?;
        let pending = self.prepare_run();
        let count = pending.len();

        let controller = Arc::clone(self);
        let handle =
            tokio::spawn(async move { controller.execute(pending, credential, guard).await });
        Ok((count, handle))
    }

    fn prepare_run(&self) -> Vec<JobItem> {
        let requeued = self.jobs.requeue_failed();
        let pending = self.jobs.pending();
        tracing::info!(
            pending = pending.len(),
            requeued,
            concurrency = self.scheduler.concurrency(),
            "Starting batch run"
        );
        self.events.send(BatchEvent::RunStarted {
            pending: pending.len(),
        });
        pending
    }

    async fn execute(
        &self,
        pending: Vec<JobItem>,
        credential: SecretString,
        guard: RunGuard,
    ) -> RunSummary {
        let settings = self.settings();
        let summary = self
            .scheduler
            .run(&self.jobs, &self.results, pending, &settings, &credential)
            .await;
        drop(guard);

        tracing::info!(
            dispatched = summary.dispatched,
            done = summary.done,
            failed = summary.failed,
            "Batch run finished"
        );
        self.events.send(BatchEvent::RunFinished {
            summary: summary.clone(),
        });
        summary
    }

    pub fn snapshot(&self) -> BatchSnapshot {
        BatchSnapshot::new(self.is_processing(), self.jobs.snapshot())
    }

    pub fn results(&self) -> Vec<ResultRecord> {
        self.results.records()
    }

    pub fn export_csv(&self) -> String {
        to_csv(&self.results.records(), &self.settings().schema)
    }

    pub fn settings(&self) -> BatchSettings {
        lock::read(&self.settings, "settings").clone()
    }

    /// Replaces the prompt and schema. A run already in progress keeps the
    /// settings it started with.
    pub fn update_settings(&self, settings: BatchSettings) -> Result<()> {
        settings.validate()?;
        *lock::write(&self.settings, "settings") = settings;
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.events.subscribe()
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    pub fn item_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn concurrency(&self) -> usize {
        self.scheduler.concurrency()
    }

    pub fn extractor(&self) -> &Arc<dyn Extractor> {
        self.scheduler.extractor()
    }
}
