use std::sync::RwLock;

use uuid::Uuid;

use batchvision_core::batch::BatchEvent;
use batchvision_core::error::{BatchVisionError, Result};
use batchvision_core::job::{FileBlob, JobItem, JobState, Transition};

use crate::events::EventBus;
use crate::lock;

/// The tracked files of a batch and their states, in the order they were added.
///
/// Every state change goes through [`JobSet::transition`], which updates the
/// item under the write lock and publishes the new item afterwards.
pub struct JobSet {
    items: RwLock<Vec<JobItem>>,
    events: EventBus,
}

impl JobSet {
    pub fn new(events: EventBus) -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            events,
        }
    }

    /// Appends one `Ready` item per file, preserving input order.
    pub fn add(&self, files: impl IntoIterator<Item = FileBlob>) -> Vec<Uuid> {
        let new_items: Vec<JobItem> = files.into_iter().map(JobItem::new).collect();
        let ids: Vec<Uuid> = new_items.iter().map(JobItem::id).collect();
        if ids.is_empty() {
            return ids;
        }

        lock::write(&self.items, "jobs").extend(new_items);
        tracing::debug!(count = ids.len(), "Added files to batch");
        self.events.send(BatchEvent::FilesAdded { count: ids.len() });
        ids
    }

    pub fn transition(&self, id: Uuid, transition: Transition) -> Result<JobItem> {
        self.transition_with(id, transition, |_| ())
    }

    /// Like [`JobSet::transition`], but runs `on_applied` on the new item while
    /// the write lock is still held and before the update is published.
    pub fn transition_with(
        &self,
        id: Uuid,
        transition: Transition,
        on_applied: impl FnOnce(&JobItem),
    ) -> Result<JobItem> {
        let updated = {
            let mut items = lock::write(&self.items, "jobs");
            let item = items
                .iter_mut()
                .find(|item| item.id() == id)
                .ok_or_else(|| BatchVisionError::NotFound(format!("job item {id}")))?;
            item.apply(transition)?;
            on_applied(item);
            item.clone()
        };

        tracing::debug!(
            item = %id,
            filename = %updated.filename(),
            state = %updated.state(),
            "Item transitioned"
        );
        self.events.send(BatchEvent::ItemUpdated {
            item: updated.clone(),
        });
        Ok(updated)
    }

    /// Moves every `Error` item back to `Ready` and returns how many moved.
    pub fn requeue_failed(&self) -> usize {
        let failed: Vec<Uuid> = lock::read(&self.items, "jobs")
            .iter()
            .filter(|item| item.state() == JobState::Error)
            .map(JobItem::id)
            .collect();

        failed
            .into_iter()
            .filter(|id| self.transition(*id, Transition::Requeue).is_ok())
            .count()
    }

    /// Items not yet `Done`, in input order.
    pub fn pending(&self) -> Vec<JobItem> {
        lock::read(&self.items, "jobs")
            .iter()
            .filter(|item| item.state() != JobState::Done)
            .cloned()
            .collect()
    }

    pub fn get(&self, id: Uuid) -> Option<JobItem> {
        lock::read(&self.items, "jobs")
            .iter()
            .find(|item| item.id() == id)
            .cloned()
    }

    pub fn snapshot(&self) -> Vec<JobItem> {
        lock::read(&self.items, "jobs").clone()
    }

    pub fn clear(&self) {
        lock::write(&self.items, "jobs").clear();
        self.events.send(BatchEvent::Cleared);
    }

    pub fn len(&self) -> usize {
        lock::read(&self.items, "jobs").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
