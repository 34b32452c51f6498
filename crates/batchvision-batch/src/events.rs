use std::sync::Arc;

use tokio::sync::broadcast;

use batchvision_core::batch::BatchEvent;

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Fan-out of batch changes to any number of observers.
///
/// Observers only ever receive owned copies; a slow observer lags and
/// loses events rather than holding up the run.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<BatchEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: BatchEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.receiver_count(), 2);

        bus.send(BatchEvent::FilesAdded { count: 3 });

        for rx in [&mut first, &mut second] {
            match rx.recv().await.unwrap() {
                BatchEvent::FilesAdded { count } => assert_eq!(count, 3),
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[test]
    fn test_send_without_subscribers() {
        let bus = EventBus::new(4);
        bus.send(BatchEvent::Cleared);
        assert_eq!(bus.receiver_count(), 0);
    }
}
