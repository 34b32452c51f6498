use std::collections::VecDeque;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

use futures::future::join_all;

/// A fixed number of logical workers draining one FIFO queue.
///
/// Workers run cooperatively on the calling task. Each takes the next
/// queued item as soon as its previous one finishes, so at most `limit`
/// items are in flight and a slow item never holds back the others.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    limit: NonZeroUsize,
}

impl WorkerPool {
    /// A limit of zero is treated as one.
    pub fn new(limit: usize) -> Self {
        Self {
            limit: NonZeroUsize::new(limit).unwrap_or(NonZeroUsize::MIN),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit.get()
    }

    /// Runs `work` over every item and resolves once all of them have
    /// finished. Items start in input order; outputs are grouped per worker,
    /// not in input order.
    pub async fn run<T, R, F, Fut>(&self, items: Vec<T>, work: F) -> Vec<R>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = R>,
    {
        let workers = self.limit.get().min(items.len());
        let queue = Mutex::new(VecDeque::from(items));

        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            handles.push(drain(worker, &queue, &work));
        }

        join_all(handles).await.into_iter().flatten().collect()
    }
}

async fn drain<T, R, F, Fut>(worker: usize, queue: &Mutex<VecDeque<T>>, work: &F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let mut outputs = Vec::new();
    loop {
        let next = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let Some(item) = next else {
            break;
        };
        outputs.push(work(item).await);
    }
    tracing::trace!(worker, handled = outputs.len(), "Worker drained queue");
    outputs
}
