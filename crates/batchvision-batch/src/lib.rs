//! The batch job controller: tracked files, bounded extraction runs and
//! the results they produce.

mod aggregate;
mod coerce;
mod controller;
mod events;
mod export;
mod job_set;
mod lock;
mod pool;
mod scheduler;

pub use aggregate::ResultAggregate;
pub use coerce::{coerce_field, validate_response};
pub use controller::BatchController;
pub use events::{EventBus, DEFAULT_EVENT_CAPACITY};
pub use export::{to_csv, EXPORT_FILENAME};
pub use job_set::JobSet;
pub use pool::WorkerPool;
pub use scheduler::BatchScheduler;
