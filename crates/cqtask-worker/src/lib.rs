pub mod config;
pub mod error;
pub mod memory;
pub mod queue;
pub mod worker;

pub use self::config::WorkerConfig;
pub use error::{Result, WorkerError};
pub use memory::InMemoryStore;
pub use queue::{TaskDispatcher, TaskQueue};
pub use worker::{spawn_worker, TaskWorker, WorkerHandle, WorkerStats};
