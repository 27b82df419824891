pub mod adapter;
pub mod error;
pub mod filter;
pub mod listener;
pub mod promise;
pub mod query;
pub mod task;

// Re-exports
pub use adapter::StorageAdapter;
pub use error::{DataLayerError, Result};
pub use filter::{FilterCondition, QueryFilter, QueryFilterBuilder};
pub use listener::{ChangeEvent, ChangeType, ChannelListener, ListenerEvent, ResultListener};
pub use promise::QueryPromise;
pub use query::{ContinuousQuery, QueryId};
pub use task::{ContinuousQueryTask, Task, TaskState};
