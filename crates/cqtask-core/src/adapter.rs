use std::sync::Arc;

use crate::{ContinuousQuery, QueryFilter, QueryId, Result, ResultListener};

/// Owns the physical connection to the token store.
///
/// Calls may block for as long as the store takes to answer; the worker runs
/// them off the async executor.
pub trait StorageAdapter: Send + Sync {
    /// Start a continuous query. From the moment this returns, matching
    /// changes and later failures are pushed straight into `listener`.
    fn start_continuous_query(
        &self,
        filter: &QueryFilter,
        listener: Arc<dyn ResultListener>,
    ) -> Result<ContinuousQuery>;

    /// Stop a live query. No callbacks reach its listener afterwards.
    fn stop_continuous_query(&self, id: &QueryId) -> Result<()>;
}
