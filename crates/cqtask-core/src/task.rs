use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{
    ContinuousQuery, DataLayerError, QueryFilter, QueryPromise, Result, ResultListener,
    StorageAdapter,
};

/// A unit of work run by the data-layer worker against its storage adapter.
pub trait Task: Send + fmt::Display {
    /// Run the task. An `Err` means the task did nothing useful; the worker
    /// hands it back through [`process_error`](Self::process_error).
    fn execute(&mut self, adapter: &dyn StorageAdapter) -> Result<()>;

    /// The task could not be run, or running it failed.
    fn process_error(&self, error: DataLayerError);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Created,
    Live,
    FailedAtSubmission,
}

/// Proof that `execute` has not run yet. Taken on the first call.
#[derive(Debug)]
struct ExecutionPermit;

/// Task that starts a continuous query and hands back its handle.
///
/// The submitter keeps [`query`](Self::query) to learn when the query is live;
/// results and every kind of failure go to the listener instead, so the
/// promise only ever carries the success case.
pub struct ContinuousQueryTask {
    filter: QueryFilter,
    listener: Arc<dyn ResultListener>,
    query: QueryPromise<ContinuousQuery>,
    permit: Option<ExecutionPermit>,
    failed: AtomicBool,
}

impl ContinuousQueryTask {
    pub fn new(filter: QueryFilter, listener: Arc<dyn ResultListener>) -> Self {
        Self {
            filter,
            listener,
            query: QueryPromise::new(),
            permit: Some(ExecutionPermit),
            failed: AtomicBool::new(false),
        }
    }

    /// The eventual live query. Resolved once `execute` succeeds, never
    /// resolved if the task fails.
    pub fn query(&self) -> QueryPromise<ContinuousQuery> {
        self.query.clone()
    }

    pub fn filter(&self) -> &QueryFilter {
        &self.filter
    }

    pub fn state(&self) -> TaskState {
        if self.query.is_resolved() {
            TaskState::Live
        } else if self.failed.load(Ordering::Acquire) {
            TaskState::FailedAtSubmission
        } else {
            TaskState::Created
        }
    }
}

impl Task for ContinuousQueryTask {
    fn execute(&mut self, adapter: &dyn StorageAdapter) -> Result<()> {
        let _permit = self.permit.take().ok_or(DataLayerError::AlreadyExecuted)?;

        tracing::debug!("Starting continuous query: {}", self.filter);
        let query = adapter.start_continuous_query(&self.filter, Arc::clone(&self.listener))?;
        tracing::info!("Continuous query live: {} ({})", self.filter, query.id);

        self.query.resolve(query);
        Ok(())
    }

    fn process_error(&self, error: DataLayerError) {
        tracing::warn!("{} failed: {}", self, error);
        self.failed.store(true, Ordering::Release);
        self.listener.on_error(error);
    }
}

impl fmt::Display for ContinuousQueryTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContinuousQueryTask: {}", self.filter)
    }
}

impl fmt::Debug for ContinuousQueryTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuousQueryTask")
            .field("filter", &self.filter)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChangeEvent, ChangeType, QueryId};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingListener {
        results: Mutex<Vec<ChangeEvent>>,
        errors: Mutex<Vec<String>>,
    }

    impl ResultListener for RecordingListener {
        fn on_result(&self, event: ChangeEvent) {
            self.results.lock().unwrap().push(event);
        }

        fn on_error(&self, error: DataLayerError) {
            self.errors.lock().unwrap().push(error.to_string());
        }
    }

    struct FixedAdapter {
        handle: ContinuousQuery,
        calls: AtomicUsize,
        listener: Mutex<Option<Arc<dyn ResultListener>>>,
    }

    impl FixedAdapter {
        fn new(handle: ContinuousQuery) -> Self {
            Self {
                handle,
                calls: AtomicUsize::new(0),
                listener: Mutex::new(None),
            }
        }
    }

    impl StorageAdapter for FixedAdapter {
        fn start_continuous_query(
            &self,
            _filter: &QueryFilter,
            listener: Arc<dyn ResultListener>,
        ) -> Result<ContinuousQuery> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.listener.lock().unwrap() = Some(listener);
            Ok(self.handle.clone())
        }

        fn stop_continuous_query(&self, _id: &QueryId) -> Result<()> {
            Ok(())
        }
    }

    struct RefusingAdapter;

    impl StorageAdapter for RefusingAdapter {
        fn start_continuous_query(
            &self,
            _filter: &QueryFilter,
            _listener: Arc<dyn ResultListener>,
        ) -> Result<ContinuousQuery> {
            Err(DataLayerError::Establishment("connection refused".to_string()))
        }

        fn stop_continuous_query(&self, id: &QueryId) -> Result<()> {
            Err(DataLayerError::QueryNotFound(*id))
        }
    }

    fn session_filter() -> QueryFilter {
        QueryFilter::builder()
            .equals("coreTokenType", "SESSION")
            .build()
            .unwrap()
    }

    #[test]
    fn test_new_task_is_unresolved() {
        let listener = Arc::new(RecordingListener::default());
        let task = ContinuousQueryTask::new(session_filter(), listener);

        assert_eq!(task.state(), TaskState::Created);
        assert!(!task.query().is_resolved());
    }

    #[test]
    fn test_execute_resolves_with_adapter_handle() {
        let listener = Arc::new(RecordingListener::default());
        let mut task = ContinuousQueryTask::new(session_filter(), listener);
        let handle = ContinuousQuery::new(session_filter());
        let adapter = FixedAdapter::new(handle.clone());

        let observed = Arc::new(Mutex::new(Vec::new()));
        let sink = observed.clone();
        task.query()
            .on_resolved(move |q: &ContinuousQuery| sink.lock().unwrap().push(q.id));

        task.execute(&adapter).unwrap();

        assert_eq!(task.state(), TaskState::Live);
        assert_eq!(task.query().get(), Some(handle.clone()));
        assert_eq!(*observed.lock().unwrap(), vec![handle.id]);
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_execute_passes_listener_through() {
        let listener = Arc::new(RecordingListener::default());
        let mut task = ContinuousQueryTask::new(session_filter(), listener.clone());
        let adapter = FixedAdapter::new(ContinuousQuery::new(session_filter()));

        task.execute(&adapter).unwrap();

        let pushed = adapter.listener.lock().unwrap().clone().unwrap();
        pushed.on_result(ChangeEvent::new("token-1", ChangeType::Added));
        pushed.on_error(DataLayerError::QueryFailed("disconnected".to_string()));

        let results = listener.results.lock().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].token_id, "token-1");
        assert_eq!(
            *listener.errors.lock().unwrap(),
            vec!["Continuous query failed: disconnected".to_string()]
        );
    }

    #[test]
    fn test_second_execute_is_rejected() {
        let listener = Arc::new(RecordingListener::default());
        let mut task = ContinuousQueryTask::new(session_filter(), listener);
        let first = ContinuousQuery::new(session_filter());
        let adapter = FixedAdapter::new(first.clone());

        task.execute(&adapter).unwrap();
        let second = task.execute(&adapter);

        assert!(matches!(second, Err(DataLayerError::AlreadyExecuted)));
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
        assert_eq!(task.query().get().map(|q| q.id), Some(first.id));
    }

    #[test]
    fn test_process_error_goes_to_listener_only() {
        let listener = Arc::new(RecordingListener::default());
        let task = ContinuousQueryTask::new(session_filter(), listener.clone());

        task.process_error(DataLayerError::Submission("queue closed".to_string()));

        assert_eq!(
            *listener.errors.lock().unwrap(),
            vec!["Task submission failed: queue closed".to_string()]
        );
        assert!(!task.query().is_resolved());
        assert_eq!(task.state(), TaskState::FailedAtSubmission);
    }

    #[test]
    fn test_establishment_failure_leaves_promise_unresolved() {
        let listener = Arc::new(RecordingListener::default());
        let mut task = ContinuousQueryTask::new(session_filter(), listener.clone());

        let err = task.execute(&RefusingAdapter).unwrap_err();
        assert!(matches!(err, DataLayerError::Establishment(_)));
        assert!(!task.query().is_resolved());

        task.process_error(err);
        assert_eq!(listener.errors.lock().unwrap().len(), 1);
        assert_eq!(task.state(), TaskState::FailedAtSubmission);

        // The permit is spent even though the store refused.
        assert!(matches!(
            task.execute(&RefusingAdapter),
            Err(DataLayerError::AlreadyExecuted)
        ));
    }

    #[test]
    fn test_display_includes_filter() {
        let listener = Arc::new(RecordingListener::default());
        let task = ContinuousQueryTask::new(session_filter(), listener);

        assert_eq!(
            task.to_string(),
            "ContinuousQueryTask: (coreTokenType=SESSION)"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_observers_before_and_after_execution() {
        let listener = Arc::new(RecordingListener::default());
        let mut task = ContinuousQueryTask::new(session_filter(), listener);
        let handle = ContinuousQuery::new(session_filter());

        let early_a = tokio::spawn({
            let query = task.query();
            async move { query.wait().await }
        });
        let early_b = tokio::spawn({
            let query = task.query();
            async move { query.wait().await }
        });

        let adapter = FixedAdapter::new(handle.clone());
        let task = tokio::task::spawn_blocking(move || {
            task.execute(&adapter).unwrap();
            task
        })
        .await
        .unwrap();

        let late = task.query().get();

        assert_eq!(early_a.await.unwrap(), handle);
        assert_eq!(early_b.await.unwrap(), handle);
        assert_eq!(late, Some(handle));
    }
}
