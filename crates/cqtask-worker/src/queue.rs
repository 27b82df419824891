use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use cqtask_core::{
    ContinuousQuery, ContinuousQueryTask, DataLayerError, QueryFilter, QueryPromise,
    ResultListener, Task,
};

use crate::{Result, WorkerError};

/// Submission side of the data layer.
///
/// A task that cannot be accepted is told so through
/// [`Task::process_error`] before the submitter sees the `Err`.
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    async fn submit(&self, task: Box<dyn Task>) -> Result<()>;

    /// Submit a continuous query and return its handle promise.
    ///
    /// Results and errors, including a failed submission, are delivered to
    /// `listener`.
    async fn continuous_query(
        &self,
        filter: QueryFilter,
        listener: Arc<dyn ResultListener>,
    ) -> Result<QueryPromise<ContinuousQuery>> {
        let task = ContinuousQueryTask::new(filter, listener);
        let query = task.query();
        self.submit(Box::new(task)).await?;
        Ok(query)
    }
}

/// Bounded queue feeding a [`TaskWorker`](crate::TaskWorker).
#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::Sender<Box<dyn Task>>,
    capacity: usize,
}

impl TaskQueue {
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<Box<dyn Task>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, capacity }, rx)
    }

    /// Submit without waiting for room in the queue.
    pub fn try_submit(&self, task: Box<dyn Task>) -> Result<()> {
        match self.tx.try_send(task) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(task)) => {
                tracing::warn!("Task queue full, rejecting {}", task);
                task.process_error(DataLayerError::Submission(format!(
                    "task queue is full (capacity {})",
                    self.capacity
                )));
                Err(WorkerError::QueueFull(self.capacity))
            }
            Err(TrySendError::Closed(task)) => {
                reject_closed(task);
                Err(WorkerError::QueueClosed)
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[async_trait]
impl TaskDispatcher for TaskQueue {
    async fn submit(&self, task: Box<dyn Task>) -> Result<()> {
        tracing::debug!("Submitting {}", task);
        self.tx.send(task).await.map_err(|e| {
            reject_closed(e.0);
            WorkerError::QueueClosed
        })
    }
}

fn reject_closed(task: Box<dyn Task>) {
    tracing::warn!("Task queue closed, rejecting {}", task);
    task.process_error(DataLayerError::Submission(
        "task queue is closed".to_string(),
    ));
}
