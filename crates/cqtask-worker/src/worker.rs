use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use cqtask_core::{DataLayerError, StorageAdapter, Task};

use crate::{Result, TaskQueue, WorkerConfig, WorkerError};

type SharedReceiver = Arc<Mutex<mpsc::Receiver<Box<dyn Task>>>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub executed: usize,
    pub failed: usize,
    pub rejected: usize,
    pub panicked: usize,
}

enum Outcome {
    Executed,
    Failed,
    Panicked(String),
}

/// Runs queued tasks one at a time against the storage adapter it owns.
pub struct TaskWorker {
    adapter: Arc<dyn StorageAdapter>,
    rx: SharedReceiver,
    shutdown: watch::Receiver<bool>,
}

impl TaskWorker {
    pub fn new(
        adapter: Arc<dyn StorageAdapter>,
        rx: mpsc::Receiver<Box<dyn Task>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self::with_shared_receiver(adapter, Arc::new(Mutex::new(rx)), shutdown)
    }

    fn with_shared_receiver(
        adapter: Arc<dyn StorageAdapter>,
        rx: SharedReceiver,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            adapter,
            rx,
            shutdown,
        }
    }

    /// Process tasks until shutdown is signalled, the shutdown sender is
    /// dropped, or every queue handle is dropped. Tasks still queued at that
    /// point are failed, not run.
    pub async fn run(mut self) -> WorkerStats {
        tracing::info!("Task worker started");
        let mut stats = WorkerStats::default();

        loop {
            if *self.shutdown.borrow_and_update() {
                tracing::info!("Shutdown requested");
                break;
            }

            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        tracing::info!("Shutdown handle dropped");
                        break;
                    }
                }
                next = next_task(&self.rx) => match next {
                    Some(task) => self.run_task(task, &mut stats).await,
                    None => {
                        tracing::info!("All task queue handles dropped");
                        break;
                    }
                },
            }
        }

        stats.rejected += reject_queued(&self.rx).await;
        tracing::info!(
            "Task worker stopped: {} executed, {} failed, {} rejected, {} panicked",
            stats.executed,
            stats.failed,
            stats.rejected,
            stats.panicked
        );
        stats
    }

    async fn run_task(&self, mut task: Box<dyn Task>, stats: &mut WorkerStats) {
        let label = task.to_string();
        tracing::info!("Processing task: {}", label);

        let adapter = Arc::clone(&self.adapter);
        // execute may block on the store
        let outcome = tokio::task::spawn_blocking(move || {
            match panic::catch_unwind(AssertUnwindSafe(|| task.execute(adapter.as_ref()))) {
                Ok(Ok(())) => Outcome::Executed,
                Ok(Err(e)) => {
                    task.process_error(e);
                    Outcome::Failed
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    task.process_error(DataLayerError::Establishment(format!(
                        "task panicked: {}",
                        message
                    )));
                    Outcome::Panicked(message)
                }
            }
        })
        .await;

        match outcome {
            Ok(Outcome::Executed) => {
                stats.executed += 1;
                tracing::debug!("Task {} executed", label);
            }
            Ok(Outcome::Failed) => {
                stats.failed += 1;
                tracing::warn!("Task {} failed to execute", label);
            }
            Ok(Outcome::Panicked(message)) => {
                stats.panicked += 1;
                tracing::error!("Task {} panicked: {}", label, message);
            }
            // process_error itself panicked; the task is gone with it
            Err(e) => {
                stats.panicked += 1;
                tracing::error!("Task {} panicked while reporting an error: {}", label, e);
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

async fn next_task(rx: &Mutex<mpsc::Receiver<Box<dyn Task>>>) -> Option<Box<dyn Task>> {
    rx.lock().await.recv().await
}

/// Close the queue and fail everything still buffered in it.
async fn reject_queued(rx: &Mutex<mpsc::Receiver<Box<dyn Task>>>) -> usize {
    let mut rx = rx.lock().await;
    rx.close();

    let mut rejected = 0;
    while let Ok(task) = rx.try_recv() {
        tracing::warn!("Rejecting queued task on shutdown: {}", task);
        task.process_error(DataLayerError::Submission(
            "worker shut down before the task ran".to_string(),
        ));
        rejected += 1;
    }
    rejected
}

/// A running worker together with the queue that feeds it.
pub struct WorkerHandle {
    queue: TaskQueue,
    rx: SharedReceiver,
    shutdown: watch::Sender<bool>,
    join: JoinHandle<WorkerStats>,
    grace_ms: u64,
}

impl WorkerHandle {
    pub fn queue(&self) -> TaskQueue {
        self.queue.clone()
    }

    /// Signal shutdown and wait for the worker to finish its current task.
    ///
    /// If the grace period runs out the worker is aborted and every task still
    /// queued is failed with a submission error. A task already inside
    /// `execute` keeps running on its blocking thread and reports on its own.
    pub async fn shutdown(self) -> Result<WorkerStats> {
        // The worker may already be gone; the join below reports that.
        let _ = self.shutdown.send(true);

        let mut join = self.join;
        match tokio::time::timeout(Duration::from_millis(self.grace_ms), &mut join).await {
            Ok(Ok(stats)) => Ok(stats),
            Ok(Err(e)) => Err(WorkerError::Other(anyhow::anyhow!("worker task failed: {}", e))),
            Err(_) => {
                join.abort();
                // Wait for the abort so the worker no longer holds the receiver.
                let _ = join.await;

                let rejected = reject_queued(&self.rx).await;
                tracing::warn!(
                    "Task worker did not stop within {} ms; rejected {} queued tasks",
                    self.grace_ms,
                    rejected
                );
                Err(WorkerError::ShutdownTimeout(self.grace_ms))
            }
        }
    }
}

/// Start a worker on the current runtime.
pub fn spawn_worker(config: &WorkerConfig, adapter: Arc<dyn StorageAdapter>) -> Result<WorkerHandle> {
    config.validate()?;

    let (queue, rx) = TaskQueue::bounded(config.queue_capacity);
    let rx = Arc::new(Mutex::new(rx));
    let (shutdown, shutdown_rx) = watch::channel(false);
    let worker = TaskWorker::with_shared_receiver(adapter, Arc::clone(&rx), shutdown_rx);
    let join = tokio::spawn(worker.run());

    tracing::info!(
        "Spawned task worker (queue capacity {})",
        config.queue_capacity
    );

    Ok(WorkerHandle {
        queue,
        rx,
        shutdown,
        join,
        grace_ms: config.shutdown_grace_ms,
    })
}
