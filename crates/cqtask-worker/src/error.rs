use cqtask_core::DataLayerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Task queue is full (capacity {0})")]
    QueueFull(usize),

    #[error("Task queue is closed")]
    QueueClosed,

    #[error("Invalid worker configuration: {0}")]
    InvalidConfig(String),

    #[error("Worker did not stop within {0} ms")]
    ShutdownTimeout(u64),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Data layer error: {0}")]
    DataLayer(#[from] DataLayerError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
