use thiserror::Error;

use crate::query::QueryId;

#[derive(Error, Debug)]
pub enum DataLayerError {
    /// The task could not be run at all.
    #[error("Task submission failed: {0}")]
    Submission(String),

    /// The store rejected the attempt to start the query.
    #[error("Failed to establish continuous query: {0}")]
    Establishment(String),

    /// The query was live and then broke.
    #[error("Continuous query failed: {0}")]
    QueryFailed(String),

    #[error("Task has already been executed")]
    AlreadyExecuted,

    #[error("Continuous query not found: {0}")]
    QueryNotFound(QueryId),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DataLayerError>;
