use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::QueryFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryId(Uuid);

impl QueryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for QueryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for QueryId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Handle to a continuous query that is live in the store.
///
/// Whoever holds a copy can stop the query through
/// [`StorageAdapter::stop_continuous_query`](crate::StorageAdapter::stop_continuous_query).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuousQuery {
    pub id: QueryId,
    pub filter: QueryFilter,
    pub started_at: DateTime<Utc>,
}

impl ContinuousQuery {
    pub fn new(filter: QueryFilter) -> Self {
        Self {
            id: QueryId::new(),
            filter,
            started_at: Utc::now(),
        }
    }
}

impl fmt::Display for ContinuousQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContinuousQuery {} {}", self.id, self.filter)
    }
}
