use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use cqtask_core::{
    ChangeEvent, ContinuousQuery, DataLayerError, QueryFilter, QueryId, Result, ResultListener,
    StorageAdapter,
};

struct Registration {
    query: ContinuousQuery,
    listener: Arc<dyn ResultListener>,
}

/// Token store kept in process memory.
///
/// Every live query is checked against each published change, in the order
/// the queries were started.
pub struct InMemoryStore {
    queries: RwLock<Vec<Registration>>,
    available: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            queries: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }

    /// While unavailable, starting a query fails. Live queries are unaffected.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    pub fn live_queries(&self) -> usize {
        self.read().len()
    }

    /// Push a change to every live query whose filter matches it.
    /// Returns how many listeners received it.
    pub fn publish(&self, event: &ChangeEvent) -> usize {
        let targets: Vec<(Arc<dyn ResultListener>, ChangeEvent)> = self
            .read()
            .iter()
            .filter(|r| matches(&r.query.filter, event))
            .map(|r| (Arc::clone(&r.listener), project(&r.query.filter, event)))
            .collect();

        tracing::debug!(
            "Publishing {} ({:?}) to {} queries",
            event.token_id,
            event.change_type,
            targets.len()
        );

        let delivered = targets.len();
        for (listener, event) in targets {
            listener.on_result(event);
        }
        delivered
    }

    /// Drop the connection: every live query gets a `QueryFailed` error and
    /// is forgotten. Returns how many were affected.
    pub fn disconnect(&self, reason: &str) -> usize {
        let dropped = std::mem::take(&mut *self.write());
        tracing::warn!("Store disconnected ({}), failing {} queries", reason, dropped.len());

        let count = dropped.len();
        for registration in dropped {
            registration
                .listener
                .on_error(DataLayerError::QueryFailed(reason.to_string()));
        }
        count
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Registration>> {
        self.queries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Registration>> {
        self.queries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageAdapter for InMemoryStore {
    fn start_continuous_query(
        &self,
        filter: &QueryFilter,
        listener: Arc<dyn ResultListener>,
    ) -> Result<ContinuousQuery> {
        if !self.available.load(Ordering::Acquire) {
            return Err(DataLayerError::Establishment(
                "store is unavailable".to_string(),
            ));
        }

        let query = ContinuousQuery::new(filter.clone());
        self.write().push(Registration {
            query: query.clone(),
            listener,
        });

        tracing::info!("Registered continuous query {} for {}", query.id, filter);
        Ok(query)
    }

    fn stop_continuous_query(&self, id: &QueryId) -> Result<()> {
        let mut queries = self.write();
        let position = queries
            .iter()
            .position(|r| r.query.id == *id)
            .ok_or(DataLayerError::QueryNotFound(*id))?;
        queries.remove(position);

        tracing::info!("Stopped continuous query {}", id);
        Ok(())
    }
}

fn matches(filter: &QueryFilter, event: &ChangeEvent) -> bool {
    filter
        .conditions()
        .iter()
        .all(|c| event.attributes.get(&c.attribute) == Some(&c.value))
}

fn project(filter: &QueryFilter, event: &ChangeEvent) -> ChangeEvent {
    if filter.return_attributes().is_empty() {
        return event.clone();
    }

    let attributes: BTreeMap<String, String> = event
        .attributes
        .iter()
        .filter(|(name, _)| filter.return_attributes().contains(*name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    ChangeEvent {
        attributes,
        ..event.clone()
    }
}
