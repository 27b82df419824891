use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

use crate::DataLayerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

/// A change to a stored token that matched a continuous query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub token_id: String,
    pub change_type: ChangeType,
    pub attributes: BTreeMap<String, String>,
    pub observed_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(token_id: impl Into<String>, change_type: ChangeType) -> Self {
        Self {
            token_id: token_id.into(),
            change_type,
            attributes: BTreeMap::new(),
            observed_at: Utc::now(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// Receives everything a continuous query produces after submission.
///
/// Both callbacks may fire any number of times, from whichever thread the
/// store or the worker happens to run on. Implementations must not block for
/// long and have no way to report failure back to the caller.
pub trait ResultListener: Send + Sync {
    /// A token matching the query's filter changed.
    fn on_result(&self, event: ChangeEvent);

    /// Submission, establishment or a live query failed.
    fn on_error(&self, error: DataLayerError);
}

/// What a [`ChannelListener`] forwards to its receiver.
#[derive(Debug)]
pub enum ListenerEvent {
    Result(ChangeEvent),
    Error(DataLayerError),
}

/// Listener that turns the callbacks into an unbounded stream, preserving
/// delivery order across results and errors.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<ListenerEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ListenerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ResultListener for ChannelListener {
    fn on_result(&self, event: ChangeEvent) {
        if self.tx.send(ListenerEvent::Result(event)).is_err() {
            tracing::debug!("Listener receiver dropped, discarding result");
        }
    }

    fn on_error(&self, error: DataLayerError) {
        if let Err(e) = self.tx.send(ListenerEvent::Error(error)) {
            tracing::debug!("Listener receiver dropped, discarding error: {:?}", e.0);
        }
    }
}
