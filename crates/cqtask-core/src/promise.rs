use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

type Callback<T> = Box<dyn FnOnce(&T) + Send + 'static>;

struct State<T> {
    value: Option<T>,
    callbacks: Vec<Callback<T>>,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    notify: Notify,
}

/// A slot that is written at most once and can never hold a failure.
///
/// Clones share the same slot. The first [`resolve`](Self::resolve) wins and
/// every later one is ignored. Observers either await [`wait`](Self::wait) or
/// register a callback with [`on_resolved`](Self::on_resolved); each observer
/// sees the value exactly once, immediately if it is already set.
pub struct QueryPromise<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for QueryPromise<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> QueryPromise<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    value: None,
                    callbacks: Vec::new(),
                }),
                notify: Notify::new(),
            }),
        }
    }

    /// Store `value` if nothing has been stored yet.
    ///
    /// Returns `false` when the promise was already resolved; the held value
    /// is left untouched in that case.
    pub fn resolve(&self, value: T) -> bool {
        let callbacks = {
            let mut state = self.lock();
            if state.value.is_some() {
                return false;
            }
            state.value = Some(value.clone());
            std::mem::take(&mut state.callbacks)
        };

        self.shared.notify.notify_waiters();
        for callback in callbacks {
            callback(&value);
        }
        true
    }

    pub fn is_resolved(&self) -> bool {
        self.lock().value.is_some()
    }

    /// The value, if already resolved. Never waits.
    pub fn get(&self) -> Option<T> {
        self.lock().value.clone()
    }

    /// Wait until the promise is resolved.
    ///
    /// Pending forever if nothing ever resolves it; there is no timeout.
    pub async fn wait(&self) -> T {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent resolve cannot slip
            // between the check and the await.
            notified.as_mut().enable();

            if let Some(value) = self.get() {
                return value;
            }
            notified.await;
        }
    }

    /// Run `callback` once with the value: now if resolved, otherwise on the
    /// thread that resolves the promise.
    pub fn on_resolved<F>(&self, callback: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        let mut state = self.lock();
        match state.value.clone() {
            Some(value) => {
                drop(state);
                callback(&value);
            }
            None => state.callbacks.push(Box::new(callback)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // Callbacks run outside the lock, so a poisoned state is still consistent.
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone + Send + 'static> Default for QueryPromise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + fmt::Debug + 'static> fmt::Debug for QueryPromise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("QueryPromise")
            .field("value", &state.value)
            .field("pending_callbacks", &state.callbacks.len())
            .finish()
    }
}
