//! Fetches a server render waits for before serializing state.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use livebind_reactive::OneShot;
use livebind_types::{SourceRef, Value};

use crate::registry::InitialState;

struct Entry<E> {
    key: String,
    promise: OneShot<Value, E>,
}

type Entries<E> = Mutex<BTreeMap<u64, Entry<E>>>;

/// The set of in-flight first fetches of one app.
///
/// Every binding created during a server render registers its promise here,
/// and the render awaits [`wait_all`](Self::wait_all) before reading the
/// captured state.
pub struct PendingPromises<E> {
    entries: Arc<Entries<E>>,
    next_id: Arc<Mutex<u64>>,
}

impl<E> Clone for PendingPromises<E> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<E> PendingPromises<E>
where
    E: Clone + Send + Sync + 'static,
{
    /// An empty set.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(BTreeMap::new())),
            next_id: Arc::new(Mutex::new(0)),
        }
    }

    /// Defer `promise` into `state` and track it until removed.
    ///
    /// Returns `None` when the source has no usable key, in which case the
    /// value cannot be transferred and nothing is tracked.
    pub fn add(
        &self,
        state: &InitialState,
        source: &SourceRef,
        ssr_key: Option<&str>,
        promise: &OneShot<Value, E>,
    ) -> Option<PendingGuard<E>> {
        let Some(key) = state.defer(source, ssr_key, promise) else {
            if cfg!(debug_assertions) {
                warn!(source = %source, "binding has no key; its initial value will not be transferred");
            }
            return None;
        };
        let id = {
            let mut next = self.next_id.lock().expect("lock poisoned");
            *next += 1;
            *next
        };
        self.entries.lock().expect("lock poisoned").insert(
            id,
            Entry {
                key,
                promise: promise.clone(),
            },
        );
        Some(PendingGuard {
            id,
            entries: Arc::clone(&self.entries),
        })
    }

    /// Keys currently tracked, in registration order.
    pub fn keys(&self) -> Vec<String> {
        let entries = self.entries.lock().expect("lock poisoned");
        entries.values().map(|e| e.key.clone()).collect()
    }

    /// Number of tracked promises.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("lock poisoned").len()
    }

    /// `true` when nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for every tracked promise and return `(key, result)` pairs in
    /// registration order.
    ///
    /// Promises registered while waiting are not included.
    pub async fn wait_all(&self) -> Vec<(String, Result<Value, E>)> {
        let tracked: Vec<(String, OneShot<Value, E>)> = {
            let entries = self.entries.lock().expect("lock poisoned");
            entries
                .values()
                .map(|e| (e.key.clone(), e.promise.clone()))
                .collect()
        };
        debug!(count = tracked.len(), "waiting for pending fetches");
        let mut settled = Vec::with_capacity(tracked.len());
        for (key, promise) in tracked {
            settled.push((key, promise.wait().await));
        }
        settled
    }
}

impl<E> Default for PendingPromises<E>
where
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for PendingPromises<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.entries.lock().expect("lock poisoned").len();
        f.debug_struct("PendingPromises").field("len", &len).finish()
    }
}

/// Removes one tracked promise. Dropping the guard keeps it tracked.
pub struct PendingGuard<E> {
    id: u64,
    entries: Arc<Entries<E>>,
}

impl<E> PendingGuard<E> {
    /// Stop tracking the promise. Calling this more than once is harmless.
    pub fn remove(&self) {
        self.entries.lock().expect("lock poisoned").remove(&self.id);
    }
}

impl<E> fmt::Debug for PendingGuard<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingGuard").field("id", &self.id).finish()
    }
}
