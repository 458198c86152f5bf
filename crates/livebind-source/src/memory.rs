//! In-memory remote source for embedding and testing.
//!
//! [`MemorySource`] holds plain values and ordered child lists keyed by
//! path. Mutations do not call listeners directly: they enqueue deliveries,
//! and [`flush`](MemorySource::flush) dispatches them one at a time in FIFO
//! order. This makes the event loop explicit and lets a test observe state
//! between "subscribed" and "first event delivered".

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use livebind_types::{join_path, Record, Snapshot, SourceRef, Value};

use crate::error::{SourceError, SourceResult};
use crate::subscription::Subscription;
use crate::traits::{ChildEvent, ChildFn, ErrorFn, RemoteSource, SnapshotFn};

enum Handler {
    Value(SnapshotFn),
    Child(ChildEvent, ChildFn),
}

struct Listener {
    path: String,
    handler: Handler,
    on_error: ErrorFn,
}

enum Delivery {
    Value(Snapshot),
    Child(Snapshot, Option<String>),
    Error(SourceError),
}

#[derive(Default)]
struct State {
    values: BTreeMap<String, Value>,
    lists: BTreeMap<String, Vec<(String, Value)>>,
    denied: BTreeSet<String>,
    listeners: BTreeMap<u64, Listener>,
    next_listener: u64,
}

impl State {
    /// Current value at `path`: a plain value, a list rendered as a record,
    /// or a child of a list.
    fn resolve(&self, path: &str) -> Value {
        if let Some(value) = self.values.get(path) {
            return value.clone();
        }
        if let Some(children) = self.lists.get(path) {
            if children.is_empty() {
                return Value::Null;
            }
            return Value::Record(
                children
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<Record>(),
            );
        }
        if let Some((parent, key)) = split_path(path) {
            if let Some(children) = self.lists.get(parent) {
                if let Some((_, v)) = children.iter().find(|(k, _)| k == key) {
                    return v.clone();
                }
            }
        }
        Value::Null
    }

    fn snapshot(&self, path: &str) -> Snapshot {
        Snapshot::new(last_segment(path), self.resolve(path))
    }

    fn value_listeners(&self, path: &str) -> Vec<u64> {
        self.listeners
            .iter()
            .filter(|(_, l)| l.path == path && matches!(l.handler, Handler::Value(_)))
            .map(|(id, _)| *id)
            .collect()
    }

    fn child_listeners(&self, path: &str, event: ChildEvent) -> Vec<u64> {
        self.listeners
            .iter()
            .filter(|(_, l)| {
                l.path == path && matches!(l.handler, Handler::Child(e, _) if e == event)
            })
            .map(|(id, _)| *id)
            .collect()
    }
}

struct Shared {
    state: Mutex<State>,
    queue: Mutex<VecDeque<(u64, Delivery)>>,
}

impl Shared {
    fn enqueue(&self, listener: u64, delivery: Delivery) {
        self.queue
            .lock()
            .expect("lock poisoned")
            .push_back((listener, delivery));
    }

    /// Queue a fresh value snapshot for every value listener on `paths`.
    fn enqueue_value_changes(&self, state: &State, paths: &[&str]) {
        for path in paths {
            for id in state.value_listeners(path) {
                self.enqueue(id, Delivery::Value(state.snapshot(path)));
            }
        }
    }

    fn enqueue_child(&self, state: &State, list: &str, event: ChildEvent, key: &str, prev: Option<String>) {
        let snapshot = state.snapshot(&join_path(list, key));
        for id in state.child_listeners(list, event) {
            self.enqueue(id, Delivery::Child(snapshot.clone(), prev.clone()));
        }
    }
}

/// An in-memory [`RemoteSource`] with an explicit dispatch queue.
#[derive(Clone)]
pub struct MemorySource {
    shared: Arc<Shared>,
}

impl MemorySource {
    /// An empty source with no listeners.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                queue: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Write a plain value at `path`.
    pub fn set(&self, path: &str, value: impl Into<Value>) {
        let mut state = self.shared.state.lock().expect("lock poisoned");
        state.values.insert(path.to_string(), value.into());
        self.shared.enqueue_value_changes(&state, &[path]);
    }

    /// Append a child at the end of the list at `list`.
    pub fn push(&self, list: &str, key: &str, value: impl Into<Value>) {
        let after = {
            let state = self.shared.state.lock().expect("lock poisoned");
            state
                .lists
                .get(list)
                .and_then(|children| children.last().map(|(k, _)| k.clone()))
        };
        self.insert_after(list, key, value, after.as_deref());
    }

    /// Insert a child right after the sibling `after` (or first when `None`).
    ///
    /// An unknown `after` key appends the child at the end.
    pub fn insert_after(&self, list: &str, key: &str, value: impl Into<Value>, after: Option<&str>) {
        let mut state = self.shared.state.lock().expect("lock poisoned");
        let children = state.lists.entry(list.to_string()).or_default();
        children.retain(|(k, _)| k != key);
        let index = position_after(children, after);
        children.insert(index, (key.to_string(), value.into()));
        let prev = index.checked_sub(1).map(|i| children[i].0.clone());
        trace!(list, key, index, "child added");
        self.shared.enqueue_child(&state, list, ChildEvent::Added, key, prev);
        self.shared
            .enqueue_value_changes(&state, &[list, &join_path(list, key)]);
    }

    /// Replace the value of an existing child. Unknown keys are ignored.
    pub fn change(&self, list: &str, key: &str, value: impl Into<Value>) {
        let mut state = self.shared.state.lock().expect("lock poisoned");
        let Some(children) = state.lists.get_mut(list) else {
            return;
        };
        let Some(index) = children.iter().position(|(k, _)| k == key) else {
            return;
        };
        children[index].1 = value.into();
        let prev = index.checked_sub(1).map(|i| children[i].0.clone());
        self.shared.enqueue_child(&state, list, ChildEvent::Changed, key, prev);
        self.shared
            .enqueue_value_changes(&state, &[list, &join_path(list, key)]);
    }

    /// Remove a child. Unknown keys are ignored.
    pub fn remove(&self, list: &str, key: &str) {
        let mut state = self.shared.state.lock().expect("lock poisoned");
        let Some(children) = state.lists.get_mut(list) else {
            return;
        };
        let Some(index) = children.iter().position(|(k, _)| k == key) else {
            return;
        };
        let (_, old) = children.remove(index);
        let snapshot = Snapshot::new(Some(key.to_string()), old);
        for id in state.child_listeners(list, ChildEvent::Removed) {
            self.shared
                .enqueue(id, Delivery::Child(snapshot.clone(), None));
        }
        self.shared
            .enqueue_value_changes(&state, &[list, &join_path(list, key)]);
    }

    /// Move an existing child right after `after` (or first when `None`).
    pub fn move_after(&self, list: &str, key: &str, after: Option<&str>) {
        let mut state = self.shared.state.lock().expect("lock poisoned");
        let Some(children) = state.lists.get_mut(list) else {
            return;
        };
        let Some(from) = children.iter().position(|(k, _)| k == key) else {
            return;
        };
        let entry = children.remove(from);
        let index = position_after(children, after);
        children.insert(index, entry);
        let prev = index.checked_sub(1).map(|i| children[i].0.clone());
        self.shared.enqueue_child(&state, list, ChildEvent::Moved, key, prev);
        self.shared.enqueue_value_changes(&state, &[list]);
    }

    /// Report a transient failure to every listener on `path`.
    pub fn fail(&self, path: &str, error: SourceError) {
        let state = self.shared.state.lock().expect("lock poisoned");
        let ids: Vec<u64> = state
            .listeners
            .iter()
            .filter(|(_, l)| l.path == path)
            .map(|(id, _)| *id)
            .collect();
        debug!(path, listeners = ids.len(), %error, "injecting source failure");
        for id in ids {
            self.shared.enqueue(id, Delivery::Error(error.clone()));
        }
    }

    /// Deny reads at `path`: new subscriptions and reads fail.
    pub fn deny(&self, path: &str) {
        self.shared
            .state
            .lock()
            .expect("lock poisoned")
            .denied
            .insert(path.to_string());
    }

    /// Keys of the list at `list`, in order.
    pub fn keys(&self, list: &str) -> Vec<String> {
        let state = self.shared.state.lock().expect("lock poisoned");
        state
            .lists
            .get(list)
            .map(|children| children.iter().map(|(k, _)| k.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of active listeners.
    pub fn listener_count(&self) -> usize {
        self.shared.state.lock().expect("lock poisoned").listeners.len()
    }

    /// Number of deliveries waiting to be dispatched.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().expect("lock poisoned").len()
    }

    /// Dispatch queued deliveries until the queue is empty.
    ///
    /// Deliveries queued by callbacks during the flush are dispatched too.
    /// Deliveries for listeners that unsubscribed in the meantime are
    /// dropped. Returns the number of callbacks invoked.
    pub fn flush(&self) -> usize {
        let mut dispatched = 0;
        loop {
            let next = self.shared.queue.lock().expect("lock poisoned").pop_front();
            let Some((id, delivery)) = next else {
                break;
            };
            if self.dispatch(id, delivery) {
                dispatched += 1;
            }
        }
        dispatched
    }

    fn dispatch(&self, id: u64, delivery: Delivery) -> bool {
        // Clone the callbacks out so listeners can subscribe or unsubscribe.
        let (handler, on_error) = {
            let state = self.shared.state.lock().expect("lock poisoned");
            let Some(listener) = state.listeners.get(&id) else {
                return false;
            };
            let handler = match &listener.handler {
                Handler::Value(f) => Handler::Value(Arc::clone(f)),
                Handler::Child(e, f) => Handler::Child(*e, Arc::clone(f)),
            };
            (handler, Arc::clone(&listener.on_error))
        };
        match (delivery, handler) {
            (Delivery::Value(snapshot), Handler::Value(f)) => f(snapshot),
            (Delivery::Child(snapshot, prev), Handler::Child(_, f)) => f(snapshot, prev),
            (Delivery::Error(error), _) => on_error(error),
            _ => return false,
        }
        true
    }

    fn register(&self, path: &str, handler: Handler, on_error: ErrorFn) -> (u64, Subscription) {
        let mut state = self.shared.state.lock().expect("lock poisoned");
        let id = state.next_listener;
        state.next_listener += 1;
        state.listeners.insert(
            id,
            Listener {
                path: path.to_string(),
                handler,
                on_error,
            },
        );
        let weak = Arc::downgrade(&self.shared);
        let sub = Subscription::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared
                    .state
                    .lock()
                    .expect("lock poisoned")
                    .listeners
                    .remove(&id);
            }
        });
        (id, sub)
    }

    fn is_denied(&self, path: &str) -> bool {
        self.shared
            .state
            .lock()
            .expect("lock poisoned")
            .denied
            .contains(path)
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySource")
            .field("listeners", &self.listener_count())
            .field("pending", &self.pending())
            .finish()
    }
}

impl RemoteSource for MemorySource {
    fn subscribe_value(
        &self,
        source: &SourceRef,
        on_snapshot: SnapshotFn,
        on_error: ErrorFn,
    ) -> Subscription {
        let path = source.path();
        let (id, sub) = self.register(path, Handler::Value(on_snapshot), on_error);
        if self.is_denied(path) {
            self.shared.enqueue(id, Delivery::Error(denied(path)));
        } else {
            let snapshot = self.shared.state.lock().expect("lock poisoned").snapshot(path);
            self.shared.enqueue(id, Delivery::Value(snapshot));
        }
        debug!(path, listener = id, "value subscription");
        sub
    }

    fn subscribe_child(
        &self,
        source: &SourceRef,
        event: ChildEvent,
        on_event: ChildFn,
        on_error: ErrorFn,
    ) -> Subscription {
        let path = source.path();
        let (id, sub) = self.register(path, Handler::Child(event, on_event), on_error);
        if self.is_denied(path) {
            self.shared.enqueue(id, Delivery::Error(denied(path)));
        } else if event == ChildEvent::Added {
            let state = self.shared.state.lock().expect("lock poisoned");
            let mut prev: Option<String> = None;
            for (key, value) in state.lists.get(path).into_iter().flatten() {
                let snapshot = Snapshot::new(Some(key.clone()), value.clone());
                self.shared.enqueue(id, Delivery::Child(snapshot, prev.clone()));
                prev = Some(key.clone());
            }
        }
        debug!(path, listener = id, %event, "child subscription");
        sub
    }

    fn get(&self, source: &SourceRef) -> SourceResult<Snapshot> {
        let path = source.path();
        if self.is_denied(path) {
            return Err(denied(path));
        }
        Ok(self.shared.state.lock().expect("lock poisoned").snapshot(path))
    }
}

fn denied(path: &str) -> SourceError {
    SourceError::PermissionDenied {
        path: path.to_string(),
    }
}

fn position_after(children: &[(String, Value)], after: Option<&str>) -> usize {
    match after {
        None => 0,
        Some(after) => children
            .iter()
            .position(|(k, _)| k == after)
            .map(|i| i + 1)
            .unwrap_or(children.len()),
    }
}

fn split_path(path: &str) -> Option<(&str, &str)> {
    let trimmed = path.trim_end_matches('/');
    let i = trimmed.rfind('/')?;
    Some((&trimmed[..i], &trimmed[i + 1..]))
}

fn last_segment(path: &str) -> Option<String> {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
