//! Binding an ordered collection to an array cell.
//!
//! The reconciler applies the four structural child events to a local item
//! array, locating items by the id the serializer gave them:
//!
//! | event   | effect |
//! |---------|--------|
//! | added   | insert after the `prev` key, or at the front |
//! | removed | delete the item with the snapshot key |
//! | changed | replace the item with the snapshot key in place |
//! | moved   | remove the item, then insert it after `prev` |
//!
//! With `wait` set, items accumulate in a staging array that is published
//! to the target in one write when the initial load completes. Without it,
//! the target is cleared up front and updated on every event.

use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use livebind_reactive::ReactiveCell;
use livebind_source::{ChildEvent, ChildFn, RemoteSource, SnapshotFn};
use livebind_types::{Snapshot, SourceRef, Value};

use crate::config::BindOptions;
use crate::control::{Listeners, Progress, Shape, Unbind};
use crate::ops::Operations;
use crate::serialize::{index_for_key, Serializer};

/// Index at which an item following `after` is inserted.
///
/// An unknown `after` key inserts at the front.
pub fn insertion_index(items: &[Value], after: Option<&str>) -> usize {
    after
        .and_then(|key| index_for_key(items, key))
        .map_or(0, |index| index + 1)
}

struct Reconciler {
    source: SourceRef,
    target: ReactiveCell<Value>,
    serializer: Arc<dyn Serializer>,
    ops: Arc<dyn Operations>,
    /// Items collected before the initial load completes, in `wait` mode.
    staging: Mutex<Option<Vec<Value>>>,
}

impl Reconciler {
    fn with_items<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        let mut staging = self.staging.lock().expect("lock poisoned");
        if let Some(items) = staging.as_mut() {
            return f(items);
        }
        drop(staging);
        self.target.update(|value| {
            let mut items = match std::mem::take(value) {
                Value::Array(items) => items,
                _ => Vec::new(),
            };
            let result = f(&mut items);
            *value = Value::Array(items);
            result
        })
    }

    fn apply(&self, event: ChildEvent, snapshot: Snapshot, prev: Option<String>) {
        match event {
            ChildEvent::Added => self.added(&snapshot, prev.as_deref()),
            ChildEvent::Removed => self.removed(&snapshot),
            ChildEvent::Changed => self.changed(&snapshot),
            ChildEvent::Moved => self.moved(&snapshot, prev.as_deref()),
        }
    }

    fn added(&self, snapshot: &Snapshot, prev: Option<&str>) {
        let value = self.serializer.serialize(snapshot);
        self.with_items(|items| {
            let index = insertion_index(items, prev);
            self.ops.add(items, index, value);
        });
    }

    fn removed(&self, snapshot: &Snapshot) {
        let Some(key) = snapshot.key() else {
            return;
        };
        self.with_items(|items| match index_for_key(items, key) {
            Some(index) => {
                self.ops.remove(items, index);
            }
            None => trace!(source = %self.source, key, "removed child not tracked"),
        });
    }

    fn changed(&self, snapshot: &Snapshot) {
        let Some(key) = snapshot.key() else {
            return;
        };
        let value = self.serializer.serialize(snapshot);
        self.with_items(|items| match index_for_key(items, key) {
            Some(index) => self.ops.replace(items, index, value),
            None => trace!(source = %self.source, key, "changed child not tracked"),
        });
    }

    fn moved(&self, snapshot: &Snapshot, prev: Option<&str>) {
        let Some(key) = snapshot.key() else {
            return;
        };
        self.with_items(|items| {
            let Some(index) = index_for_key(items, key) else {
                trace!(source = %self.source, key, "moved child not tracked");
                return;
            };
            let Some(item) = self.ops.remove(items, index) else {
                return;
            };
            let index = insertion_index(items, prev);
            self.ops.add(items, index, item);
        });
    }

    /// Publish staged items, if any, and return the current list.
    fn complete(&self) -> Value {
        let staged = self.staging.lock().expect("lock poisoned").take();
        if let Some(items) = staged {
            self.ops.set(&self.target, Value::Array(items));
        }
        self.target.get()
    }
}

/// Keep `target` equal to the ordered collection at `source`.
///
/// `progress` resolves with the list once the initial load completes. The
/// completion listener fires at most once and is removed on stop even if it
/// never fired. An absent `source` resolves to `Null` and returns an unbind
/// that does nothing.
pub fn bind_as_list(
    remote: &dyn RemoteSource,
    source: Option<&SourceRef>,
    target: &ReactiveCell<Value>,
    progress: &Progress,
    options: &BindOptions,
) -> Unbind {
    let Some(source) = source else {
        progress.resolve(Value::Null);
        return Unbind::noop();
    };
    let wait = options.config().wait;
    let once = options.config().once;
    if !wait {
        options.ops().set(target, Value::Array(Vec::new()));
    }

    let reconciler = Arc::new(Reconciler {
        source: source.clone(),
        target: target.clone(),
        serializer: Arc::clone(options.serializer()),
        ops: Arc::clone(options.ops()),
        staging: Mutex::new(wait.then(Vec::new)),
    });

    let listeners = Listeners::new();
    for event in ChildEvent::ALL {
        let on_event: ChildFn = {
            let reconciler = Arc::clone(&reconciler);
            let listeners = listeners.clone();
            Arc::new(move |snapshot: Snapshot, prev: Option<String>| {
                if !listeners.is_cancelled() {
                    reconciler.apply(event, snapshot, prev);
                }
            })
        };
        let on_error = progress.error_handler(&listeners, source);
        listeners.attach(remote.subscribe_child(source, event, on_event, on_error));
    }

    let completion = Listeners::new();
    let on_loaded: SnapshotFn = {
        let reconciler = Arc::clone(&reconciler);
        let listeners = listeners.clone();
        let completion = completion.clone();
        let progress = progress.clone();
        Arc::new(move |_: Snapshot| {
            if completion.is_cancelled() {
                return;
            }
            completion.cancel();
            let list = reconciler.complete();
            if progress.resolve(list) && once {
                listeners.cancel();
            }
        })
    };
    let on_error = progress.error_handler(&completion, source);
    completion.attach(remote.subscribe_value(source, on_loaded, on_error));
    debug!(source = %source, wait, once, "list bound");

    Unbind::attached(
        vec![listeners, completion],
        target,
        options.ops(),
        Shape::List,
        source,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResetPolicy;
    use crate::error::BindError;
    use crate::ops::DefaultOperations;
    use crate::serialize::RecordSerializer;
    use livebind_source::{MemorySource, SourceError};
    use proptest::prelude::*;

    fn ids(value: &Value) -> Vec<String> {
        value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.id().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn bind(remote: &MemorySource, options: &BindOptions) -> (ReactiveCell<Value>, Progress, Unbind) {
        let target = ReactiveCell::new(Value::Array(Vec::new()));
        let progress = Progress::new();
        let source = SourceRef::keyed_list("/items");
        let unbind = bind_as_list(remote, Some(&source), &target, &progress, options);
        (target, progress, unbind)
    }

    #[test]
    fn insertion_after_key() {
        let items: Vec<Value> = ["a", "b"]
            .into_iter()
            .map(|k| Value::Record(livebind_types::Record::with_id(k, Default::default())))
            .collect();
        assert_eq!(insertion_index(&items, None), 0);
        assert_eq!(insertion_index(&items, Some("a")), 1);
        assert_eq!(insertion_index(&items, Some("b")), 2);
        assert_eq!(insertion_index(&items, Some("zz")), 0);
    }

    #[test]
    fn added_after_same_key_orders_newest_first() {
        let remote = MemorySource::new();
        let (target, _progress, _unbind) = bind(&remote, &BindOptions::new());
        remote.flush();
        remote.push("/items", "A", 1);
        remote.insert_after("/items", "B", 2, Some("A"));
        remote.insert_after("/items", "C", 3, Some("A"));
        remote.flush();
        assert_eq!(ids(&target.get()), vec!["A", "C", "B"]);
    }

    #[test]
    fn moved_item_lands_after_its_new_predecessor() {
        let remote = MemorySource::new();
        for key in ["X", "a", "b", "Y", "c"] {
            remote.push("/items", key, key);
        }
        let (target, _progress, _unbind) = bind(&remote, &BindOptions::new());
        remote.flush();
        let before = target.get();

        remote.move_after("/items", "X", Some("Y"));
        remote.flush();
        let after = target.get();
        assert_eq!(ids(&after), vec!["a", "b", "Y", "X", "c"]);
        let items = after.as_array().unwrap();
        assert_eq!(items.len(), 5);
        assert_eq!(items[3], before.as_array().unwrap()[0]);
    }

    #[test]
    fn changed_and_removed_keep_positions() {
        let remote = MemorySource::new();
        for key in ["a", "b", "c"] {
            remote.push("/items", key, 0);
        }
        let (target, _progress, _unbind) = bind(&remote, &BindOptions::new());
        remote.flush();

        remote.change("/items", "b", 7);
        remote.remove("/items", "a");
        remote.flush();
        let list = target.get();
        assert_eq!(ids(&list), vec!["b", "c"]);
        assert_eq!(list.as_array().unwrap()[0].get("$value"), Some(&Value::from(7)));
    }

    #[test]
    fn wait_publishes_once_on_completion() {
        let remote = MemorySource::new();
        for key in ["a", "b", "c"] {
            remote.push("/items", key, 1);
        }
        let target = ReactiveCell::new(Value::array(["seeded"]));
        let progress = Progress::new();
        let source = SourceRef::keyed_list("/items");
        let _unbind = bind_as_list(&remote, Some(&source), &target, &progress, &BindOptions::new());
        assert_eq!(target.get(), Value::array(["seeded"]));

        remote.flush();
        assert_eq!(ids(&target.get()), vec!["a", "b", "c"]);
        assert_eq!(target.version(), 1);
        assert_eq!(progress.promise().peek(), Some(Ok(target.get())));
    }

    #[test]
    fn without_wait_target_updates_incrementally() {
        let remote = MemorySource::new();
        for key in ["a", "b"] {
            remote.push("/items", key, 1);
        }
        let options = BindOptions::new().with_wait(false);
        let (target, progress, _unbind) = bind(&remote, &options);
        assert_eq!(target.get(), Value::Array(Vec::new()));
        remote.flush();
        // One clear, two inserts, then completion leaves the cell alone.
        assert_eq!(target.version(), 3);
        assert_eq!(ids(&target.get()), vec!["a", "b"]);
        assert!(progress.promise().is_settled());
    }

    #[test]
    fn completion_listener_fires_once() {
        let remote = MemorySource::new();
        let (_target, progress, _unbind) = bind(&remote, &BindOptions::new());
        remote.flush();
        // Four structural listeners remain; the completion listener is gone.
        assert_eq!(remote.listener_count(), 4);
        assert_eq!(progress.promise().peek(), Some(Ok(Value::Array(Vec::new()))));

        remote.push("/items", "a", 1);
        remote.flush();
        assert_eq!(progress.promise().peek(), Some(Ok(Value::Array(Vec::new()))));
    }

    #[test]
    fn stop_before_completion_removes_every_listener() {
        let remote = MemorySource::new();
        remote.push("/items", "a", 1);
        let (target, progress, unbind) = bind(&remote, &BindOptions::new());
        assert_eq!(remote.listener_count(), 5);
        unbind.stop(&ResetPolicy::Clear);
        assert_eq!(remote.listener_count(), 0);
        remote.flush();
        assert!(!progress.promise().is_settled());
        assert_eq!(target.get(), Value::Array(Vec::new()));
    }

    #[test]
    fn reset_policies_on_stop() {
        let cases = [
            (ResetPolicy::Clear, Value::Array(Vec::new())),
            (ResetPolicy::with(|| Value::array(["x"])), Value::array(["x"])),
        ];
        for (policy, expected) in cases {
            let remote = MemorySource::new();
            remote.push("/items", "a", 1);
            let (target, _progress, unbind) = bind(&remote, &BindOptions::new());
            remote.flush();
            unbind.stop(&policy);
            assert_eq!(target.get(), expected);
        }

        let remote = MemorySource::new();
        remote.push("/items", "a", 1);
        let (target, _progress, unbind) = bind(&remote, &BindOptions::new());
        remote.flush();
        unbind.stop(&ResetPolicy::Keep);
        assert_eq!(ids(&target.get()), vec!["a"]);
    }

    #[test]
    fn once_mode_stops_after_initial_load() {
        let remote = MemorySource::new();
        remote.push("/items", "a", 1);
        let options = BindOptions::new().with_once(true);
        let (target, _progress, _unbind) = bind(&remote, &options);
        remote.flush();
        assert_eq!(remote.listener_count(), 0);
        remote.push("/items", "b", 1);
        remote.flush();
        assert_eq!(ids(&target.get()), vec!["a"]);
    }

    #[test]
    fn errors_reach_promise_and_error_cell() {
        let remote = MemorySource::new();
        remote.deny("/items");
        let (_target, progress, _unbind) = bind(&remote, &BindOptions::new());
        remote.flush();
        assert!(matches!(
            progress.promise().peek(),
            Some(Err(BindError::Source(SourceError::PermissionDenied { .. })))
        ));
        // One error per listener.
        assert_eq!(progress.error().version(), 5);
    }

    #[test]
    fn events_for_untracked_keys_are_ignored() {
        let target = ReactiveCell::new(Value::Array(Vec::new()));
        let reconciler = Reconciler {
            source: SourceRef::keyed_list("/items"),
            target: target.clone(),
            serializer: Arc::new(RecordSerializer),
            ops: Arc::new(DefaultOperations),
            staging: Mutex::new(None),
        };
        let snap = |key: &str, value: i64| Snapshot::new(Some(key.to_string()), Value::from(value));
        reconciler.added(&snap("a", 1), None);
        reconciler.removed(&snap("zz", 0));
        reconciler.changed(&snap("zz", 2));
        reconciler.moved(&snap("zz", 0), Some("a"));
        let list = target.get();
        assert_eq!(ids(&list), vec!["a"]);
        assert_eq!(list.as_array().unwrap()[0].get("$value"), Some(&Value::from(1)));
    }

    #[derive(Clone, Debug)]
    enum Op {
        Push(u8),
        InsertAfter(u8, u8),
        Remove(u8),
        Move(u8, Option<u8>),
        Change(u8, i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..12).prop_map(Op::Push),
            (0u8..12, 0u8..12).prop_map(|(k, a)| Op::InsertAfter(k, a)),
            (0u8..12).prop_map(Op::Remove),
            (0u8..12, proptest::option::of(0u8..12)).prop_map(|(k, a)| Op::Move(k, a)),
            (0u8..12, any::<i64>()).prop_map(|(k, v)| Op::Change(k, v)),
        ]
    }

    proptest! {
        #[test]
        fn local_order_tracks_remote_order(ops in prop::collection::vec(op(), 0..40), wait in any::<bool>()) {
            let remote = MemorySource::new();
            let options = BindOptions::new().with_wait(wait);
            let (target, _progress, _unbind) = bind(&remote, &options);
            remote.flush();
            for op in ops {
                let keys = remote.keys("/items");
                let has = |k: &str| keys.iter().any(|key| key == k);
                match op {
                    Op::Push(k) => {
                        let k = k.to_string();
                        if !has(&k) {
                            remote.push("/items", &k, 0);
                        }
                    }
                    Op::InsertAfter(k, a) => {
                        let (k, a) = (k.to_string(), a.to_string());
                        if !has(&k) && has(&a) {
                            remote.insert_after("/items", &k, 0, Some(&a));
                        }
                    }
                    Op::Remove(k) => {
                        let k = k.to_string();
                        if has(&k) {
                            remote.remove("/items", &k);
                        }
                    }
                    Op::Move(k, a) => {
                        let k = k.to_string();
                        let a = a.map(|a| a.to_string());
                        let valid_after = a.as_deref().map_or(true, |a| has(a) && a != k);
                        if has(&k) && valid_after {
                            remote.move_after("/items", &k, a.as_deref());
                        }
                    }
                    Op::Change(k, v) => {
                        let k = k.to_string();
                        if has(&k) {
                            remote.change("/items", &k, v);
                        }
                    }
                }
                remote.flush();
            }
            prop_assert_eq!(ids(&target.get()), remote.keys("/items"));
        }
    }
}
