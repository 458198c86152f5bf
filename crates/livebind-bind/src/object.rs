//! Binding a single value source to a cell.

use std::sync::Arc;

use tracing::debug;

use livebind_reactive::ReactiveCell;
use livebind_source::{RemoteSource, SnapshotFn};
use livebind_types::{Snapshot, SourceRef, Value};

use crate::config::BindOptions;
use crate::control::{Listeners, Progress, Shape, Unbind};

/// Keep `target` equal to the serialized value at `source`.
///
/// Every snapshot is written into the target. The first one resolves
/// `progress`; with `once` set the subscription then ends. An absent
/// `source` resolves to `Null` and returns an unbind that does nothing.
pub fn bind_as_object(
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
    let listeners = Listeners::new();
    let once = options.config().once;

    let on_snapshot: SnapshotFn = {
        let listeners = listeners.clone();
        let target = target.clone();
        let serializer = Arc::clone(options.serializer());
        let ops = Arc::clone(options.ops());
        let progress = progress.clone();
        Arc::new(move |snapshot: Snapshot| {
            if listeners.is_cancelled() {
                return;
            }
            let value = serializer.serialize(&snapshot);
            ops.set(&target, value.clone());
            if progress.resolve(value) && once {
                listeners.cancel();
            }
        })
    };
    let on_error = progress.error_handler(&listeners, source);
    listeners.attach(remote.subscribe_value(source, on_snapshot, on_error));
    debug!(source = %source, once, "object bound");

    Unbind::attached(vec![listeners], target, options.ops(), Shape::Object, source)
}
