//! The [`RemoteSource`] trait defining the subscription interface.

use std::fmt;
use std::sync::Arc;

use livebind_types::{Snapshot, SourceRef};

use crate::error::{SourceError, SourceResult};
use crate::subscription::Subscription;

/// Callback receiving value snapshots.
pub type SnapshotFn = Arc<dyn Fn(Snapshot) + Send + Sync>;

/// Callback receiving a child snapshot and the key of the sibling it now
/// follows (`None` when it is first).
pub type ChildFn = Arc<dyn Fn(Snapshot, Option<String>) + Send + Sync>;

/// Callback receiving subscription failures.
pub type ErrorFn = Arc<dyn Fn(SourceError) + Send + Sync>;

/// Structural events of an ordered collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChildEvent {
    Added,
    Changed,
    Removed,
    Moved,
}

impl ChildEvent {
    pub const ALL: [ChildEvent; 4] = [
        ChildEvent::Added,
        ChildEvent::Changed,
        ChildEvent::Removed,
        ChildEvent::Moved,
    ];
}

impl fmt::Display for ChildEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Added => "child_added",
            Self::Changed => "child_changed",
            Self::Removed => "child_removed",
            Self::Moved => "child_moved",
        };
        f.write_str(s)
    }
}

/// A remote data source that emits change notifications.
///
/// Implementations deliver callbacks one at a time, in the order the
/// remote produced them, and never concurrently for the same subscription.
/// A value subscription receives the current snapshot as its first event.
/// A `ChildEvent::Added` subscription first replays every existing child in
/// order. Errors are delivered through `on_error` and do not by themselves
/// end the subscription.
pub trait RemoteSource: Send + Sync {
    /// Subscribe to the whole value at `source`.
    fn subscribe_value(
        &self,
        source: &SourceRef,
        on_snapshot: SnapshotFn,
        on_error: ErrorFn,
    ) -> Subscription;

    /// Subscribe to one kind of structural event on the children of `source`.
    fn subscribe_child(
        &self,
        source: &SourceRef,
        event: ChildEvent,
        on_event: ChildFn,
        on_error: ErrorFn,
    ) -> Subscription;

    /// Read the current value once.
    fn get(&self, source: &SourceRef) -> SourceResult<Snapshot>;

    fn subscribe_child_added(
        &self,
        source: &SourceRef,
        on_event: ChildFn,
        on_error: ErrorFn,
    ) -> Subscription {
        self.subscribe_child(source, ChildEvent::Added, on_event, on_error)
    }

    fn subscribe_child_changed(
        &self,
        source: &SourceRef,
        on_event: ChildFn,
        on_error: ErrorFn,
    ) -> Subscription {
        self.subscribe_child(source, ChildEvent::Changed, on_event, on_error)
    }

    fn subscribe_child_removed(
        &self,
        source: &SourceRef,
        on_event: ChildFn,
        on_error: ErrorFn,
    ) -> Subscription {
        self.subscribe_child(source, ChildEvent::Removed, on_event, on_error)
    }

    fn subscribe_child_moved(
        &self,
        source: &SourceRef,
        on_event: ChildFn,
        on_error: ErrorFn,
    ) -> Subscription {
        self.subscribe_child(source, ChildEvent::Moved, on_event, on_error)
    }
}
