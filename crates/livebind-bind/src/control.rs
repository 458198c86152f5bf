//! State shared by the object and collection controllers.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use livebind_reactive::{OneShot, ReactiveCell};
use livebind_source::{ErrorFn, SourceError, Subscription};
use livebind_types::{SourceRef, Value};

use crate::config::ResetPolicy;
use crate::error::BindError;
use crate::ops::Operations;

/// The shape of a bound target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Shape {
    /// A single value or document.
    Object,
    /// An ordered list of items.
    List,
}

impl Shape {
    /// `List` for arrays, `Object` for everything else.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Array(_) => Self::List,
            _ => Self::Object,
        }
    }

    /// The tag the target cell is claimed with.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::List => "list",
        }
    }

    /// What `ResetPolicy::Clear` writes.
    pub fn empty(&self) -> Value {
        match self {
            Self::Object => Value::Null,
            Self::List => Value::Array(Vec::new()),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Where a controller reports its result.
#[derive(Clone)]
pub struct Progress {
    promise: OneShot<Value, BindError>,
    error: ReactiveCell<Option<BindError>>,
}

impl Progress {
    /// A progress with its own error cell.
    pub fn new() -> Self {
        Self::with_error_cell(ReactiveCell::new(None))
    }

    /// Report errors into an existing cell.
    pub fn with_error_cell(error: ReactiveCell<Option<BindError>>) -> Self {
        Self {
            promise: OneShot::new(),
            error,
        }
    }

    /// Settled with the first value, or the first error.
    pub fn promise(&self) -> &OneShot<Value, BindError> {
        &self.promise
    }

    /// The most recent error.
    pub fn error(&self) -> &ReactiveCell<Option<BindError>> {
        &self.error
    }

    /// Resolve the promise. Returns `false` if it was already settled.
    pub(crate) fn resolve(&self, value: Value) -> bool {
        self.promise.resolve(value)
    }

    /// Record `error` in the error cell and reject the promise if still unsettled.
    pub(crate) fn fail(&self, source: &SourceRef, error: SourceError) {
        let error = BindError::from(error);
        warn!(source = %source, %error, "subscription error");
        self.error.set(Some(error.clone()));
        self.promise.reject(error);
    }

    /// An error callback that reports into this progress until `listeners`
    /// is cancelled.
    pub(crate) fn error_handler(&self, listeners: &Listeners, source: &SourceRef) -> ErrorFn {
        let progress = self.clone();
        let listeners = listeners.clone();
        let source = source.clone();
        Arc::new(move |error: SourceError| {
            if !listeners.is_cancelled() {
                progress.fail(&source, error);
            }
        })
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("settled", &self.promise.is_settled())
            .finish()
    }
}

#[derive(Default)]
struct ListenerState {
    subscriptions: Vec<Subscription>,
    cancelled: bool,
}

/// A group of subscriptions that may be cancelled before all of them are
/// attached, including from inside one of their own callbacks.
#[derive(Clone, Default)]
pub(crate) struct Listeners {
    state: Arc<Mutex<ListenerState>>,
}

impl Listeners {
    /// An empty, uncancelled group.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Keep `subscription` until cancelled. Attaching after cancellation
    /// unsubscribes it at once.
    pub(crate) fn attach(&self, subscription: Subscription) {
        let mut state = self.state.lock().expect("lock poisoned");
        if state.cancelled {
            drop(state);
            subscription.unsubscribe();
            return;
        }
        state.subscriptions.push(subscription);
    }

    /// Unsubscribe everything attached so far and refuse later attachments.
    pub(crate) fn cancel(&self) {
        let subscriptions = {
            let mut state = self.state.lock().expect("lock poisoned");
            state.cancelled = true;
            std::mem::take(&mut state.subscriptions)
        };
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
    }

    /// `true` once [`cancel`](Self::cancel) has run.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.state.lock().expect("lock poisoned").cancelled
    }
}

struct Attached {
    listeners: Vec<Listeners>,
    target: ReactiveCell<Value>,
    ops: Arc<dyn Operations>,
    shape: Shape,
    source: SourceRef,
}

/// Stops a controller and resets its target.
///
/// Only the first [`stop`](Self::stop) has any effect.
pub struct Unbind {
    attached: Option<Attached>,
    stopped: AtomicBool,
}

impl Unbind {
    /// An unbind with nothing to cancel or reset.
    pub fn noop() -> Self {
        Self {
            attached: None,
            stopped: AtomicBool::new(false),
        }
    }

    /// An unbind for a controller subscribed through `listeners`.
    pub(crate) fn attached(
        listeners: Vec<Listeners>,
        target: &ReactiveCell<Value>,
        ops: &Arc<dyn Operations>,
        shape: Shape,
        source: &SourceRef,
    ) -> Self {
        Self {
            attached: Some(Attached {
                listeners,
                target: target.clone(),
                ops: Arc::clone(ops),
                shape,
                source: source.clone(),
            }),
            stopped: AtomicBool::new(false),
        }
    }

    /// Unsubscribe everything, then apply `reset` to the target.
    pub fn stop(&self, reset: &ResetPolicy) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(attached) = &self.attached else {
            return;
        };
        for listeners in &attached.listeners {
            listeners.cancel();
        }
        if let Some(value) = reset.value(|| attached.shape.empty()) {
            attached.ops.set(&attached.target, value);
        }
        debug!(source = %attached.source, shape = %attached.shape, ?reset, "unbound");
    }

    /// `true` once [`stop`](Self::stop) has run.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Unbind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unbind")
            .field("source", &self.attached.as_ref().map(|a| &a.source))
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
