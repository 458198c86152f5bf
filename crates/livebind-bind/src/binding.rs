//! The binding facade: one call to keep a cell in sync with a source for the
//! lifetime of a scope.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use livebind_reactive::{CleanupId, Holder, Observer, OneShot, ReactiveCell, Scope, WeakScope};
use livebind_source::RemoteSource;
use livebind_ssr::{InitialState, InitialStateRegistry, PendingGuard, PendingPromises, SsrState};
use livebind_types::{AppId, BindingId, SourceRef, Value};

use crate::config::{BindOptions, ResetPolicy};
use crate::control::{Progress, Shape, Unbind};
use crate::error::{BindError, BindResult};
use crate::list::bind_as_list;
use crate::object::bind_as_object;
use crate::serialize::{RecordSerializer, Serializer};

/// The source of a binding: fixed, or a cell whose changes rebind.
#[derive(Clone, Debug)]
pub enum SourceInput {
    Static(Option<SourceRef>),
    Reactive(ReactiveCell<Option<SourceRef>>),
}

impl SourceInput {
    /// The source to bind right now.
    pub fn current(&self) -> Option<SourceRef> {
        match self {
            Self::Static(source) => source.clone(),
            Self::Reactive(cell) => cell.get(),
        }
    }
}

impl From<SourceRef> for SourceInput {
    fn from(source: SourceRef) -> Self {
        Self::Static(Some(source))
    }
}

impl From<Option<SourceRef>> for SourceInput {
    fn from(source: Option<SourceRef>) -> Self {
        Self::Static(source)
    }
}

impl From<ReactiveCell<Option<SourceRef>>> for SourceInput {
    fn from(cell: ReactiveCell<Option<SourceRef>>) -> Self {
        Self::Reactive(cell)
    }
}

impl From<&ReactiveCell<Option<SourceRef>>> for SourceInput {
    fn from(cell: &ReactiveCell<Option<SourceRef>>) -> Self {
        Self::Reactive(cell.clone())
    }
}

struct Shared {
    id: BindingId,
    shape: Shape,
    remote: Arc<dyn RemoteSource>,
    options: BindOptions,
    data: ReactiveCell<Value>,
    error: ReactiveCell<Option<BindError>>,
    pending: ReactiveCell<bool>,
    promise: Mutex<OneShot<Value, BindError>>,
    source: Mutex<Option<SourceRef>>,
    unbind: Mutex<Unbind>,
    watcher: Mutex<Option<Observer>>,
    pending_guard: Mutex<Option<PendingGuard<BindError>>>,
    cleanup: Mutex<Option<(WeakScope, CleanupId)>>,
    stopped: AtomicBool,
}

impl Shared {
    fn new(
        shape: Shape,
        remote: Arc<dyn RemoteSource>,
        options: BindOptions,
        data: &ReactiveCell<Value>,
    ) -> Self {
        Self {
            id: BindingId::new(),
            shape,
            remote,
            options,
            data: data.clone(),
            error: ReactiveCell::new(None),
            pending: ReactiveCell::new(true),
            promise: Mutex::new(OneShot::new()),
            source: Mutex::new(None),
            unbind: Mutex::new(Unbind::noop()),
            watcher: Mutex::new(None),
            pending_guard: Mutex::new(None),
            cleanup: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Start a controller for `source` and return its promise.
    fn bind_source(&self, source: Option<SourceRef>) -> OneShot<Value, BindError> {
        let progress = Progress::with_error_cell(self.error.clone());
        self.pending.set_if_changed(true);
        let pending = self.pending.clone();
        progress.promise().on_settle(move |_| {
            pending.set_if_changed(false);
        });
        *self.promise.lock().expect("lock poisoned") = progress.promise().clone();
        *self.source.lock().expect("lock poisoned") = source.clone();

        let remote = self.remote.as_ref();
        let unbind = match self.shape {
            Shape::Object => {
                bind_as_object(remote, source.as_ref(), &self.data, &progress, &self.options)
            }
            Shape::List => {
                bind_as_list(remote, source.as_ref(), &self.data, &progress, &self.options)
            }
        };
        *self.unbind.lock().expect("lock poisoned") = unbind;
        // A callback delivered during subscribe may already have stopped us.
        if self.is_stopped() {
            self.take_unbind().stop(&self.options.reset_policy());
        }
        progress.promise().clone()
    }

    fn rebind(&self, source: Option<SourceRef>) {
        if self.is_stopped() {
            return;
        }
        if *self.source.lock().expect("lock poisoned") == source {
            return;
        }
        self.take_unbind().stop(&self.options.reset_policy());
        debug!(binding = %self.id, source = ?source, "rebinding");
        self.bind_source(source);
    }

    fn take_unbind(&self) -> Unbind {
        std::mem::replace(&mut *self.unbind.lock().expect("lock poisoned"), Unbind::noop())
    }

    fn stop(&self, reset: &ResetPolicy) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let watcher = self.watcher.lock().expect("lock poisoned").take();
        if let Some(mut watcher) = watcher {
            watcher.stop();
        }
        let guard = self.pending_guard.lock().expect("lock poisoned").take();
        if let Some(guard) = guard {
            guard.remove();
        }
        let cleanup = self.cleanup.lock().expect("lock poisoned").take();
        if let Some((scope, id)) = cleanup {
            if let Some(scope) = scope.upgrade() {
                scope.forget(id);
            }
        }
        self.data.release(self);
        self.take_unbind().stop(reset);
        debug!(binding = %self.id, shape = %self.shape, "binding stopped");
    }
}

/// A live association between a source and a target cell.
///
/// Handles are cheap to clone; all clones control the same binding.
#[derive(Clone)]
pub struct Binding {
    shared: Arc<Shared>,
}

impl Binding {
    /// Identifier used in log fields.
    pub fn id(&self) -> BindingId {
        self.shared.id
    }

    /// Whether the target is bound as a value or a list.
    pub fn shape(&self) -> Shape {
        self.shared.shape
    }

    /// The bound target.
    pub fn data(&self) -> &ReactiveCell<Value> {
        &self.shared.data
    }

    /// The most recent subscription error.
    pub fn error(&self) -> &ReactiveCell<Option<BindError>> {
        &self.shared.error
    }

    /// `true` until the current promise settles.
    pub fn pending(&self) -> &ReactiveCell<bool> {
        &self.shared.pending
    }

    /// The promise of the current source. A rebind replaces it.
    pub fn promise(&self) -> OneShot<Value, BindError> {
        self.shared.promise.lock().expect("lock poisoned").clone()
    }

    /// Wait for the current promise.
    pub async fn wait(&self) -> BindResult<Value> {
        self.promise().wait().await
    }

    /// The source currently bound.
    pub fn source(&self) -> Option<SourceRef> {
        self.shared.source.lock().expect("lock poisoned").clone()
    }

    /// `false` once stopped, directly or by scope disposal.
    pub fn is_active(&self) -> bool {
        !self.shared.is_stopped()
    }

    /// Stop with the reset policy the binding was created with.
    pub fn stop(&self) {
        self.stop_with(&self.shared.options.reset_policy());
    }

    /// Stop, applying `reset` to the target. Later calls do nothing.
    pub fn stop_with(&self, reset: &ResetPolicy) {
        self.shared.stop(reset);
    }

    /// A binding that never subscribes, for targets that cannot be bound.
    fn inert(shape: Shape, remote: Arc<dyn RemoteSource>, target: &ReactiveCell<Value>) -> Self {
        let shared = Shared::new(shape, remote, BindOptions::new(), target);
        shared.stopped.store(true, Ordering::Release);
        shared.pending.set(false);
        *shared.promise.lock().expect("lock poisoned") = OneShot::resolved(target.get());
        Self {
            shared: Arc::new(shared),
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("id", &self.shared.id)
            .field("shape", &self.shared.shape)
            .field("source", &self.source())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Creates bindings for one app within one scope.
///
/// The binder reads initial values from the app's [`InitialState`]. In a
/// server-render scope every binding fetches once, and its first value is
/// captured into the initial state and tracked until
/// [`capture`](Self::capture) has waited for it.
#[derive(Clone)]
pub struct Binder {
    remote: Arc<dyn RemoteSource>,
    state: InitialState,
    pending: PendingPromises<BindError>,
    scope: Scope,
}

impl Binder {
    /// A binder reading initial values from `state`, binding within `scope`.
    pub fn new(remote: Arc<dyn RemoteSource>, state: InitialState, scope: Scope) -> Self {
        Self {
            remote,
            state,
            pending: PendingPromises::new(),
            scope,
        }
    }

    /// A binder for an app whose initial state is already registered.
    pub fn from_registry(
        remote: Arc<dyn RemoteSource>,
        registry: &InitialStateRegistry,
        app: &AppId,
        scope: Scope,
    ) -> BindResult<Self> {
        let state = registry.state(app)?;
        Ok(Self::new(remote, state, scope))
    }

    /// The scope every binding of this binder is tied to.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Where initial values are replayed from and captured into.
    pub fn initial_state(&self) -> &InitialState {
        &self.state
    }

    /// First fetches a server render still waits for.
    pub fn pending(&self) -> &PendingPromises<BindError> {
        &self.pending
    }

    /// Bind `target` as a single value.
    pub fn bind_object(
        &self,
        target: &ReactiveCell<Value>,
        source: impl Into<SourceInput>,
        options: BindOptions,
    ) -> Binding {
        self.bind_shape(Shape::Object, target, source.into(), options)
    }

    /// Bind `target` as an ordered list.
    pub fn bind_list(
        &self,
        target: &ReactiveCell<Value>,
        source: impl Into<SourceInput>,
        options: BindOptions,
    ) -> Binding {
        self.bind_shape(Shape::List, target, source.into(), options)
    }

    /// Bind `target` as a list if it currently holds an array, otherwise as
    /// a single value.
    pub fn bind(
        &self,
        target: &ReactiveCell<Value>,
        source: impl Into<SourceInput>,
        options: BindOptions,
    ) -> Binding {
        let shape = target.with(Shape::of);
        self.bind_shape(shape, target, source.into(), options)
    }

    /// Bind a new cell holding `Null` as a single value.
    pub fn object(&self, source: impl Into<SourceInput>, options: BindOptions) -> Binding {
        self.bind_object(&ReactiveCell::new(Value::Null), source, options)
    }

    /// Bind a new cell holding `[]` as an ordered list.
    pub fn list(&self, source: impl Into<SourceInput>, options: BindOptions) -> Binding {
        self.bind_list(&ReactiveCell::new(Value::Array(Vec::new())), source, options)
    }

    /// Stop the binding attached to `target`, if any, whichever binder
    /// created it. `None` applies the binding's own reset policy.
    pub fn unbind(&self, target: &ReactiveCell<Value>, reset: Option<ResetPolicy>) -> bool {
        let Some(shared) = take_active(target) else {
            return false;
        };
        let reset = reset.unwrap_or_else(|| shared.options.reset_policy());
        shared.stop(&reset);
        true
    }

    /// Read the current value at `source` once, without binding.
    pub fn fetch_once(&self, source: &SourceRef) -> BindResult<Value> {
        let snapshot = self.remote.get(source)?;
        Ok(RecordSerializer.serialize(&snapshot))
    }

    /// Wait for every pending first fetch, then return the captured state.
    pub async fn capture(&self) -> SsrState {
        let settled = self.pending.wait_all().await;
        debug!(settled = settled.len(), "initial state captured");
        self.state.snapshot()
    }

    fn bind_shape(
        &self,
        shape: Shape,
        target: &ReactiveCell<Value>,
        source: SourceInput,
        mut options: BindOptions,
    ) -> Binding {
        if let Err(owner) = target.claim(shape.tag()) {
            if cfg!(debug_assertions) {
                warn!(requested = %shape, owner, "target already bound with another shape; bind ignored");
            }
            return Binding::inert(shape, Arc::clone(&self.remote), target);
        }
        if let Some(previous) = take_active(target) {
            previous.stop(&ResetPolicy::Keep);
        }
        let server_render = self.scope.is_server_render();
        if server_render {
            options.config_mut().once = true;
        }

        let initial_source = source.current();
        let fallback = match shape {
            Shape::List if target.with(|v| v.as_array().is_none()) => shape.empty(),
            _ => target.get(),
        };
        let initial = self
            .state
            .get(initial_source.as_ref(), options.ssr_key(), fallback);
        if target.with(|current| *current != initial) {
            options.ops().set(target, initial);
        }

        let shared = Arc::new(Shared::new(shape, Arc::clone(&self.remote), options, target));
        let first = shared.bind_source(initial_source.clone());

        if let SourceInput::Reactive(cell) = &source {
            let weak = Arc::downgrade(&shared);
            let observer = cell.observe(move |next: &Option<SourceRef>| {
                if let Some(shared) = weak.upgrade() {
                    shared.rebind(next.clone());
                }
            });
            *shared.watcher.lock().expect("lock poisoned") = Some(observer);
        }

        if server_render {
            if let Some(source) = &initial_source {
                let guard = self
                    .pending
                    .add(&self.state, source, shared.options.ssr_key(), &first);
                *shared.pending_guard.lock().expect("lock poisoned") = guard;
            }
        }

        let holder: Holder = shared.clone();
        target.hold(Arc::downgrade(&holder));
        drop(holder);
        debug!(
            binding = %shared.id,
            shape = %shape,
            source = ?initial_source,
            server_render,
            "bound"
        );

        // Owned by the scope until stopped; `Shared::stop` withdraws the cleanup.
        let owned = Arc::clone(&shared);
        let id = self
            .scope
            .on_dispose(move || owned.stop(&owned.options.reset_policy()));
        if !shared.is_stopped() {
            *shared.cleanup.lock().expect("lock poisoned") = Some((self.scope.downgrade(), id));
        }
        Binding { shared }
    }
}

/// The live binding currently driving `target`, taken out of its slot.
fn take_active(target: &ReactiveCell<Value>) -> Option<Arc<Shared>> {
    target
        .take_holder()?
        .downcast::<Shared>()
        .ok()
        .filter(|shared| !shared.is_stopped())
}

impl fmt::Debug for Binder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binder")
            .field("app", self.state.app())
            .field("scope", &self.scope)
            .field("pending", &self.pending.len())
            .finish()
    }
}
