//! Per-app initial-state registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use tracing::{debug, trace, warn};

use livebind_reactive::OneShot;
use livebind_types::{AppId, Partition, SourceRef, Value};

use crate::error::{SsrError, SsrResult};
use crate::state::SsrState;

/// Registry of initial state, one [`SsrState`] per app.
///
/// State is created explicitly with [`init`](Self::init) on the server or
/// [`seed`](Self::seed) on the client, and dropped with
/// [`teardown`](Self::teardown) when the app goes away.
#[derive(Default)]
pub struct InitialStateRegistry {
    states: RwLock<HashMap<AppId, Arc<RwLock<SsrState>>>>,
}

impl InitialStateRegistry {
    /// An empty registry, independent of the global one.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static InitialStateRegistry {
        static GLOBAL: OnceLock<InitialStateRegistry> = OnceLock::new();
        GLOBAL.get_or_init(InitialStateRegistry::new)
    }

    /// Return the state for `app`, creating an empty one if needed.
    pub fn init(&self, app: &AppId) -> InitialState {
        let mut states = self.states.write().expect("lock poisoned");
        let state = states.entry(app.clone()).or_insert_with(|| {
            debug!(app = %app.short_id(), "initial state created");
            Arc::new(RwLock::new(SsrState::new()))
        });
        InitialState {
            app: app.clone(),
            state: Arc::clone(state),
        }
    }

    /// Install transferred state for `app`, replacing anything already there.
    pub fn seed(&self, app: &AppId, state: SsrState) -> InitialState {
        let entries = state.len();
        let mut states = self.states.write().expect("lock poisoned");
        let slot = states
            .entry(app.clone())
            .or_insert_with(|| Arc::new(RwLock::new(SsrState::new())));
        {
            let mut current = slot.write().expect("lock poisoned");
            if !current.is_empty() {
                warn!(app = %app.short_id(), "seeding over existing initial state");
            }
            *current = state;
        }
        debug!(app = %app.short_id(), entries, "initial state seeded");
        InitialState {
            app: app.clone(),
            state: Arc::clone(slot),
        }
    }

    /// The state for `app`, if it was initialized.
    pub fn state(&self, app: &AppId) -> SsrResult<InitialState> {
        let states = self.states.read().expect("lock poisoned");
        states
            .get(app)
            .map(|state| InitialState {
                app: app.clone(),
                state: Arc::clone(state),
            })
            .ok_or_else(|| SsrError::NotInitialized(app.clone()))
    }

    /// Drop the state for `app` and return what it held.
    ///
    /// Handles obtained earlier keep working on the detached state.
    pub fn teardown(&self, app: &AppId) -> Option<SsrState> {
        let removed = self.states.write().expect("lock poisoned").remove(app)?;
        debug!(app = %app.short_id(), "initial state torn down");
        let state = removed.read().expect("lock poisoned").clone();
        Some(state)
    }

    /// `true` if `app` has state.
    pub fn contains(&self, app: &AppId) -> bool {
        self.states.read().expect("lock poisoned").contains_key(app)
    }

    /// Number of registered apps.
    pub fn len(&self) -> usize {
        self.states.read().expect("lock poisoned").len()
    }

    /// `true` when no app is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for InitialStateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitialStateRegistry")
            .field("apps", &self.len())
            .finish()
    }
}

/// Handle to one app's initial state.
#[derive(Clone)]
pub struct InitialState {
    app: AppId,
    state: Arc<RwLock<SsrState>>,
}

impl InitialState {
    /// A handle not attached to any registry.
    pub fn detached(app: AppId) -> Self {
        Self {
            app,
            state: Arc::new(RwLock::new(SsrState::new())),
        }
    }

    /// The app this state belongs to.
    pub fn app(&self) -> &AppId {
        &self.app
    }

    /// The initial value for a binding.
    ///
    /// The key is `ssr_key` if given and non-empty, otherwise the source's
    /// logical key. Without a key, or when nothing was captured under it,
    /// `fallback` is returned.
    pub fn get(&self, source: Option<&SourceRef>, ssr_key: Option<&str>, fallback: Value) -> Value {
        let Some(source) = source else {
            return fallback;
        };
        let Some(key) = resolve_key(source, ssr_key) else {
            return fallback;
        };
        let state = self.state.read().expect("lock poisoned");
        match state.get(source.partition(), key) {
            Some(value) => {
                trace!(source = %source, key, "initial value replayed");
                value.clone()
            }
            None => fallback,
        }
    }

    /// Record the value `promise` resolves with as the initial value for
    /// `source`. Rejections record nothing.
    ///
    /// Returns the key the value will be stored under, or `None` when there
    /// is no usable key; the promise is then ignored.
    pub fn defer<E>(
        &self,
        source: &SourceRef,
        ssr_key: Option<&str>,
        promise: &OneShot<Value, E>,
    ) -> Option<String>
    where
        E: Clone + Send + Sync + 'static,
    {
        let key = resolve_key(source, ssr_key)?.to_string();
        let partition = source.partition();
        let state = Arc::clone(&self.state);
        let stored_key = key.clone();
        promise.on_settle(move |result| {
            if let Ok(value) = result {
                trace!(key = %stored_key, "initial value captured");
                state
                    .write()
                    .expect("lock poisoned")
                    .insert(partition, stored_key, value.clone());
            }
        });
        Some(key)
    }

    /// Store a value directly, e.g. the authenticated user.
    pub fn insert(&self, partition: Partition, key: impl Into<String>, value: impl Into<Value>) {
        self.state
            .write()
            .expect("lock poisoned")
            .insert(partition, key, value);
    }

    /// A copy of everything captured so far.
    pub fn snapshot(&self) -> SsrState {
        self.state.read().expect("lock poisoned").clone()
    }

    /// Serialize the captured state for transfer.
    pub fn to_json(&self) -> SsrResult<String> {
        self.state.read().expect("lock poisoned").to_json()
    }

    /// `true` if both handles share the same state.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for InitialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitialState")
            .field("app", &self.app)
            .field("entries", &self.state.read().expect("lock poisoned").len())
            .finish()
    }
}

fn resolve_key<'a>(source: &'a SourceRef, ssr_key: Option<&'a str>) -> Option<&'a str> {
    ssr_key
        .filter(|k| !k.is_empty())
        .or_else(|| source.logical_key())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn init_is_idempotent() {
        let registry = InitialStateRegistry::new();
        let app = AppId::ephemeral();
        let a = registry.init(&app);
        let b = registry.init(&app);
        assert!(a.ptr_eq(&b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn seeded_value_is_replayed() {
        let registry = InitialStateRegistry::new();
        let app = AppId::ephemeral();
        let seed = SsrState::from_plain_json(json!({ "r": { "/a/b": 42 } })).unwrap();
        let state = registry.seed(&app, seed);
        let source = SourceRef::keyed_value("/a/b");
        assert_eq!(state.get(Some(&source), None, Value::Null), Value::Integer(42));
    }

    #[test]
    fn partitions_are_separate() {
        let state = InitialState::detached(AppId::ephemeral());
        state.insert(Partition::Keyed, "/a", 1);
        let doc = SourceRef::document("/a");
        assert_eq!(state.get(Some(&doc), None, Value::from("x")), Value::from("x"));
    }

    #[test]
    fn explicit_key_overrides_path() {
        let state = InitialState::detached(AppId::ephemeral());
        state.insert(Partition::Keyed, "custom", "v");
        let source = SourceRef::keyed_value("/a");
        assert_eq!(state.get(Some(&source), Some("custom"), Value::Null), Value::from("v"));
        assert_eq!(state.get(Some(&source), Some(""), Value::Null), Value::Null);
    }

    #[test]
    fn missing_source_or_key_gives_fallback() {
        let state = InitialState::detached(AppId::ephemeral());
        assert_eq!(state.get(None, Some("k"), Value::from(7)), Value::from(7));
        let anonymous = SourceRef::collection("");
        assert_eq!(state.get(Some(&anonymous), None, Value::from(7)), Value::from(7));
    }

    #[test]
    fn defer_captures_resolved_value() {
        let state = InitialState::detached(AppId::ephemeral());
        let source = SourceRef::keyed_list("/items");
        let promise: OneShot<Value, String> = OneShot::new();
        let key = state.defer(&source, None, &promise);
        assert_eq!(key.as_deref(), Some("/items"));
        assert!(state.snapshot().is_empty());
        promise.resolve(Value::array([1, 2]));
        assert_eq!(
            state.snapshot().get(Partition::Keyed, "/items"),
            Some(&Value::array([1, 2]))
        );
    }

    #[test]
    fn defer_ignores_rejection_and_keyless_sources() {
        let state = InitialState::detached(AppId::ephemeral());
        let promise: OneShot<Value, String> = OneShot::new();
        assert_eq!(state.defer(&SourceRef::collection(""), None, &promise), None);
        let key = state.defer(&SourceRef::document("/d"), None, &promise);
        assert!(key.is_some());
        promise.reject("nope".into());
        assert!(state.snapshot().is_empty());
    }

    #[test]
    fn defer_on_settled_promise_writes_immediately() {
        let state = InitialState::detached(AppId::ephemeral());
        let promise: OneShot<Value, String> = OneShot::resolved(Value::from(true));
        state.defer(&SourceRef::blob("/logo.png"), Some("logo"), &promise);
        assert_eq!(
            state.snapshot().get(Partition::Blob, "logo"),
            Some(&Value::Bool(true))
        );
    }

    #[test]
    fn server_capture_round_trips_to_client() {
        let server = InitialStateRegistry::new();
        let client = InitialStateRegistry::new();
        let app = AppId::derive("web", "demo");
        let source = SourceRef::keyed_value("/a/b");

        let captured = server.init(&app);
        let promise: OneShot<Value, String> = OneShot::new();
        captured.defer(&source, None, &promise);
        promise.resolve(Value::from(42));
        let payload = captured.to_json().unwrap();

        let seeded = client.seed(&app, SsrState::from_json(&payload).unwrap());
        assert_eq!(seeded.get(Some(&source), None, Value::Null), Value::from(42));
    }

    #[test]
    fn teardown_removes_state() {
        let registry = InitialStateRegistry::new();
        let app = AppId::ephemeral();
        registry.init(&app).insert(Partition::Auth, "user", "ada");
        let removed = registry.teardown(&app).unwrap();
        assert_eq!(removed.len(), 1);
        assert!(!registry.contains(&app));
        assert!(matches!(registry.state(&app), Err(SsrError::NotInitialized(_))));
        assert!(registry.teardown(&app).is_none());
    }

    #[test]
    fn global_registry_is_shared() {
        let app = AppId::ephemeral();
        InitialStateRegistry::global().init(&app);
        assert!(InitialStateRegistry::global().contains(&app));
        InitialStateRegistry::global().teardown(&app);
    }
}
