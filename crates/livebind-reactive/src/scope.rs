//! Owning scopes with disposal callbacks.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::debug;

type Cleanup = Box<dyn FnOnce() + Send>;

/// Identifies a registered cleanup so it can be withdrawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CleanupId(u64);

struct ScopeInner {
    server_render: bool,
    disposed: AtomicBool,
    next_cleanup: AtomicU64,
    cleanups: Mutex<BTreeMap<u64, Cleanup>>,
}

/// The owner of a group of bindings.
///
/// Cleanups registered with [`on_dispose`](Scope::on_dispose) run in reverse
/// registration order when the scope is disposed. A scope also records
/// whether it executes during a server render, which switches bindings into
/// fetch-once mode.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    /// A client-side scope.
    pub fn new() -> Self {
        Self::build(false)
    }

    /// A scope executing during a server render.
    pub fn server() -> Self {
        Self::build(true)
    }

    fn build(server_render: bool) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                server_render,
                disposed: AtomicBool::new(false),
                next_cleanup: AtomicU64::new(0),
                cleanups: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// `true` for scopes created with [`Scope::server`].
    pub fn is_server_render(&self) -> bool {
        self.inner.server_render
    }

    /// `true` once [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Register a cleanup. If the scope is already disposed it runs now.
    pub fn on_dispose(&self, f: impl FnOnce() + Send + 'static) -> CleanupId {
        let id = self.inner.next_cleanup.fetch_add(1, Ordering::Relaxed);
        let mut cleanups = self.inner.cleanups.lock().expect("lock poisoned");
        if self.is_disposed() {
            drop(cleanups);
            f();
        } else {
            cleanups.insert(id, Box::new(f));
        }
        CleanupId(id)
    }

    /// Withdraw a cleanup without running it. Unknown ids are ignored.
    pub fn forget(&self, id: CleanupId) {
        let removed = self
            .inner
            .cleanups
            .lock()
            .expect("lock poisoned")
            .remove(&id.0);
        // Dropped outside the lock; the closure may own anything.
        drop(removed);
    }

    /// A handle that does not keep the scope alive.
    pub fn downgrade(&self) -> WeakScope {
        WeakScope {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Number of cleanups waiting for disposal.
    pub fn cleanup_count(&self) -> usize {
        self.inner.cleanups.lock().expect("lock poisoned").len()
    }

    /// Run all cleanups. Subsequent calls do nothing.
    pub fn dispose(&self) {
        let cleanups = {
            let mut cleanups = self.inner.cleanups.lock().expect("lock poisoned");
            if self.inner.disposed.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *cleanups)
        };
        debug!(count = cleanups.len(), "disposing scope");
        for cleanup in cleanups.into_values().rev() {
            cleanup();
        }
    }
}

/// A non-owning reference to a [`Scope`].
#[derive(Clone)]
pub struct WeakScope {
    inner: Weak<ScopeInner>,
}

impl WeakScope {
    /// The scope, if it still exists.
    pub fn upgrade(&self) -> Option<Scope> {
        self.inner.upgrade().map(|inner| Scope { inner })
    }
}

impl fmt::Debug for WeakScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakScope")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("server_render", &self.inner.server_render)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanups_run_in_reverse_once() {
        let scope = Scope::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = Arc::clone(&order);
            scope.on_dispose(move || order.lock().unwrap().push(i));
        }
        scope.dispose();
        scope.dispose();
        assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
        assert!(scope.is_disposed());
    }

    #[test]
    fn late_registration_runs_immediately() {
        let scope = Scope::new();
        scope.dispose();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        scope.on_dispose(move || flag.store(true, Ordering::SeqCst));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn forgotten_cleanup_never_runs() {
        let scope = Scope::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let id = scope.on_dispose(move || flag.store(true, Ordering::SeqCst));
        scope.on_dispose(|| {});
        assert_eq!(scope.cleanup_count(), 2);
        scope.forget(id);
        scope.forget(id);
        assert_eq!(scope.cleanup_count(), 1);
        scope.dispose();
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(scope.cleanup_count(), 0);
    }

    #[test]
    fn weak_scope_does_not_keep_it_alive() {
        let scope = Scope::server();
        let weak = scope.downgrade();
        assert!(weak.upgrade().is_some_and(|s| s.is_server_render()));
        drop(scope);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn server_flag() {
        assert!(Scope::server().is_server_render());
        assert!(!Scope::new().is_server_render());
    }
}
