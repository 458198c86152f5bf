//! Observable mutable cells.
//!
//! A [`ReactiveCell`] is a shared handle: cloning it yields another handle
//! to the same cell, so identity is preserved while the value inside is
//! replaced or mutated in place.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

type ObserverFn<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Type-erased controller currently driving a cell.
pub type Holder = Arc<dyn Any + Send + Sync>;

/// Stable identity of a cell, independent of its value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(usize);

struct CellInner<T> {
    value: RwLock<T>,
    version: AtomicU64,
    next_observer: AtomicU64,
    observers: Mutex<Vec<(u64, ObserverFn<T>)>>,
    owner: Mutex<Option<&'static str>>,
    holder: Mutex<Option<Weak<dyn Any + Send + Sync>>>,
}

/// A mutable value that notifies observers whenever it is written.
pub struct ReactiveCell<T> {
    inner: Arc<CellInner<T>>,
}

impl<T> Clone for ReactiveCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ReactiveCell<T> {
    /// A new cell holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(CellInner {
                value: RwLock::new(value),
                version: AtomicU64::new(0),
                next_observer: AtomicU64::new(0),
                observers: Mutex::new(Vec::new()),
                owner: Mutex::new(None),
                holder: Mutex::new(None),
            }),
        }
    }

    /// Identity shared by every handle to this cell.
    pub fn id(&self) -> CellId {
        CellId(Arc::as_ptr(&self.inner) as *const () as usize)
    }

    /// `true` if both handles point at the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// A clone of the current value.
    pub fn get(&self) -> T {
        self.inner.value.read().expect("lock poisoned").clone()
    }

    /// Read the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.read().expect("lock poisoned"))
    }

    /// Number of writes since creation.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    /// Replace the value and notify observers.
    pub fn set(&self, value: T) {
        self.update(|slot| *slot = value);
    }

    /// Replace the value only if it differs. Returns `true` if it was written.
    pub fn set_if_changed(&self, value: T) -> bool
    where
        T: PartialEq,
    {
        if self.with(|current| *current == value) {
            return false;
        }
        self.set(value);
        true
    }

    /// Mutate the value in place and notify observers once.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let (result, snapshot) = {
            let mut slot = self.inner.value.write().expect("lock poisoned");
            let result = f(&mut slot);
            (result, slot.clone())
        };
        self.inner.version.fetch_add(1, Ordering::AcqRel);
        self.notify(&snapshot);
        result
    }

    /// Register a callback that runs after every write.
    ///
    /// The callback is not invoked for the current value. Drop or
    /// [`stop`](Observer::stop) the returned handle to stop observing.
    pub fn observe(&self, f: impl Fn(&T) + Send + Sync + 'static) -> Observer {
        let id = self.inner.next_observer.fetch_add(1, Ordering::Relaxed);
        self.inner
            .observers
            .lock()
            .expect("lock poisoned")
            .push((id, Arc::new(f)));
        let weak = Arc::downgrade(&self.inner);
        Observer {
            detach: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner
                        .observers
                        .lock()
                        .expect("lock poisoned")
                        .retain(|(oid, _)| *oid != id);
                }
            })),
        }
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.lock().expect("lock poisoned").len()
    }

    /// Claim the cell for a kind of owner.
    ///
    /// The first claim sticks. Later claims with the same tag succeed; a
    /// claim with a different tag fails and returns the existing tag.
    pub fn claim(&self, tag: &'static str) -> Result<(), &'static str> {
        let mut owner = self.inner.owner.lock().expect("lock poisoned");
        match *owner {
            Some(existing) if existing != tag => Err(existing),
            Some(_) => Ok(()),
            None => {
                *owner = Some(tag);
                Ok(())
            }
        }
    }

    /// The tag of the current claim, if any.
    pub fn owner(&self) -> Option<&'static str> {
        *self.inner.owner.lock().expect("lock poisoned")
    }

    /// Record `holder` as the controller driving this cell.
    ///
    /// Only a weak reference is kept; a dropped holder frees the slot.
    pub fn hold(&self, holder: Weak<dyn Any + Send + Sync>) {
        *self.inner.holder.lock().expect("lock poisoned") = Some(holder);
    }

    /// Take the current controller out of the slot, if it is still alive.
    pub fn take_holder(&self) -> Option<Holder> {
        self.inner
            .holder
            .lock()
            .expect("lock poisoned")
            .take()
            .and_then(|weak| weak.upgrade())
    }

    /// Clear the slot if it still refers to `holder` or to a dropped one.
    pub fn release(&self, holder: &(dyn Any + Send + Sync)) {
        let mut slot = self.inner.holder.lock().expect("lock poisoned");
        let stale = match slot.as_ref().and_then(Weak::upgrade) {
            Some(current) => std::ptr::addr_eq(Arc::as_ptr(&current), holder as *const (dyn Any + Send + Sync)),
            None => true,
        };
        if stale {
            *slot = None;
        }
    }

    /// `true` while a live controller holds the cell.
    pub fn is_held(&self) -> bool {
        self.inner
            .holder
            .lock()
            .expect("lock poisoned")
            .as_ref()
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    fn notify(&self, value: &T) {
        // Observers may write to this cell; never hold the list lock while calling them.
        let observers: Vec<ObserverFn<T>> = self
            .inner
            .observers
            .lock()
            .expect("lock poisoned")
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect();
        for observer in observers {
            observer(value);
        }
    }
}

impl<T: Clone + Default + Send + Sync + 'static> Default for ReactiveCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for ReactiveCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.value.try_read() {
            Ok(value) => f
                .debug_struct("ReactiveCell")
                .field("value", &*value)
                .field("version", &self.inner.version.load(Ordering::Relaxed))
                .finish(),
            Err(_) => f.write_str("ReactiveCell(<locked>)"),
        }
    }
}

/// Handle to an observer registration. Dropping it stops observation.
pub struct Observer {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Observer {
    /// Stop observing. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("active", &self.detach.is_some())
            .finish()
    }
}
