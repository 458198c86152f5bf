//! Write-once result cells.
//!
//! A [`OneShot`] settles exactly once, with either a value or an error.
//! Later settle attempts are ignored. Any number of tasks can
//! [`wait`](OneShot::wait) for the result, and synchronous code can register
//! [`on_settle`](OneShot::on_settle) callbacks.

use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

type SettleCallback<T, E> = Box<dyn FnOnce(&Result<T, E>) + Send>;

struct Inner<T, E> {
    slot: watch::Sender<Option<Result<T, E>>>,
    callbacks: Mutex<Vec<SettleCallback<T, E>>>,
}

/// A result written at most once and observed by any number of waiters.
pub struct OneShot<T, E> {
    inner: Arc<Inner<T, E>>,
}

impl<T, E> Clone for OneShot<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> OneShot<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create an unsettled cell.
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                slot,
                callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Create a cell that is already resolved.
    pub fn resolved(value: T) -> Self {
        let cell = Self::new();
        cell.resolve(value);
        cell
    }

    /// Settle with a value. Returns `false` if the cell was already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settle with an error. Returns `false` if the cell was already settled.
    pub fn reject(&self, error: E) -> bool {
        self.settle(Err(error))
    }

    /// `true` once resolved or rejected.
    pub fn is_settled(&self) -> bool {
        self.inner.slot.borrow().is_some()
    }

    /// The settled result, if any, without waiting.
    pub fn peek(&self) -> Option<Result<T, E>> {
        self.inner.slot.borrow().clone()
    }

    /// `true` if both handles point at the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run `f` with the result once the cell settles.
    ///
    /// If the cell is already settled, `f` runs immediately on the calling
    /// thread.
    pub fn on_settle(&self, f: impl FnOnce(&Result<T, E>) + Send + 'static) {
        let mut callbacks = self.inner.callbacks.lock().expect("lock poisoned");
        match self.peek() {
            Some(result) => {
                drop(callbacks);
                f(&result);
            }
            None => callbacks.push(Box::new(f)),
        }
    }

    /// Wait until the cell settles and return a clone of the result.
    pub async fn wait(&self) -> Result<T, E> {
        let mut rx = self.inner.slot.subscribe();
        if let Ok(slot) = rx.wait_for(Option::is_some).await {
            if let Some(result) = slot.as_ref() {
                return result.clone();
            }
        }
        // The sender lives as long as `self`, so the channel cannot close first.
        std::future::pending().await
    }

    fn settle(&self, result: Result<T, E>) -> bool {
        let mut callbacks = self.inner.callbacks.lock().expect("lock poisoned");
        let written = self.inner.slot.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(result);
            true
        });
        if !written {
            return false;
        }
        let pending = std::mem::take(&mut *callbacks);
        drop(callbacks);
        if let Some(result) = self.peek() {
            for callback in pending {
                callback(&result);
            }
        }
        true
    }
}

impl<T, E> Default for OneShot<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for OneShot<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OneShot")
            .field(&*self.inner.slot.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    type Cell = OneShot<i32, String>;

    #[test]
    fn settles_only_once() {
        let cell = Cell::new();
        assert!(!cell.is_settled());
        assert!(cell.resolve(1));
        assert!(!cell.resolve(2));
        assert!(!cell.reject("late".into()));
        assert_eq!(cell.peek(), Some(Ok(1)));
    }

    #[test]
    fn reject_wins_when_first() {
        let cell = Cell::new();
        assert!(cell.reject("denied".into()));
        assert!(!cell.resolve(1));
        assert_eq!(cell.peek(), Some(Err("denied".to_string())));
    }

    #[test]
    fn callbacks_run_on_settle_and_after() {
        let cell = Cell::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        cell.on_settle(move |r| sink.lock().unwrap().push(r.clone()));
        assert!(seen.lock().unwrap().is_empty());

        cell.resolve(7);
        let sink = Arc::clone(&seen);
        cell.on_settle(move |r| sink.lock().unwrap().push(r.clone()));

        assert_eq!(*seen.lock().unwrap(), vec![Ok(7), Ok(7)]);
    }

    #[test]
    fn clones_share_the_slot() {
        let a = Cell::new();
        let b = a.clone();
        b.resolve(3);
        assert_eq!(a.peek(), Some(Ok(3)));
        assert!(a.ptr_eq(&b));
    }

    #[tokio::test]
    async fn many_waiters_observe_one_result() {
        let cell = Cell::new();
        let w1 = tokio::spawn({
            let cell = cell.clone();
            async move { cell.wait().await }
        });
        let w2 = tokio::spawn({
            let cell = cell.clone();
            async move { cell.wait().await }
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        cell.resolve(42);
        assert_eq!(w1.await.unwrap(), Ok(42));
        assert_eq!(w2.await.unwrap(), Ok(42));
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_settled() {
        let cell = Cell::resolved(9);
        assert_eq!(cell.wait().await, Ok(9));
    }
}
