use std::fmt;
use std::sync::Mutex;

type Cancel = Box<dyn FnOnce() + Send>;

/// Handle to a live subscription.
///
/// [`unsubscribe`](Subscription::unsubscribe) may be called any number of
/// times; only the first call reaches the source. Dropping the handle does
/// not cancel the subscription.
pub struct Subscription {
    cancel: Mutex<Option<Cancel>>,
}

impl Subscription {
    /// A subscription that runs `cancel` on the first unsubscribe.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// A subscription with nothing to cancel.
    pub fn noop() -> Self {
        Self {
            cancel: Mutex::new(None),
        }
    }

    /// Cancel the subscription. Later calls do nothing.
    pub fn unsubscribe(&self) {
        let cancel = self.cancel.lock().expect("lock poisoned").take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    /// `true` until unsubscribed.
    pub fn is_active(&self) -> bool {
        self.cancel.lock().expect("lock poisoned").is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn unsubscribe_runs_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let sub = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(sub.is_active());
        sub.unsubscribe();
        sub.unsubscribe();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!sub.is_active());
    }

    #[test]
    fn noop_is_inactive() {
        let sub = Subscription::noop();
        assert!(!sub.is_active());
        sub.unsubscribe();
    }
}
