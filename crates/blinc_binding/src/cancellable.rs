//! Subscription handles
//!
//! An [`AnyCancellable`] represents one live delivery relationship. Cancelling
//! it runs its teardown exactly once; dropping it cancels it.
//!
//! ```ignore
//! let cell = ValueCell::new(0);
//! let handle = cell.subscribe(|v| println!("{v}"));
//!
//! handle.cancel();
//! handle.cancel(); // no-op
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::lock;

type Teardown = Box<dyn FnOnce() + Send>;

/// A cancel-once token for a live subscription
///
/// Handles are not `Clone`: whoever holds the handle owns the subscription.
/// Share ownership by wrapping in an `Arc`, or hand it to a
/// [`CancellableStore`](crate::storage::CancellableStore).
#[must_use = "dropping an AnyCancellable cancels the subscription"]
pub struct AnyCancellable {
    cancelled: AtomicBool,
    teardown: Mutex<Option<Teardown>>,
}

impl AnyCancellable {
    /// Create a handle that runs `teardown` on first cancel
    pub fn new<F>(teardown: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cancelled: AtomicBool::new(false),
            teardown: Mutex::new(Some(Box::new(teardown))),
        }
    }

    /// A handle with nothing to tear down
    pub fn empty() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            teardown: Mutex::new(None),
        }
    }

    /// Combine several handles into one composite handle
    ///
    /// Cancelling the composite cancels every member in insertion order.
    pub fn union<I>(handles: I) -> Self
    where
        I: IntoIterator<Item = AnyCancellable>,
    {
        let handles: Vec<AnyCancellable> = handles.into_iter().collect();
        Self::new(move || {
            for handle in &handles {
                handle.cancel();
            }
        })
    }

    /// Cancel the subscription
    ///
    /// The teardown runs on the first call only. It runs outside the handle's
    /// lock, so teardowns may cancel other handles (or this one) freely.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        let teardown = lock(&self.teardown).take();
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for AnyCancellable {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl FromIterator<AnyCancellable> for AnyCancellable {
    fn from_iter<I: IntoIterator<Item = AnyCancellable>>(iter: I) -> Self {
        Self::union(iter)
    }
}

impl fmt::Debug for AnyCancellable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyCancellable")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn counting(counter: &Arc<AtomicUsize>) -> AnyCancellable {
        let counter = Arc::clone(counter);
        AnyCancellable::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_cancel_runs_teardown_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let handle = counting(&runs);

        assert!(!handle.is_cancelled());
        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        drop(handle);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_cancels() {
        let runs = Arc::new(AtomicUsize::new(0));
        {
            let _handle = counting(&runs);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_union_cancels_members_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let handles = (0..3).map(|i| {
            let order = Arc::clone(&order);
            AnyCancellable::new(move || order.lock().unwrap().push(i))
        });
        let composite = AnyCancellable::union(handles);

        composite.cancel();
        composite.cancel();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_teardown_may_cancel_itself() {
        let slot: Arc<Mutex<Option<Arc<AnyCancellable>>>> = Arc::new(Mutex::new(None));
        let inner = Arc::clone(&slot);
        let handle = Arc::new(AnyCancellable::new(move || {
            if let Some(me) = inner.lock().unwrap().take() {
                me.cancel();
            }
        }));
        *slot.lock().unwrap() = Some(Arc::clone(&handle));

        handle.cancel();
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_empty_handle() {
        let handle = AnyCancellable::empty();
        handle.cancel();
        assert!(handle.is_cancelled());
        assert!(format!("{handle:?}").contains("cancelled: true"));
    }
}
