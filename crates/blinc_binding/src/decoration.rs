//! Stream decorations
//!
//! Decorations are chosen once when a binding is built and wrap the
//! binding's subscribe behaviour. They are always applied in the same order:
//!
//! 1. [`Decorations::REMOVES_DUPLICATES`]: each subscriber skips values equal
//!    to the last value it received. Needs an equality function; without one
//!    this is a pass-through.
//! 2. [`Decorations::BOUNCES_TO_PRIMARY_THREAD`]: every value is re-delivered
//!    through a [`PrimaryQueue`], in arrival order.
//!
//! ```ignore
//! let label = binding.decorated(
//!     Decorations::REMOVES_DUPLICATES | Decorations::BOUNCES_TO_PRIMARY_THREAD,
//! );
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bitflags::bitflags;

use crate::cancellable::AnyCancellable;
use crate::dispatch::PrimaryQueue;
use crate::lock;
use crate::stream::Subscriber;
use crate::subject::{AnySubject, SubscribeFn};
use crate::BindingValue;

bitflags! {
    /// Stream transforms applied at binding construction
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Decorations: u8 {
        /// No decoration
        const NONE = 0;
        /// Suppress consecutive equal values
        const REMOVES_DUPLICATES = 1 << 0;
        /// Deliver on the primary thread
        const BOUNCES_TO_PRIMARY_THREAD = 1 << 1;
    }
}

/// Equality used for duplicate suppression
pub type EqualityFn<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// A decoration set plus what it needs to run
pub struct Decorator<T> {
    decorations: Decorations,
    equality: Option<EqualityFn<T>>,
    queue: Option<PrimaryQueue>,
}

impl<T> Clone for Decorator<T> {
    fn clone(&self) -> Self {
        Self {
            decorations: self.decorations,
            equality: self.equality.clone(),
            queue: self.queue.clone(),
        }
    }
}

impl<T: BindingValue> Decorator<T> {
    pub fn new(decorations: Decorations) -> Self {
        Self {
            decorations,
            equality: None,
            queue: None,
        }
    }

    /// Use `PartialEq` for duplicate suppression
    pub fn with_equality(self) -> Self
    where
        T: PartialEq,
    {
        self.with_equality_fn(|a: &T, b: &T| a == b)
    }

    /// Use a custom equality for duplicate suppression
    pub fn with_equality_fn<F>(mut self, eq: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        self.equality = Some(Arc::new(eq));
        self
    }

    /// Bounce to `queue` instead of the global primary queue
    pub fn on_queue(mut self, queue: PrimaryQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn decorations(&self) -> Decorations {
        self.decorations
    }

    /// Wrap `subject` so its subscribers see the decorated stream
    ///
    /// Sending, completion and upstream retention are unchanged.
    pub fn apply(&self, subject: &AnySubject<T>) -> AnySubject<T> {
        let mut subscribe = subject.subscribe_fn();

        if self.decorations.contains(Decorations::REMOVES_DUPLICATES) {
            match self.equality {
                Some(ref eq) => subscribe = remove_duplicates(subscribe, Arc::clone(eq)),
                None => tracing::debug!(
                    value_type = std::any::type_name::<T>(),
                    "Decorator: no equality available, duplicates pass through"
                ),
            }
        }

        if self.decorations.contains(Decorations::BOUNCES_TO_PRIMARY_THREAD) {
            let queue = self
                .queue
                .clone()
                .unwrap_or_else(|| PrimaryQueue::global().clone());
            subscribe = bounce_to(subscribe, queue);
        }

        subject.with_subscribe(subscribe)
    }
}

impl<T> fmt::Debug for Decorator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decorator")
            .field("decorations", &self.decorations)
            .field("has_equality", &self.equality.is_some())
            .field("queue", &self.queue)
            .finish()
    }
}

fn remove_duplicates<T: BindingValue>(upstream: SubscribeFn<T>, eq: EqualityFn<T>) -> SubscribeFn<T> {
    Arc::new(move |subscriber: Subscriber<T>| {
        let last_sent: Mutex<Option<T>> = Mutex::new(None);
        let eq = Arc::clone(&eq);
        let downstream = subscriber.clone();
        upstream(subscriber.relay(move |value: &T| {
            let fresh = {
                let mut last = lock(&last_sent);
                let duplicate = last.as_ref().is_some_and(|previous| eq(previous, value));
                if !duplicate {
                    *last = Some(value.clone());
                }
                !duplicate
            };
            if fresh {
                downstream.receive(value);
            }
        }))
    })
}

fn bounce_to<T: BindingValue>(upstream: SubscribeFn<T>, queue: PrimaryQueue) -> SubscribeFn<T> {
    Arc::new(move |subscriber: Subscriber<T>| {
        let live = Arc::new(AtomicBool::new(true));

        let on_value = {
            let queue = queue.clone();
            let live = Arc::clone(&live);
            let downstream = subscriber.clone();
            move |value: &T| {
                let value = value.clone();
                let live = Arc::clone(&live);
                let downstream = downstream.clone();
                queue.dispatch(move || {
                    if live.load(Ordering::Acquire) {
                        downstream.receive(&value);
                    }
                });
            }
        };
        let on_complete = {
            let queue = queue.clone();
            let live = Arc::clone(&live);
            move || {
                let live = Arc::clone(&live);
                let downstream = subscriber.clone();
                queue.dispatch(move || {
                    if live.load(Ordering::Acquire) {
                        downstream.receive_completion();
                    }
                });
            }
        };

        let handle = upstream(Subscriber::new(on_value).on_complete(on_complete));
        AnyCancellable::new(move || {
            // Jobs already queued for this subscriber become no-ops
            live.store(false, Ordering::Release);
            handle.cancel();
        })
    })
}
