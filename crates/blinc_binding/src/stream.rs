//! Stream and synchronous-read contracts
//!
//! These two traits are the whole surface the view layer sees:
//!
//! - [`ValueStream`]: subscribe to a stream of values. The current value is
//!   delivered before `subscribe` returns, then every later value, until the
//!   returned handle is cancelled. Streams may complete but never fail.
//! - [`CurrentValue`]: read the current value without subscribing.

use std::fmt;
use std::sync::Arc;

use crate::cancellable::AnyCancellable;

/// Value callback shared between a subscriber and its relays
pub type ValueFn<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Completion callback
pub type CompletionFn = Arc<dyn Fn() + Send + Sync>;

/// The receiving end of a subscription: a value callback and an optional
/// completion callback
pub struct Subscriber<T> {
    on_value: ValueFn<T>,
    on_complete: Option<CompletionFn>,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            on_value: Arc::clone(&self.on_value),
            on_complete: self.on_complete.clone(),
        }
    }
}

impl<T: 'static> Subscriber<T> {
    pub fn new<F>(on_value: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        Self {
            on_value: Arc::new(on_value),
            on_complete: None,
        }
    }

    /// Attach a completion callback
    pub fn on_complete<C>(mut self, on_complete: C) -> Self
    where
        C: Fn() + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(on_complete));
        self
    }

    pub fn receive(&self, value: &T) {
        (self.on_value)(value);
    }

    pub fn receive_completion(&self) {
        if let Some(ref on_complete) = self.on_complete {
            on_complete();
        }
    }

    /// Build an upstream subscriber that shares this subscriber's completion
    ///
    /// Stream transforms use this so completion flows through untouched while
    /// values go through `on_value`.
    pub(crate) fn relay<S, F>(&self, on_value: F) -> Subscriber<S>
    where
        S: 'static,
        F: Fn(&S) + Send + Sync + 'static,
    {
        Subscriber {
            on_value: Arc::new(on_value),
            on_complete: self.on_complete.clone(),
        }
    }
}

impl<T> fmt::Debug for Subscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("has_completion", &self.on_complete.is_some())
            .finish()
    }
}

/// Subscribe to a stream of values
pub trait ValueStream<T: 'static> {
    /// Register `subscriber`; the current value is delivered before returning
    fn subscribe_with(&self, subscriber: Subscriber<T>) -> AnyCancellable;

    /// Subscribe with a value callback only
    fn subscribe<F>(&self, on_value: F) -> AnyCancellable
    where
        Self: Sized,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_with(Subscriber::new(on_value))
    }

    /// Subscribe with value and completion callbacks
    fn sink<F, C>(&self, on_value: F, on_complete: C) -> AnyCancellable
    where
        Self: Sized,
        F: Fn(&T) + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        self.subscribe_with(Subscriber::new(on_value).on_complete(on_complete))
    }
}

/// Read the current value synchronously
pub trait CurrentValue<T> {
    fn current_value(&self) -> T;
}
