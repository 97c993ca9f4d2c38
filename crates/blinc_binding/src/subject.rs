//! Channels and channel type erasure
//!
//! A [`Subject`] both accepts new values and can be subscribed to.
//! [`AnySubject`] erases a concrete subject into four shared behaviours so
//! bindings never depend on a concrete channel type.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::cancellable::AnyCancellable;
use crate::lock;
use crate::stream::{Subscriber, ValueStream};

/// A bidirectional value channel
pub trait Subject<T: 'static>: ValueStream<T> {
    /// Publish a new value to every live subscriber
    fn send(&self, value: T);

    /// Finish the stream; later sends are ignored
    fn send_completion(&self);

    /// Retain an upstream subscription for the lifetime of the channel
    fn send_subscription(&self, upstream: AnyCancellable);
}

pub(crate) type SubscribeFn<T> = Arc<dyn Fn(Subscriber<T>) -> AnyCancellable + Send + Sync>;
type SendFn<T> = Arc<dyn Fn(T) + Send + Sync>;
type CompleteFn = Arc<dyn Fn() + Send + Sync>;
type AttachFn = Arc<dyn Fn(AnyCancellable) + Send + Sync>;

/// A type-erased [`Subject`]
///
/// Cloning shares the erased behaviours, not the values.
pub struct AnySubject<T> {
    subscribe: SubscribeFn<T>,
    send: SendFn<T>,
    complete: CompleteFn,
    attach: AttachFn,
}

impl<T> Clone for AnySubject<T> {
    fn clone(&self) -> Self {
        Self {
            subscribe: Arc::clone(&self.subscribe),
            send: Arc::clone(&self.send),
            complete: Arc::clone(&self.complete),
            attach: Arc::clone(&self.attach),
        }
    }
}

impl<T: Send + 'static> AnySubject<T> {
    /// Erase a concrete subject
    pub fn new<S>(subject: S) -> Self
    where
        S: Subject<T> + Send + Sync + 'static,
    {
        let subject = Arc::new(subject);
        let (s1, s2, s3, s4) = (
            Arc::clone(&subject),
            Arc::clone(&subject),
            Arc::clone(&subject),
            subject,
        );
        Self {
            subscribe: Arc::new(move |subscriber: Subscriber<T>| s1.subscribe_with(subscriber)),
            send: Arc::new(move |value: T| s2.send(value)),
            complete: Arc::new(move || s3.send_completion()),
            attach: Arc::new(move |upstream: AnyCancellable| s4.send_subscription(upstream)),
        }
    }

    /// Build a subject from a subscribe behaviour and a send behaviour
    ///
    /// Used for foreign observable sources. Completion is a no-op and
    /// attached upstream handles are retained until every clone is dropped.
    pub fn from_fns<S, V>(subscribe: S, send: V) -> Self
    where
        S: Fn(Subscriber<T>) -> AnyCancellable + Send + Sync + 'static,
        V: Fn(T) + Send + Sync + 'static,
    {
        let retained: Arc<Mutex<Vec<AnyCancellable>>> = Arc::new(Mutex::new(Vec::new()));
        Self {
            subscribe: Arc::new(subscribe),
            send: Arc::new(send),
            complete: Arc::new(|| {}),
            attach: Arc::new(move |upstream: AnyCancellable| lock(&retained).push(upstream)),
        }
    }

    /// Replace the completion behaviour
    pub fn with_completion<C>(mut self, complete: C) -> Self
    where
        C: Fn() + Send + Sync + 'static,
    {
        self.complete = Arc::new(complete);
        self
    }

    pub(crate) fn subscribe_fn(&self) -> SubscribeFn<T> {
        Arc::clone(&self.subscribe)
    }

    /// Same channel with a transformed subscribe behaviour
    pub(crate) fn with_subscribe(&self, subscribe: SubscribeFn<T>) -> Self {
        Self {
            subscribe,
            send: Arc::clone(&self.send),
            complete: Arc::clone(&self.complete),
            attach: Arc::clone(&self.attach),
        }
    }
}

impl<T: Send + 'static> ValueStream<T> for AnySubject<T> {
    fn subscribe_with(&self, subscriber: Subscriber<T>) -> AnyCancellable {
        (self.subscribe)(subscriber)
    }
}

impl<T: Send + 'static> Subject<T> for AnySubject<T> {
    fn send(&self, value: T) {
        (self.send)(value);
    }

    fn send_completion(&self) {
        (self.complete)();
    }

    fn send_subscription(&self, upstream: AnyCancellable) {
        (self.attach)(upstream);
    }
}

impl<T> fmt::Debug for AnySubject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnySubject").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::ValueCell;
    use crate::stream::CurrentValue;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_erased_cell_round_trip() {
        let cell = ValueCell::new(1);
        let subject = AnySubject::new(cell.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        let _sub = subject.subscribe(move |v: &i32| seen_clone.lock().unwrap().push(*v));

        subject.send(2);
        cell.send(3);

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(cell.current_value(), 3);
    }

    #[test]
    fn test_erased_completion_reaches_cell() {
        let cell = ValueCell::new("a".to_string());
        let subject = AnySubject::new(cell.clone());
        let completed = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&completed);
        let _sub = subject.sink(|_| {}, move || flag.store(true, Ordering::SeqCst));

        subject.send_completion();
        assert!(completed.load(Ordering::SeqCst));
        assert!(cell.is_completed());
    }

    #[test]
    fn test_from_fns_forwards_and_retains_upstream() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sent_clone = Arc::clone(&sent);
        let subject: AnySubject<i32> = AnySubject::from_fns(
            |_subscriber| AnyCancellable::empty(),
            move |v| sent_clone.lock().unwrap().push(v),
        );

        subject.send(7);
        assert_eq!(*sent.lock().unwrap(), vec![7]);

        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        subject.send_subscription(AnyCancellable::new(move || {
            flag.store(true, Ordering::SeqCst)
        }));
        assert!(!cancelled.load(Ordering::SeqCst));

        drop(subject);
        assert!(cancelled.load(Ordering::SeqCst));
    }
}
