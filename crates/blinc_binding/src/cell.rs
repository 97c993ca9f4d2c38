//! Value cells
//!
//! A [`ValueCell<T>`] holds one current value and broadcasts every change to
//! its subscribers, in registration order. It is the channel that every
//! binding is ultimately built on.
//!
//! # Invariants
//!
//! 1. There is exactly one current value; `send` replaces it before any
//!    subscriber is notified.
//! 2. Subscribing delivers the current value before `subscribe` returns.
//!    A subscriber added mid-round skips values queued before it joined.
//! 3. Subscribers are notified in registration order.
//! 4. Notification is never nested. A `send` issued while the cell is already
//!    notifying (from a subscriber callback or from another thread) is queued
//!    and delivered, in FIFO order, once the current round finishes.
//! 5. A cancelled subscriber receives nothing further, even when cancelled
//!    from inside a callback of the round in progress.
//! 6. After completion, sends are ignored and late subscribers receive the
//!    final value followed immediately by completion.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use crate::cancellable::AnyCancellable;
use crate::lock;
use crate::stream::{CurrentValue, Subscriber, ValueStream};
use crate::subject::Subject;

new_key_type! {
    /// Identifies one subscriber of a cell
    pub struct SubscriberId;
}

struct Entry<T> {
    subscriber: Subscriber<T>,
    active: Arc<AtomicBool>,
    /// First event sequence this entry should see
    since: u64,
}

enum Event<T> {
    Value(T),
    Completion,
}

struct CellState<T> {
    value: T,
    entries: SlotMap<SubscriberId, Arc<Entry<T>>>,
    /// Registration order of live entries
    order: SmallVec<[SubscriberId; 4]>,
    pending: VecDeque<(u64, Event<T>)>,
    /// Sequence number of the next queued event
    next_seq: u64,
    notifying: bool,
    completed: bool,
    upstream: Vec<AnyCancellable>,
}

impl<T> CellState<T> {
    /// Live entries registered before event `seq` was queued
    fn snapshot(&self, seq: u64) -> SmallVec<[Arc<Entry<T>>; 4]> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(*id))
            .filter(|entry| entry.since <= seq)
            .cloned()
            .collect()
    }

    fn enqueue(&mut self, event: Event<T>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push_back((seq, event));
    }
}

struct CellInner<T> {
    state: Mutex<CellState<T>>,
}

impl<T> CellInner<T> {
    fn lock(&self) -> MutexGuard<'_, CellState<T>> {
        lock(&self.state)
    }

    fn remove(&self, id: SubscriberId) {
        let removed = {
            let mut state = self.lock();
            state.order.retain(|entry| *entry != id);
            state.entries.remove(id)
        };
        // Dropped outside the lock: the subscriber may own other handles
        drop(removed);
    }
}

/// Resets the notifying flag if a subscriber panics mid-round
struct NotifyGuard<'a, T> {
    inner: &'a CellInner<T>,
}

impl<T> Drop for NotifyGuard<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.inner.lock().notifying = false;
        }
    }
}

/// A mutable holder of `T` that is also a channel
///
/// Cloning a `ValueCell` creates a new handle to the **same** cell.
pub struct ValueCell<T> {
    inner: Arc<CellInner<T>>,
}

impl<T> Clone for ValueCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> ValueCell<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(CellInner {
                state: Mutex::new(CellState {
                    value: initial,
                    entries: SlotMap::with_key(),
                    order: SmallVec::new(),
                    pending: VecDeque::new(),
                    next_seq: 0,
                    notifying: false,
                    completed: false,
                    upstream: Vec::new(),
                }),
            }),
        }
    }

    /// Clone out the current value
    pub fn read(&self) -> T {
        self.inner.lock().value.clone()
    }

    /// Access the current value by reference
    ///
    /// The cell is locked while `f` runs; `f` must not touch this cell.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.lock().value)
    }

    /// Replace the current value and notify subscribers
    pub fn send(&self, value: T) {
        let mut state = self.inner.lock();
        if state.completed {
            tracing::trace!("ValueCell: send after completion ignored");
            return;
        }
        state.value = value.clone();
        state.enqueue(Event::Value(value));
        if state.notifying {
            return;
        }
        state.notifying = true;
        drop(state);
        self.flush();
    }

    /// Complete the stream
    ///
    /// Subscribers are notified after any values still queued, then released
    /// together with retained upstream handles.
    pub fn send_completion(&self) {
        let mut state = self.inner.lock();
        if state.completed {
            return;
        }
        state.completed = true;
        state.enqueue(Event::Completion);
        if state.notifying {
            return;
        }
        state.notifying = true;
        drop(state);
        self.flush();
    }

    /// Keep `upstream` alive for as long as this cell lives
    pub fn send_subscription(&self, upstream: AnyCancellable) {
        let mut state = self.inner.lock();
        if state.completed {
            drop(state);
            upstream.cancel();
            return;
        }
        state.upstream.push(upstream);
    }

    /// Forward every value of `source` into this cell
    ///
    /// The forwarding subscription is owned by the cell, not by `source`.
    pub fn assign_from<S>(&self, source: &S)
    where
        S: ValueStream<T>,
    {
        let weak = self.downgrade();
        let handle = source.subscribe_with(Subscriber::new(move |value: &T| {
            if let Some(cell) = weak.upgrade() {
                cell.send(value.clone());
            }
        }));
        self.send_subscription(handle);
    }

    pub fn is_completed(&self) -> bool {
        self.inner.lock().completed
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().order.len()
    }

    /// A handle that does not keep the cell alive
    pub fn downgrade(&self) -> WeakValueCell<T> {
        WeakValueCell {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether two handles refer to the same cell
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Drain the pending queue; only the thread that set `notifying` runs this
    fn flush(&self) {
        let _guard = NotifyGuard { inner: &self.inner };
        loop {
            let (event, entries) = {
                let mut state = self.inner.lock();
                match state.pending.pop_front() {
                    Some((seq, event)) => (event, state.snapshot(seq)),
                    None => {
                        state.notifying = false;
                        return;
                    }
                }
            };

            match event {
                Event::Value(value) => {
                    for entry in &entries {
                        if entry.active.load(Ordering::Acquire) {
                            entry.subscriber.receive(&value);
                        }
                    }
                }
                Event::Completion => {
                    for entry in &entries {
                        if entry.active.swap(false, Ordering::AcqRel) {
                            entry.subscriber.receive_completion();
                        }
                    }
                    let (released, upstream) = {
                        let mut state = self.inner.lock();
                        state.order.clear();
                        (
                            std::mem::take(&mut state.entries),
                            std::mem::take(&mut state.upstream),
                        )
                    };
                    tracing::debug!(
                        subscribers = released.len(),
                        "ValueCell: completed, releasing subscribers"
                    );
                    drop(released);
                    drop(upstream);
                }
            }
        }
    }
}

impl<T: Clone + Send + 'static> ValueStream<T> for ValueCell<T> {
    fn subscribe_with(&self, subscriber: Subscriber<T>) -> AnyCancellable {
        let active = Arc::new(AtomicBool::new(true));
        let (current, id) = {
            let mut state = self.inner.lock();
            let id = (!state.completed).then(|| {
                // Values still queued are older than the one delivered below
                let since = state.next_seq;
                let id = state.entries.insert(Arc::new(Entry {
                    subscriber: subscriber.clone(),
                    active: Arc::clone(&active),
                    since,
                }));
                state.order.push(id);
                id
            });
            (state.value.clone(), id)
        };

        subscriber.receive(&current);

        let Some(id) = id else {
            subscriber.receive_completion();
            return AnyCancellable::empty();
        };

        let weak = Arc::downgrade(&self.inner);
        AnyCancellable::new(move || {
            active.store(false, Ordering::Release);
            if let Some(inner) = weak.upgrade() {
                inner.remove(id);
            }
        })
    }
}

impl<T: Clone + Send + 'static> Subject<T> for ValueCell<T> {
    fn send(&self, value: T) {
        ValueCell::send(self, value);
    }

    fn send_completion(&self) {
        ValueCell::send_completion(self);
    }

    fn send_subscription(&self, upstream: AnyCancellable) {
        ValueCell::send_subscription(self, upstream);
    }
}

impl<T: Clone + Send + 'static> CurrentValue<T> for ValueCell<T> {
    fn current_value(&self) -> T {
        self.read()
    }
}

impl<T: fmt::Debug> fmt::Debug for ValueCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("ValueCell")
            .field("value", &state.value)
            .field("subscribers", &state.order.len())
            .field("completed", &state.completed)
            .finish()
    }
}

/// Non-owning handle to a [`ValueCell`]
pub struct WeakValueCell<T> {
    inner: Weak<CellInner<T>>,
}

impl<T> Clone for WeakValueCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> WeakValueCell<T> {
    pub fn upgrade(&self) -> Option<ValueCell<T>> {
        self.inner.upgrade().map(|inner| ValueCell { inner })
    }
}
