//! Derived-binding plumbing
//!
//! Shared by [`Binding`](crate::Binding) and
//! [`MutableBinding`](crate::MutableBinding):
//!
//! - [`mirror`] keeps a local cell equal to `extract(parent)` on every parent
//!   emission, including whole-value replacement of the parent.
//! - [`follow`] does the same for a field that is itself a binding. Each parent
//!   emission may carry a different nested binding, so the nested
//!   subscription is cancelled and re-established every time.
//!
//! The local cell is only referenced weakly from the parent side. The derived
//! binding owns the returned upstream handle; dropping it detaches from the
//! parent.

use std::sync::{Arc, Mutex};

use crate::cancellable::AnyCancellable;
use crate::cell::{ValueCell, WeakValueCell};
use crate::lock;
use crate::stream::{CurrentValue, Subscriber, ValueStream};
use crate::BindingValue;

fn forward_completion<U: BindingValue>(weak: WeakValueCell<U>) -> impl Fn() + Send + Sync {
    move || {
        if let Some(cell) = weak.upgrade() {
            cell.send_completion();
        }
    }
}

/// Mirror `extract(parent)` into a fresh cell
pub(crate) fn mirror<T, U, S, F>(parent: &S, extract: F) -> (ValueCell<U>, AnyCancellable)
where
    T: BindingValue,
    U: BindingValue,
    S: ValueStream<T> + CurrentValue<T> + ?Sized,
    F: Fn(&T) -> U + Send + Sync + 'static,
{
    let cell = ValueCell::new(extract(&parent.current_value()));
    let weak = cell.downgrade();
    let on_value = move |value: &T| {
        if let Some(cell) = weak.upgrade() {
            cell.send(extract(value));
        }
    };
    let subscriber = Subscriber::new(on_value).on_complete(forward_completion(cell.downgrade()));
    let upstream = parent.subscribe_with(subscriber);
    (cell, upstream)
}

/// A cell following whichever nested binding the parent currently holds
pub(crate) struct Followed<B, U> {
    pub cell: ValueCell<U>,
    pub upstream: AnyCancellable,
    /// The nested binding the cell is currently attached to
    pub active: Arc<Mutex<B>>,
}

/// Follow the nested binding selected out of each parent value
pub(crate) fn follow<T, U, B, S, F>(parent: &S, select: F) -> Followed<B, U>
where
    T: BindingValue,
    U: BindingValue,
    S: ValueStream<T> + CurrentValue<T> + ?Sized,
    B: ValueStream<U> + CurrentValue<U> + Send + 'static,
    F: Fn(&T) -> B + Send + Sync + 'static,
{
    let first = select(&parent.current_value());
    let cell = ValueCell::new(first.current_value());
    let active = Arc::new(Mutex::new(first));
    let inner: Arc<Mutex<Option<AnyCancellable>>> = Arc::new(Mutex::new(None));

    let weak = cell.downgrade();
    let slot = Arc::clone(&inner);
    let current = Arc::clone(&active);
    let on_value = move |value: &T| {
        // The stale nested subscription must be gone before the new one
        // delivers, or the cell sees values from both.
        let stale = lock(&slot).take();
        if let Some(stale) = stale {
            stale.cancel();
        }

        let nested = select(value);
        let target = weak.clone();
        let handle = nested.subscribe_with(Subscriber::new(move |leaf: &U| {
            if let Some(cell) = target.upgrade() {
                cell.send(leaf.clone());
            }
        }));

        let previous = std::mem::replace(&mut *lock(&current), nested);
        drop(previous);
        let replaced = lock(&slot).replace(handle);
        drop(replaced);
    };
    let subscriber = Subscriber::new(on_value).on_complete(forward_completion(cell.downgrade()));
    let outer = parent.subscribe_with(subscriber);

    let upstream = AnyCancellable::new(move || {
        outer.cancel();
        let nested = lock(&inner).take();
        drop(nested);
    });

    Followed {
        cell,
        upstream,
        active,
    }
}
