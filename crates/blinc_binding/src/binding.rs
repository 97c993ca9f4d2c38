//! Read-only bindings
//!
//! A [`Binding<T>`] pairs a value stream with a synchronous getter. Views hold
//! bindings instead of raw values: they read the current value with
//! [`get`](Binding::get) and subscribe for changes.
//!
//! ```ignore
//! let title = Binding::from_cell(cell.clone());
//! let upper = title.map(|s: &String| s.to_uppercase());
//!
//! let _sub = upper.subscribe(|s| println!("{s}"));
//! cell.send("hello".into()); // prints "HELLO"
//! ```
//!
//! Derived bindings ([`map`](Binding::map), [`project`](Binding::project),
//! [`project_binding`](Binding::project_binding), [`combine`](Binding::combine))
//! own their subscription to the parent. A subscription to a derived binding
//! keeps that derivation alive, so `parent.map(f).subscribe(g)` keeps
//! delivering after the intermediate binding is dropped.

use std::fmt;
use std::sync::Arc;

use crate::cancellable::AnyCancellable;
use crate::cell::ValueCell;
use crate::decoration::{Decorations, Decorator};
use crate::derive;
use crate::lens::Lens;
use crate::stream::{CurrentValue, Subscriber, ValueStream};
use crate::subject::AnySubject;
use crate::BindingValue;

type GetFn<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// A read-only view of a changing value
pub struct Binding<T> {
    subject: AnySubject<T>,
    getter: GetFn<T>,
    upstream: Option<Arc<AnyCancellable>>,
}

impl<T> Clone for Binding<T> {
    fn clone(&self) -> Self {
        Self {
            subject: self.subject.clone(),
            getter: Arc::clone(&self.getter),
            upstream: self.upstream.clone(),
        }
    }
}

impl<T: BindingValue> Binding<T> {
    /// A binding that never changes
    ///
    /// Subscribers receive the value followed by completion.
    pub fn constant(value: T) -> Self {
        let cell = ValueCell::new(value);
        cell.send_completion();
        Self::from_cell(cell)
    }

    pub fn from_cell(cell: ValueCell<T>) -> Self {
        let reader = cell.clone();
        Self {
            subject: AnySubject::new(cell),
            getter: Arc::new(move || reader.read()),
            upstream: None,
        }
    }

    /// A binding over a foreign stream
    ///
    /// `getter` must return the value most recently emitted by `subject`.
    pub fn from_stream<G>(subject: AnySubject<T>, getter: G) -> Self
    where
        G: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            subject,
            getter: Arc::new(getter),
            upstream: None,
        }
    }

    /// A binding over a cell that mirrors a parent through `upstream`
    pub(crate) fn derived(cell: ValueCell<T>, upstream: AnyCancellable) -> Self {
        let mut binding = Self::from_cell(cell);
        binding.upstream = Some(Arc::new(upstream));
        binding
    }

    pub fn get(&self) -> T {
        (self.getter)()
    }

    /// The underlying channel
    pub fn subject(&self) -> &AnySubject<T> {
        &self.subject
    }

    /// Derive a binding whose value is `f` of this binding's value
    pub fn map<U, F>(&self, f: F) -> Binding<U>
    where
        U: BindingValue,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        let (cell, upstream) = derive::mirror(self, f);
        Binding::derived(cell, upstream)
    }

    /// Derive a read-only binding of the field `lens` focuses on
    pub fn project<U: BindingValue>(&self, lens: Lens<T, U>) -> Binding<U> {
        self.map(move |value: &T| lens.get(value))
    }

    /// Derive a binding from a field that is itself a binding
    ///
    /// Whenever this binding emits, `select` picks the nested binding out of
    /// the new value and the derived binding switches over to it.
    pub fn project_binding<U, F>(&self, select: F) -> Binding<U>
    where
        U: BindingValue,
        F: Fn(&T) -> Binding<U> + Send + Sync + 'static,
    {
        let followed = derive::follow(self, select);
        Binding::derived(followed.cell, followed.upstream)
    }

    /// Latest-of-two: recompute from both bindings whenever either emits
    pub fn combine<A, B, F>(a: &Binding<A>, b: &Binding<B>, f: F) -> Binding<T>
    where
        A: BindingValue,
        B: BindingValue,
        F: Fn(&A, &B) -> T + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let cell = ValueCell::new(f(&a.get(), &b.get()));

        let on_a = {
            let f = Arc::clone(&f);
            let other = b.clone();
            let weak = cell.downgrade();
            move |value: &A| {
                if let Some(cell) = weak.upgrade() {
                    cell.send(f(value, &other.get()));
                }
            }
        };
        let on_b = {
            let other = a.clone();
            let weak = cell.downgrade();
            move |value: &B| {
                if let Some(cell) = weak.upgrade() {
                    cell.send(f(&other.get(), value));
                }
            }
        };

        let upstream = AnyCancellable::union([a.subscribe(on_a), b.subscribe(on_b)]);
        Binding::derived(cell, upstream)
    }

    /// Apply `decorations`, using `PartialEq` for duplicate suppression
    pub fn decorated(&self, decorations: Decorations) -> Binding<T>
    where
        T: PartialEq,
    {
        self.decorated_with(&Decorator::new(decorations).with_equality())
    }

    /// Apply `decorations` to a type without equality
    ///
    /// [`Decorations::REMOVES_DUPLICATES`] becomes a pass-through.
    pub fn decorated_without_equality(&self, decorations: Decorations) -> Binding<T> {
        self.decorated_with(&Decorator::new(decorations))
    }

    pub fn decorated_with(&self, decorator: &Decorator<T>) -> Binding<T> {
        Self {
            subject: decorator.apply(&self.subject),
            getter: Arc::clone(&self.getter),
            upstream: self.upstream.clone(),
        }
    }
}

impl<T: BindingValue> ValueStream<T> for Binding<T> {
    fn subscribe_with(&self, subscriber: Subscriber<T>) -> AnyCancellable {
        let handle = self.subject.subscribe_with(subscriber);
        match self.upstream {
            Some(ref upstream) => {
                let keep_alive = (self.subject.clone(), Arc::clone(upstream));
                AnyCancellable::new(move || {
                    handle.cancel();
                    drop(keep_alive);
                })
            }
            None => handle,
        }
    }
}

impl<T: BindingValue> CurrentValue<T> for Binding<T> {
    fn current_value(&self) -> T {
        self.get()
    }
}

impl<T: BindingValue> From<ValueCell<T>> for Binding<T> {
    fn from(cell: ValueCell<T>) -> Self {
        Self::from_cell(cell)
    }
}

impl<T> fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("derived", &self.upstream.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lens;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    fn collect_into<T: BindingValue>(seen: &Arc<Mutex<Vec<T>>>) -> impl Fn(&T) + Send + Sync {
        let seen = Arc::clone(seen);
        move |v: &T| seen.lock().unwrap().push(v.clone())
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Pair {
        a: i32,
        b: i32,
    }

    #[test]
    fn test_constant_completes() {
        let binding = Binding::constant(3);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let completed = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&completed);
        let _sub = binding.sink(collect_into(&seen), move || flag.store(true, Ordering::SeqCst));

        assert_eq!(binding.get(), 3);
        assert_eq!(*seen.lock().unwrap(), vec![3]);
        assert!(completed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_immediate_delivery() {
        let cell = ValueCell::new("a".to_string());
        let binding = Binding::from_cell(cell.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let _sub = binding.subscribe(collect_into(&seen));
        assert_eq!(*seen.lock().unwrap(), vec!["a".to_string()]);

        cell.send("b".into());
        assert_eq!(binding.get(), "b");
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_map_follows_parent() {
        let cell = ValueCell::new(2);
        let doubled = Binding::from_cell(cell.clone()).map(|v: &i32| v * 2);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let _sub = doubled.subscribe(collect_into(&seen));
        cell.send(5);

        assert_eq!(doubled.get(), 10);
        assert_eq!(*seen.lock().unwrap(), vec![4, 10]);
    }

    #[test]
    fn test_subscription_keeps_derivation_alive() {
        let cell = ValueCell::new(1);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sub = Binding::from_cell(cell.clone())
            .map(|v: &i32| v + 100)
            .subscribe(collect_into(&seen));
        cell.send(2);
        assert_eq!(*seen.lock().unwrap(), vec![101, 102]);

        drop(sub);
        assert_eq!(cell.subscriber_count(), 0);
        cell.send(3);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_dropping_derived_binding_detaches() {
        let cell = ValueCell::new(1);
        let mapped = Binding::from_cell(cell.clone()).map(|v: &i32| *v);
        assert_eq!(cell.subscriber_count(), 1);

        drop(mapped);
        assert_eq!(cell.subscriber_count(), 0);
    }

    #[test]
    fn test_project_read_only() {
        let cell = ValueCell::new(Pair { a: 1, b: 2 });
        let b = Binding::from_cell(cell.clone()).project(lens!(Pair, b));

        assert_eq!(b.get(), 2);
        cell.send(Pair { a: 1, b: 7 });
        assert_eq!(b.get(), 7);
    }

    #[test]
    fn test_project_binding_switches() {
        #[derive(Clone)]
        struct Row {
            title: Binding<String>,
        }

        let first = ValueCell::new("first".to_string());
        let second = ValueCell::new("second".to_string());
        let row = ValueCell::new(Row {
            title: Binding::from_cell(first.clone()),
        });

        let title = Binding::from_cell(row.clone()).project_binding(|r: &Row| r.title.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _sub = title.subscribe(collect_into(&seen));

        row.send(Row {
            title: Binding::from_cell(second.clone()),
        });
        first.send("stale".into());
        second.send("fresh".into());

        assert_eq!(title.get(), "fresh");
        assert_eq!(first.subscriber_count(), 0);
        let seen = seen.lock().unwrap();
        assert!(!seen.contains(&"stale".to_string()));
        assert_eq!(seen.last().map(String::as_str), Some("fresh"));
    }

    #[test]
    fn test_combine_latest() {
        let width = ValueCell::new(2);
        let height = ValueCell::new(3);
        let area = Binding::combine(
            &Binding::from_cell(width.clone()),
            &Binding::from_cell(height.clone()),
            |w: &i32, h: &i32| w * h,
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _sub = area.subscribe(collect_into(&seen));

        width.send(4);
        height.send(5);

        assert_eq!(area.get(), 20);
        assert_eq!(*seen.lock().unwrap(), vec![6, 12, 20]);
    }

    #[test]
    fn test_decorated_removes_duplicates() {
        let cell = ValueCell::new(1);
        let binding = Binding::from_cell(cell.clone()).decorated(Decorations::REMOVES_DUPLICATES);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let _sub = binding.subscribe(collect_into(&seen));
        cell.send(1);
        cell.send(2);
        cell.send(2);

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }
}
