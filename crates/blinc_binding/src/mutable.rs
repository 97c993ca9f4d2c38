//! Mutable bindings and derived write-back
//!
//! A [`MutableBinding<T>`] is a [`Binding<T>`] that can also be written.
//!
//! # Derived bindings
//!
//! [`MutableBinding::project`] derives a binding for one field of the
//! parent's value:
//!
//! 1. The derived binding starts with the field read from the parent's
//!    current value, held in its own cell.
//! 2. It subscribes to the parent and re-extracts the field on every parent
//!    emission, so replacing the parent's whole value updates it too.
//! 3. Writes are redirected through an ancestor setter that reads the
//!    parent's current value, replaces the field, and sets the parent. The
//!    parent's emission then flows back through step 2, so every write
//!    produces exactly one emission on each side.
//!
//! [`MutableBinding::project_binding`] handles fields that are themselves
//! bindings: the nested subscription is replaced whenever the parent emits,
//! and writes go to whichever nested binding is current.
//!
//! ```ignore
//! #[derive(Clone)]
//! struct Profile { name: String, age: u32 }
//!
//! let profile = MutableBinding::new(Profile { name: "A".into(), age: 1 });
//! let age = profile.project(lens!(Profile, age));
//!
//! age.set(2);
//! assert_eq!(profile.get().age, 2);
//! ```

use std::fmt;
use std::sync::Arc;

use crate::binding::Binding;
use crate::cancellable::AnyCancellable;
use crate::cell::ValueCell;
use crate::decoration::{Decorations, Decorator};
use crate::derive;
use crate::lens::Lens;
use crate::lock;
use crate::stream::{CurrentValue, Subscriber, ValueStream};
use crate::subject::{AnySubject, Subject};
use crate::BindingValue;

type SetFn<T> = Arc<dyn Fn(T) + Send + Sync>;

/// A binding that can be written
pub struct MutableBinding<T> {
    binding: Binding<T>,
    /// Redirects writes to the value this binding was derived from.
    /// Fixed at construction.
    ancestor_setter: Option<SetFn<T>>,
}

impl<T> Clone for MutableBinding<T> {
    fn clone(&self) -> Self {
        Self {
            binding: self.binding.clone(),
            ancestor_setter: self.ancestor_setter.clone(),
        }
    }
}

impl<T: BindingValue> MutableBinding<T> {
    /// A root binding over a fresh cell
    pub fn new(initial: T) -> Self {
        Self::from_cell(ValueCell::new(initial))
    }

    pub fn from_cell(cell: ValueCell<T>) -> Self {
        Self {
            binding: Binding::from_cell(cell),
            ancestor_setter: None,
        }
    }

    /// A binding over a foreign observable property
    ///
    /// Reads go through `getter`; writes go through `setter`, which is
    /// expected to make `subject` emit the new value.
    pub fn from_parts<G, S>(subject: AnySubject<T>, getter: G, setter: S) -> Self
    where
        G: Fn() -> T + Send + Sync + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        Self {
            binding: Binding::from_stream(subject, getter),
            ancestor_setter: Some(Arc::new(setter)),
        }
    }

    fn derived(cell: ValueCell<T>, upstream: AnyCancellable, setter: SetFn<T>) -> Self {
        Self {
            binding: Binding::derived(cell, upstream),
            ancestor_setter: Some(setter),
        }
    }

    pub fn get(&self) -> T {
        self.binding.get()
    }

    /// Write a new value
    ///
    /// Derived bindings write through to their parent and update when the
    /// parent emits; root bindings send into their own channel.
    pub fn set(&self, value: T) {
        match self.ancestor_setter {
            Some(ref setter) => setter(value),
            None => self.binding.subject().send(value),
        }
    }

    /// Modify the current value in place and write it back
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut value = self.get();
        f(&mut value);
        self.set(value);
    }

    /// Whether writes are redirected to an ancestor
    pub fn is_derived(&self) -> bool {
        self.ancestor_setter.is_some()
    }

    /// Derive a writable binding of the field `lens` focuses on
    pub fn project<U: BindingValue>(&self, lens: Lens<T, U>) -> MutableBinding<U> {
        let extract = lens.clone();
        let (cell, upstream) = derive::mirror(self, move |value: &T| extract.get(value));

        let parent = self.clone();
        let setter = move |leaf: U| {
            let root = parent.get();
            parent.set(lens.with(&root, leaf));
        };
        MutableBinding::derived(cell, upstream, Arc::new(setter))
    }

    /// Derive a writable binding from a field that is itself a mutable binding
    ///
    /// Writes go to the nested binding selected from the parent's latest
    /// value.
    pub fn project_binding<U, F>(&self, select: F) -> MutableBinding<U>
    where
        U: BindingValue,
        F: Fn(&T) -> MutableBinding<U> + Send + Sync + 'static,
    {
        let followed = derive::follow(self, select);
        let active = followed.active;
        let setter = move |value: U| {
            // Released before writing; the write may re-enter the parent
            let target = lock(&active).clone();
            target.set(value);
        };
        MutableBinding::derived(followed.cell, followed.upstream, Arc::new(setter))
    }

    /// Derive a read-only binding of `f` of this value
    pub fn map<U, F>(&self, f: F) -> Binding<U>
    where
        U: BindingValue,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        self.binding.map(f)
    }

    /// The read-only view of this binding
    pub fn as_binding(&self) -> Binding<T> {
        self.binding.clone()
    }

    /// Apply `decorations` to the stream; writes are unaffected
    pub fn decorated(&self, decorations: Decorations) -> MutableBinding<T>
    where
        T: PartialEq,
    {
        self.decorated_with(&Decorator::new(decorations).with_equality())
    }

    pub fn decorated_without_equality(&self, decorations: Decorations) -> MutableBinding<T> {
        self.decorated_with(&Decorator::new(decorations))
    }

    pub fn decorated_with(&self, decorator: &Decorator<T>) -> MutableBinding<T> {
        Self {
            binding: self.binding.decorated_with(decorator),
            ancestor_setter: self.ancestor_setter.clone(),
        }
    }
}

impl<T: BindingValue> ValueStream<T> for MutableBinding<T> {
    fn subscribe_with(&self, subscriber: Subscriber<T>) -> AnyCancellable {
        self.binding.subscribe_with(subscriber)
    }
}

impl<T: BindingValue> CurrentValue<T> for MutableBinding<T> {
    fn current_value(&self) -> T {
        self.get()
    }
}

impl<T: BindingValue> From<MutableBinding<T>> for Binding<T> {
    fn from(binding: MutableBinding<T>) -> Self {
        binding.binding
    }
}

impl<T> fmt::Debug for MutableBinding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableBinding")
            .field("binding", &self.binding)
            .field("derived", &self.ancestor_setter.is_some())
            .finish()
    }
}
