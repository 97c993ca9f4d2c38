//! Blinc Binding Core
//!
//! Observable values, derived bindings, and scoped subscription lifetimes for
//! the Blinc view layer.
//!
//! # Overview
//!
//! - [`ValueCell`]: a mutable holder that broadcasts every change
//! - [`Binding`] / [`MutableBinding`]: read-only and writable views over a
//!   channel; derived bindings project a field out of a parent and write
//!   changes back up through it
//! - [`Decorations`]: duplicate suppression and primary-thread delivery
//! - [`CancellableStore`]: groups subscriptions by key and scope and releases
//!   them as a unit
//!
//! # Example
//!
//! ```ignore
//! use blinc_binding::prelude::*;
//!
//! #[derive(Clone, PartialEq)]
//! struct Profile { name: String, age: u32 }
//!
//! let profile = MutableBinding::new(Profile { name: "A".into(), age: 1 });
//! let age = profile.project(lens!(Profile, age));
//!
//! let store = CancellableStore::new();
//! store.store("age-label", age.subscribe(|age| println!("age = {age}")));
//!
//! age.set(2);
//! assert_eq!(profile.get().age, 2);
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod binding;
pub mod cancellable;
pub mod cell;
pub mod config;
pub mod decoration;
mod derive;
pub mod diagnostics;
pub mod dispatch;
pub mod error;
pub mod lens;
pub mod mutable;
pub mod storage;
pub mod stream;
pub mod subject;

pub use binding::Binding;
pub use cancellable::AnyCancellable;
pub use cell::{SubscriberId, ValueCell, WeakValueCell};
pub use config::BindingConfig;
pub use decoration::{Decorations, Decorator};
pub use dispatch::PrimaryQueue;
pub use error::{BindingError, Result};
pub use lens::Lens;
pub use mutable::MutableBinding;
pub use storage::{CancellableStore, Owner, ScopeId, StoreKey};
pub use stream::{CurrentValue, Subscriber, ValueStream};
pub use subject::{AnySubject, Subject};

/// Values that can flow through a binding
///
/// Blanket-implemented for every `Clone + Send + 'static` type.
pub trait BindingValue: Clone + Send + 'static {}

impl<T: Clone + Send + 'static> BindingValue for T {}

/// Lock a mutex, recovering the data if a subscriber panicked while holding it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::binding::Binding;
    pub use crate::cancellable::AnyCancellable;
    pub use crate::cell::ValueCell;
    pub use crate::decoration::Decorations;
    pub use crate::dispatch::PrimaryQueue;
    pub use crate::lens;
    pub use crate::lens::Lens;
    pub use crate::mutable::MutableBinding;
    pub use crate::storage::{CancellableStore, Owner, StoreKey};
    pub use crate::stream::{CurrentValue, ValueStream};
    pub use crate::subject::{AnySubject, Subject};
    pub use crate::BindingValue;
}
