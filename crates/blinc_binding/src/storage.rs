//! Cancellable storage
//!
//! A [`CancellableStore`] keeps subscription handles alive for as long as its
//! owner lives, grouped by [`ScopeId`] and [`StoreKey`].
//!
//! # Replace semantics
//!
//! Storing a handle under a key that is already occupied (in the same scope)
//! cancels the previous handle before the store returns.
//!
//! # Collection scopes
//!
//! [`CancellableStore::collect`] makes a fresh store current for the duration
//! of a block. Everything stored into the current store inside the block is
//! gathered into one composite handle, which is then stored under the given
//! key in the original store:
//!
//! ```ignore
//! let store = CancellableStore::new();
//! store.collect("header", || {
//!     title.subscribe(|t| label.set_text(t)).store();
//!     subtitle.subscribe(|t| sub.set_text(t)).store();
//! });
//!
//! // Cancels both subscriptions
//! store.cancel_scope(&ScopeId::ROOT);
//! ```
//!
//! The current store is tracked per thread. With no enclosing scope, handles
//! fall back to a permanent store that is never released, and a warning is
//! logged.

use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex};

use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashMap};

use crate::cancellable::AnyCancellable;
use crate::diagnostics;
use crate::lock;

/// Identifies a group of handles within one store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeId(Cow<'static, str>);

impl ScopeId {
    /// The scope used when none is given
    pub const ROOT: ScopeId = ScopeId(Cow::Borrowed(""));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for ScopeId {
    fn from(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }
}

impl From<String> for ScopeId {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

/// Key of a handle within a scope
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreKey {
    Named(Cow<'static, str>),
    /// Generated by [`CancellableStore::store_anonymous`]
    Anonymous(u64),
}

impl From<&'static str> for StoreKey {
    fn from(name: &'static str) -> Self {
        StoreKey::Named(Cow::Borrowed(name))
    }
}

impl From<String> for StoreKey {
    fn from(name: String) -> Self {
        StoreKey::Named(Cow::Owned(name))
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKey::Named(name) => f.write_str(name),
            StoreKey::Anonymous(id) => write!(f, "#{id}"),
        }
    }
}

/// A stored handle and when it was stored
struct Slot {
    seq: u64,
    handle: AnyCancellable,
}

type Scope = IndexMap<StoreKey, Slot, FxBuildHasher>;

struct StoreInner {
    scopes: Mutex<FxHashMap<ScopeId, Scope>>,
    next_seq: AtomicU64,
    next_anonymous: AtomicU64,
    permanent: bool,
}

/// Cancel newest first
fn cancel_in_reverse(mut slots: Vec<Slot>) {
    slots.sort_unstable_by(|a, b| b.seq.cmp(&a.seq));
    for slot in slots {
        slot.handle.cancel();
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        let scopes = std::mem::take(
            self.scopes
                .get_mut()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );
        let slots: Vec<Slot> = scopes.into_values().flat_map(|scope| scope.into_values()).collect();
        if !slots.is_empty() {
            tracing::debug!(handles = slots.len(), "CancellableStore: released");
        }
        cancel_in_reverse(slots);
    }
}

thread_local! {
    static STORE_STACK: RefCell<Vec<CancellableStore>> = const { RefCell::new(Vec::new()) };
}

static FALLBACK: LazyLock<CancellableStore> = LazyLock::new(|| CancellableStore {
    inner: Arc::new(StoreInner {
        scopes: Mutex::new(FxHashMap::default()),
        next_seq: AtomicU64::new(0),
        next_anonymous: AtomicU64::new(0),
        permanent: true,
    }),
});

/// Pops the store stack when a scope ends, including by panic
struct StackGuard;

impl Drop for StackGuard {
    fn drop(&mut self) {
        STORE_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Keyed, scoped collection of subscription handles
///
/// Cloning shares the same store. When the last clone is dropped every held
/// handle is cancelled, newest first.
#[derive(Clone)]
pub struct CancellableStore {
    inner: Arc<StoreInner>,
}

impl CancellableStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                scopes: Mutex::new(FxHashMap::default()),
                next_seq: AtomicU64::new(0),
                next_anonymous: AtomicU64::new(0),
                permanent: false,
            }),
        }
    }

    /// The innermost store entered on this thread, or the permanent fallback
    pub fn current() -> CancellableStore {
        STORE_STACK
            .with(|stack| stack.borrow().last().cloned())
            .unwrap_or_else(|| FALLBACK.clone())
    }

    /// Make `store` current on this thread while `block` runs
    pub fn enter<R>(store: &CancellableStore, block: impl FnOnce() -> R) -> R {
        STORE_STACK.with(|stack| stack.borrow_mut().push(store.clone()));
        let _guard = StackGuard;
        block()
    }

    /// Whether this is the never-released fallback store
    pub fn is_permanent(&self) -> bool {
        self.inner.permanent
    }

    /// Store `handle` under `key` in the root scope
    pub fn store(&self, key: impl Into<StoreKey>, handle: AnyCancellable) {
        self.store_in(ScopeId::ROOT, key, handle);
    }

    /// Store `handle` under `key` in `scope`, cancelling any previous handle
    /// stored there
    pub fn store_in(&self, scope: ScopeId, key: impl Into<StoreKey>, handle: AnyCancellable) {
        let key = key.into();
        if self.inner.permanent {
            diagnostics::unscoped_store(&key);
        }

        let slot = Slot {
            seq: self.inner.next_seq.fetch_add(1, Ordering::Relaxed),
            handle,
        };
        let previous = {
            let mut scopes = lock(&self.inner.scopes);
            let entries = scopes.entry(scope).or_default();
            // Re-inserting moves the key to the end so iteration stays in
            // store order
            let previous = entries.shift_remove(&key);
            entries.insert(key, slot);
            previous
        };
        if let Some(previous) = previous {
            tracing::trace!("CancellableStore: replacing stored handle");
            previous.handle.cancel();
        }
    }

    /// Store `handle` under a freshly generated key in the root scope
    pub fn store_anonymous(&self, handle: AnyCancellable) -> StoreKey {
        let key = StoreKey::Anonymous(self.inner.next_anonymous.fetch_add(1, Ordering::Relaxed));
        self.store(key.clone(), handle);
        key
    }

    /// Detach the handle under `key` in the root scope without cancelling it
    pub fn remove(&self, key: impl Into<StoreKey>) -> Option<AnyCancellable> {
        self.remove_from(&ScopeId::ROOT, key)
    }

    /// Detach the handle under `key` in `scope` without cancelling it
    pub fn remove_from(&self, scope: &ScopeId, key: impl Into<StoreKey>) -> Option<AnyCancellable> {
        let key = key.into();
        let mut scopes = lock(&self.inner.scopes);
        let entries = scopes.get_mut(scope)?;
        let slot = entries.shift_remove(&key)?;
        if entries.is_empty() {
            scopes.remove(scope);
        }
        Some(slot.handle)
    }

    /// Cancel and drop every handle in `scope`
    pub fn cancel_scope(&self, scope: &ScopeId) {
        let entries = lock(&self.inner.scopes).remove(scope);
        if let Some(entries) = entries {
            cancel_in_reverse(entries.into_values().collect());
        }
    }

    /// Cancel and drop every handle in every scope
    pub fn cancel_all(&self) {
        cancel_in_reverse(self.take_all());
    }

    /// Total number of stored handles
    pub fn len(&self) -> usize {
        lock(&self.inner.scopes).values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the root scope has a handle under `key`
    pub fn contains(&self, key: impl Into<StoreKey>) -> bool {
        self.contains_in(&ScopeId::ROOT, key)
    }

    pub fn contains_in(&self, scope: &ScopeId, key: impl Into<StoreKey>) -> bool {
        let key = key.into();
        lock(&self.inner.scopes)
            .get(scope)
            .is_some_and(|entries| entries.contains_key(&key))
    }

    /// Gather every handle stored while `block` runs into one composite
    /// handle kept under `key`
    ///
    /// A fresh store is current during `block`. Afterwards its handles are
    /// combined (cancelling the composite cancels them in store order) and the
    /// composite replaces whatever `self` held under `key`.
    pub fn collect<R>(&self, key: impl Into<StoreKey>, block: impl FnOnce() -> R) -> R {
        let nested = CancellableStore::new();
        let result = CancellableStore::enter(&nested, block);

        let mut slots = nested.take_all();
        slots.sort_unstable_by_key(|slot| slot.seq);
        let count = slots.len();
        let composite = AnyCancellable::union(slots.into_iter().map(|slot| slot.handle));

        let key = key.into();
        tracing::trace!(%key, handles = count, "CancellableStore: collected scope");
        self.store(key, composite);
        result
    }

    /// Tie the handle produced by `block`, and anything stored while it runs,
    /// to `key`
    pub fn with_scope(&self, key: impl Into<StoreKey>, block: impl FnOnce() -> AnyCancellable) {
        self.collect(key, || {
            block().store();
        });
    }

    fn take_all(&self) -> Vec<Slot> {
        let scopes = std::mem::take(&mut *lock(&self.inner.scopes));
        scopes
            .into_values()
            .flat_map(|scope| scope.into_values())
            .collect()
    }
}

impl Default for CancellableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellableStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellableStore")
            .field("len", &self.len())
            .field("permanent", &self.inner.permanent)
            .finish()
    }
}

impl AnyCancellable {
    /// Store into the current store under a generated key
    pub fn store(self) -> StoreKey {
        CancellableStore::current().store_anonymous(self)
    }

    /// Store into the current store under `key`
    pub fn store_with_key(self, key: impl Into<StoreKey>) {
        CancellableStore::current().store(key, self);
    }
}

/// An object whose subscriptions live as long as it does
///
/// ```ignore
/// struct Header { cancellables: CancellableStore, .. }
///
/// impl Owner for Header {
///     fn cancellables(&self) -> &CancellableStore { &self.cancellables }
/// }
///
/// header.with_scope("title", || title.subscribe(|t| println!("{t}")));
/// ```
pub trait Owner {
    fn cancellables(&self) -> &CancellableStore;

    fn store(&self, key: impl Into<StoreKey>, handle: AnyCancellable)
    where
        Self: Sized,
    {
        self.cancellables().store(key, handle);
    }

    fn collect<R>(&self, key: impl Into<StoreKey>, block: impl FnOnce() -> R) -> R
    where
        Self: Sized,
    {
        self.cancellables().collect(key, block)
    }

    fn with_scope(&self, key: impl Into<StoreKey>, block: impl FnOnce() -> AnyCancellable)
    where
        Self: Sized,
    {
        self.cancellables().with_scope(key, block);
    }
}

/// [`Owner::with_scope`], warning if the scope ends up retaining `owner`
pub fn with_checked_scope<O: Owner>(
    owner: &Arc<O>,
    key: impl Into<StoreKey>,
    block: impl FnOnce() -> AnyCancellable,
) {
    let key = key.into();
    let label = key.to_string();
    diagnostics::check_not_retained(owner, &label, || owner.with_scope(key, block));
}
