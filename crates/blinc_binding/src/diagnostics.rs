//! Misuse diagnostics
//!
//! Nothing here is fatal. Each check logs a `tracing` warning and bumps a
//! process-wide counter so tests and debug overlays can notice.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::BindingConfig;
use crate::storage::StoreKey;

static UNSCOPED_STORES: AtomicU64 = AtomicU64::new(0);
static RETAIN_WARNINGS: AtomicU64 = AtomicU64::new(0);

/// Snapshot of diagnostic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticStats {
    /// Handles stored with no enclosing scope
    pub unscoped_stores: u64,
    /// Scoped blocks that retained their owner
    pub retain_warnings: u64,
}

pub fn stats() -> DiagnosticStats {
    DiagnosticStats {
        unscoped_stores: UNSCOPED_STORES.load(Ordering::Relaxed),
        retain_warnings: RETAIN_WARNINGS.load(Ordering::Relaxed),
    }
}

/// Record a store into the permanent fallback store
pub fn unscoped_store(key: &StoreKey) {
    UNSCOPED_STORES.fetch_add(1, Ordering::Relaxed);
    if BindingConfig::current().diagnostics.warn_unscoped_store {
        tracing::warn!(
            %key,
            "subscription stored outside any scope; it will never be released"
        );
    }
}

/// Run `block`, warning if it leaves `owner` with more strong references
///
/// A closure created inside `block` that captures `owner` strongly and is then
/// kept by a subscription usually means a reference cycle through the owner's
/// own store.
pub fn check_not_retained<O, R>(owner: &Arc<O>, label: &str, block: impl FnOnce() -> R) -> R
where
    O: ?Sized,
{
    if !BindingConfig::current().diagnostics.retain_check {
        return block();
    }

    let before = Arc::strong_count(owner);
    let result = block();
    let after = Arc::strong_count(owner);
    if after > before {
        RETAIN_WARNINGS.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            label,
            before,
            after,
            owner_type = std::any::type_name::<O>(),
            "scoped block retained its owner; likely reference cycle"
        );
    }
    result
}
