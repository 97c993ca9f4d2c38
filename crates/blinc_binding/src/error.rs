//! Error types for blinc_binding
//!
//! Value streams never fail. The variants here cover misuse of the
//! primary-thread queue and configuration loading.

use std::path::PathBuf;
use std::thread::ThreadId;

use thiserror::Error;

/// Errors surfaced by the binding runtime
#[derive(Error, Debug)]
pub enum BindingError {
    /// A primary-thread operation was attempted from another thread
    #[error("primary queue drained from {actual:?}, but it is owned by {owner:?}")]
    WrongThread { owner: ThreadId, actual: ThreadId },

    /// `PrimaryQueue::install_global` was called more than once
    #[error("a global primary queue is already installed")]
    PrimaryQueueInstalled,

    /// `BindingConfig::install` was called more than once
    #[error("a binding config is already installed")]
    ConfigInstalled,

    /// Failed to read a config file
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a config file
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// Result type for blinc_binding operations
pub type Result<T> = std::result::Result<T, BindingError>;
