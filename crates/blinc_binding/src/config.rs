//! Binding runtime configuration
//!
//! Loaded from a TOML file such as `binding.toml`:
//!
//! ```toml
//! [diagnostics]
//! warn_unscoped_store = true
//! retain_check = true
//!
//! [delivery]
//! inline_on_primary = true
//! ```
//!
//! Every field is optional and defaults to `true`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use crate::error::{BindingError, Result};

static INSTALLED: OnceLock<BindingConfig> = OnceLock::new();

/// Runtime configuration for bindings and storage
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BindingConfig {
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

/// Misuse diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DiagnosticsConfig {
    /// Warn when a handle is stored with no enclosing scope
    #[serde(default = "enabled")]
    pub warn_unscoped_store: bool,
    /// Warn when a scoped block retains its owner
    #[serde(default = "enabled")]
    pub retain_check: bool,
}

/// Primary-thread delivery
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeliveryConfig {
    /// Deliver inline when already on the primary thread with nothing queued
    #[serde(default = "enabled")]
    pub inline_on_primary: bool,
}

fn enabled() -> bool {
    true
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            warn_unscoped_store: true,
            retain_check: true,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            inline_on_primary: true,
        }
    }
}

impl BindingConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| BindingError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "BindingConfig: loaded");
        Ok(config)
    }

    /// Make this the process-wide config
    ///
    /// Must happen before the first [`current`](Self::current) call; the
    /// config cannot change afterwards.
    pub fn install(self) -> Result<()> {
        INSTALLED
            .set(self)
            .map_err(|_| BindingError::ConfigInstalled)
    }

    /// The process-wide config, or the defaults if none was installed
    pub fn current() -> &'static BindingConfig {
        INSTALLED.get_or_init(BindingConfig::default)
    }
}
