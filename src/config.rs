//! Configuration utilities re-exported at the crate root.
//!
//! This exposes [`DatabaseConfig`] and [`InheritanceConfig`] so applications can
//! load settings from `config/config.toml` or `LINEAGE__*` environment variables
//! using their `load()` constructors.

pub use crate::pool::config::DatabaseConfig;

use crate::pool::config::load_settings;
use config::{Config, ConfigError};
use serde::Deserialize;

/// Tuning for the inheritance engine, read from the `inheritance` section.
#[derive(Debug, Clone, Deserialize)]
pub struct InheritanceConfig {
    /// Deepest ancestor walk accepted before a tree is treated as cyclic.
    #[serde(default = "default_max_tree_depth")]
    pub max_tree_depth: usize,
    /// Propagate bind/unbind/update to descendants.
    #[serde(default = "default_true")]
    pub cascade_enabled: bool,
    /// Emit a `warn!` line for every failed cascade step.
    #[serde(default = "default_true")]
    pub warn_on_cascade_failure: bool,
}

impl Default for InheritanceConfig {
    fn default() -> Self {
        Self {
            max_tree_depth: default_max_tree_depth(),
            cascade_enabled: true,
            warn_on_cascade_failure: true,
        }
    }
}

fn default_max_tree_depth() -> usize {
    32
}

fn default_true() -> bool {
    true
}

impl InheritanceConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_settings(&load_settings()?)
    }

    pub(crate) fn from_settings(settings: &Config) -> Result<Self, ConfigError> {
        let cfg = match settings.get::<InheritanceConfig>("inheritance") {
            Ok(cfg) => cfg,
            Err(ConfigError::NotFound(_)) => Self::default(),
            Err(e) => {
                return Err(ConfigError::Message(format!(
                    "Inheritance configuration could not be loaded: {e}"
                )))
            }
        };
        if cfg.max_tree_depth == 0 {
            return Err(ConfigError::Message(
                "inheritance.max_tree_depth must be at least 1".to_string(),
            ));
        }
        Ok(cfg)
    }
}
