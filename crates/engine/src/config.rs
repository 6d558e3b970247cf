use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EngineError;

/// Order in which an apiary's hives are processed within one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetOrder {
    /// As returned by the store.
    #[default]
    Source,
    /// Stable sort by display name.
    Name,
}

/// How the coordinator decides whether a report already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistenceCheck {
    /// List the hive's reports right before each create.
    #[default]
    PerItem,
    /// List every participating hive once at submit and check against that.
    /// Fewer calls, but the snapshot goes stale while the batch is suspended.
    Snapshot,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    pub target_order: TargetOrder,
    pub existence_check: ExistenceCheck,
}

impl ReportingConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        toml::from_str(contents).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        if !path.exists() {
            debug!(path = %path.display(), "no reporting config, using defaults");
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("failed to read {}: {e}", path.display())))?;
        toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("failed to parse {}: {e}", path.display())))
    }
}
