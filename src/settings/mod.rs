//! Comparison run settings.
//!
//! A serde-backed settings struct loadable from a TOML file. Defaults cover
//! the common case; validation rejects configurations the pipeline cannot
//! honor before any file is touched.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::matching::MatchStrategy;

/// Default Terraform resource type carrying conditional-access policies.
pub const DEFAULT_RESOURCE_TYPE: &str = "azuread_conditional_access_policy";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid settings: {reason}")]
    Invalid { reason: String },
}

/// Everything a comparison run can be configured with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonSettings {
    /// How source policies are paired with reference candidates.
    pub strategy: MatchStrategy,
    /// Resource type whose blocks/instances become policies.
    pub resource_type: String,
    /// Upper bound on concurrently loading files.
    pub max_parallel_loads: usize,
    /// Report progress every N completed files; the final count is always
    /// reported.
    pub progress_interval: usize,
    /// Whether discovery descends into subdirectories.
    pub recursive_discovery: bool,
}

impl Default for ComparisonSettings {
    fn default() -> Self {
        Self {
            strategy: MatchStrategy::default(),
            resource_type: DEFAULT_RESOURCE_TYPE.to_string(),
            max_parallel_loads: 8,
            progress_interval: 10,
            recursive_discovery: false,
        }
    }
}

impl ComparisonSettings {
    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        let settings: ComparisonSettings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_parallel_loads == 0 {
            return Err(SettingsError::Invalid {
                reason: "max_parallel_loads must be at least 1".to_string(),
            });
        }
        if self.progress_interval == 0 {
            return Err(SettingsError::Invalid {
                reason: "progress_interval must be at least 1".to_string(),
            });
        }
        if self.resource_type.trim().is_empty() {
            return Err(SettingsError::Invalid {
                reason: "resource_type must not be empty".to_string(),
            });
        }
        if let MatchStrategy::SemanticSimilarity { threshold } = &self.strategy {
            if !(*threshold > 0.0 && *threshold <= 1.0) {
                return Err(SettingsError::Invalid {
                    reason: format!(
                        "similarity threshold must be in (0, 1], got {}",
                        threshold
                    ),
                });
            }
        }
        Ok(())
    }
}
