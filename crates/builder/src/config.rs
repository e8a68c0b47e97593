use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::model::OpsetRegistry;
use crate::Result;

/// Builder-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Opsets used when a caller does not name its own
    pub default_opsets: BTreeMap<String, i64>,

    /// Patch merging
    pub merge: MergeConfig,

    /// Reference session
    pub session: SessionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Accept initializers flagged as overrides of base initializers
    pub allow_initializer_override: bool,
    /// Reject patch nodes whose domain has no registered opset
    pub require_registered_domains: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Reject run inputs whose dims contradict the declared input shape
    pub check_declared_shapes: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            default_opsets: BTreeMap::from([(String::new(), 18)]),
            merge: MergeConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            allow_initializer_override: true,
            require_registered_domains: true,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            check_declared_shapes: true,
        }
    }
}

impl BuilderConfig {
    /// Load config from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BuilderConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save config to a file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Registry built from `default_opsets`
    pub fn default_registry(&self) -> Result<OpsetRegistry> {
        OpsetRegistry::new(self.default_opsets.iter().map(|(d, &v)| (d.as_str(), v)))
    }
}
