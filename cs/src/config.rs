//! Configuration for contextstore

use eyre::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::store::ContextCategory;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Path to the context store file
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Per-category entry ceilings
    #[serde(default)]
    pub limits: CategoryLimits,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(crate::DEFAULT_STORE_PATH)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            limits: CategoryLimits::default(),
        }
    }
}

impl Config {
    /// Load config from file, or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = serde_yaml::from_str(&content)?;
            return Ok(config);
        }

        // Try default locations
        let default_paths = [
            Some(PathBuf::from("contextstore.yml")),
            dirs::config_dir().map(|p| p.join("contextstore").join("config.yml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let config: Config = serde_yaml::from_str(&content)?;
                return Ok(config);
            }
        }

        Ok(Config::default())
    }
}

/// Maximum number of entries kept per category
///
/// Pruning keeps the newest entries of each category and evicts the oldest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CategoryLimits {
    pub learning: usize,
    pub error_fix: usize,
    pub pattern: usize,
    pub discovery: usize,
    pub gotcha: usize,
    pub fix: usize,
}

impl Default for CategoryLimits {
    fn default() -> Self {
        Self {
            learning: 50,
            error_fix: 20,
            pattern: 30,
            discovery: 30,
            gotcha: 30,
            fix: 20,
        }
    }
}

impl CategoryLimits {
    /// Same ceiling for every category
    pub fn uniform(limit: usize) -> Self {
        Self {
            learning: limit,
            error_fix: limit,
            pattern: limit,
            discovery: limit,
            gotcha: limit,
            fix: limit,
        }
    }

    /// Ceiling for a single category
    pub fn limit_for(&self, category: ContextCategory) -> usize {
        match category {
            ContextCategory::Learning => self.learning,
            ContextCategory::ErrorFix => self.error_fix,
            ContextCategory::Pattern => self.pattern,
            ContextCategory::Discovery => self.discovery,
            ContextCategory::Gotcha => self.gotcha,
            ContextCategory::Fix => self.fix,
        }
    }
}
