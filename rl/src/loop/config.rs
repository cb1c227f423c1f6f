//! Loop configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::heal::DEFAULT_UNFIXABLE_PATTERNS;

/// Limits and pacing for the iteration loop (from YAML)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoopConfig {
    /// Maximum loop passes per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Pause between passes in seconds
    #[serde(default = "default_iteration_delay_secs")]
    pub iteration_delay_secs: u64,

    /// Bound on one attempt (agent plus gates) in seconds
    #[serde(default = "default_iteration_timeout_secs")]
    pub iteration_timeout_secs: u64,

    /// Passes in a row ending blocked/failed before the run stops
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Self-heal attempts per task
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff base in seconds, doubled per retry
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,

    /// Case-insensitive regexes marking an error as unfixable
    #[serde(default = "default_unfixable_patterns")]
    pub unfixable_patterns: Vec<String>,
}

fn default_max_iterations() -> u32 {
    debug!("default_max_iterations: called");
    50
}

fn default_iteration_delay_secs() -> u64 {
    debug!("default_iteration_delay_secs: called");
    3
}

fn default_iteration_timeout_secs() -> u64 {
    debug!("default_iteration_timeout_secs: called");
    600 // 10 minutes
}

fn default_max_consecutive_failures() -> u32 {
    debug!("default_max_consecutive_failures: called");
    3
}

fn default_max_attempts() -> u32 {
    debug!("default_max_attempts: called");
    3
}

fn default_retry_backoff_secs() -> u64 {
    debug!("default_retry_backoff_secs: called");
    2
}

fn default_unfixable_patterns() -> Vec<String> {
    DEFAULT_UNFIXABLE_PATTERNS.iter().map(|p| p.to_string()).collect()
}

impl Default for LoopConfig {
    fn default() -> Self {
        debug!("LoopConfig::default: called");
        Self {
            max_iterations: default_max_iterations(),
            iteration_delay_secs: default_iteration_delay_secs(),
            iteration_timeout_secs: default_iteration_timeout_secs(),
            max_consecutive_failures: default_max_consecutive_failures(),
            max_attempts: default_max_attempts(),
            retry_backoff_secs: default_retry_backoff_secs(),
            unfixable_patterns: default_unfixable_patterns(),
        }
    }
}

impl LoopConfig {
    pub fn iteration_delay(&self) -> Duration {
        Duration::from_secs(self.iteration_delay_secs)
    }

    pub fn iteration_timeout(&self) -> Duration {
        Duration::from_secs(self.iteration_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}
