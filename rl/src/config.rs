//! ralphloop configuration types and loading

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::r#loop::{LoopConfig, QualityGate};

/// Main ralphloop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub log_level: Option<String>,

    /// Directory holding one `<name>/spec.md` per feature
    pub specs_dir: PathBuf,

    /// Coding agent command
    pub agent: AgentConfig,

    /// Loop limits and pacing
    #[serde(rename = "loop")]
    pub loop_config: LoopConfig,

    /// Quality gates run after every successful agent invocation
    pub gates: Vec<QualityGate>,

    /// Context store location and limits
    pub context: contextstore::config::Config,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: None,
            specs_dir: PathBuf::from("specs"),
            agent: AgentConfig::default(),
            loop_config: LoopConfig::default(),
            gates: Vec::new(),
            context: contextstore::config::Config::default(),
        }
    }
}

/// Environment variables that override loop settings
pub const ENV_MAX_ITERATIONS: &str = "MAX_ITERATIONS";
pub const ENV_ITERATION_DELAY: &str = "ITERATION_DELAY";
pub const ENV_MAX_RETRIES: &str = "MAX_RETRIES";
pub const ENV_RETRY_BACKOFF: &str = "RETRY_BACKOFF";
pub const ENV_ITERATION_TIMEOUT: &str = "ITERATION_TIMEOUT";
pub const ENV_MAX_CONSECUTIVE_FAILURES: &str = "MAX_CONSECUTIVE_FAILURES";

impl Config {
    /// Load configuration with fallback chain
    ///
    /// Checks in order:
    /// 1. Explicit `--config` path (errors are fatal)
    /// 2. `./.ralphloop.yml`
    /// 3. `~/.config/ralphloop/ralphloop.yml`
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::default_paths() {
            if candidate.exists() {
                match Self::load_from_file(&candidate) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialized
    ///
    /// Silent on every failure; the full load reports problems later.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => Self::default_paths(),
        };
        candidates
            .into_iter()
            .find(|p| p.exists())
            .and_then(|p| fs::read_to_string(p).ok())
            .and_then(|content| serde_yaml::from_str::<Self>(&content).ok())
            .and_then(|config| config.log_level)
    }

    fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".ralphloop.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("ralphloop").join("ralphloop.yml"));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Apply loop overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply loop overrides from an arbitrary variable lookup
    ///
    /// A set but unparseable value is an error, not a silent default.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lc = &mut self.loop_config;
        if let Some(v) = parse_override(&lookup, ENV_MAX_ITERATIONS)? {
            lc.max_iterations = v;
        }
        if let Some(v) = parse_override(&lookup, ENV_ITERATION_DELAY)? {
            lc.iteration_delay_secs = v;
        }
        if let Some(v) = parse_override(&lookup, ENV_MAX_RETRIES)? {
            lc.max_attempts = v;
        }
        if let Some(v) = parse_override(&lookup, ENV_RETRY_BACKOFF)? {
            lc.retry_backoff_secs = v;
        }
        if let Some(v) = parse_override(&lookup, ENV_ITERATION_TIMEOUT)? {
            lc.iteration_timeout_secs = v;
        }
        if let Some(v) = parse_override(&lookup, ENV_MAX_CONSECUTIVE_FAILURES)? {
            lc.max_consecutive_failures = v;
        }
        debug!(loop_config = ?self.loop_config, "Config::apply_overrides_from: applied");
        Ok(())
    }
}

fn parse_override<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| eyre!("Invalid value for {}: '{}' ({})", key, raw, e)),
    }
}

/// External coding agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Executable to run
    pub command: String,

    /// Arguments passed before the prompt is written to stdin
    pub args: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            args: vec!["-p".to_string()],
        }
    }
}
