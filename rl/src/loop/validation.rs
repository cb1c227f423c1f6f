//! Quality gate execution
//!
//! Gates are opaque shell commands; only exit status and output matter.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agent::{describe_signal, exit_signal, truncate_tail};

/// Output characters kept per failed gate when reporting errors
const MAX_GATE_OUTPUT_CHARS: usize = 2000;

/// Kind of validation a gate performs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateCategory {
    Lint,
    Typecheck,
    #[default]
    Test,
    Build,
}

impl fmt::Display for GateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Lint => "lint",
            Self::Typecheck => "typecheck",
            Self::Test => "test",
            Self::Build => "build",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for GateCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lint" => Ok(Self::Lint),
            "typecheck" | "types" => Ok(Self::Typecheck),
            "test" | "tests" => Ok(Self::Test),
            "build" => Ok(Self::Build),
            _ => Err(format!("Unknown gate category: {}. Use: lint, typecheck, test, build", s)),
        }
    }
}

/// A named validation command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct QualityGate {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub category: GateCategory,

    pub command: String,
}

impl QualityGate {
    pub fn new(name: impl Into<String>, category: GateCategory, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category,
            command: command.into(),
        }
    }

    /// Display name, falling back to the command itself
    pub fn label(&self) -> &str {
        if self.name.is_empty() { &self.command } else { &self.name }
    }
}

/// Parses `--gate` values: `category=command` or a bare command (a test gate)
impl FromStr for QualityGate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("Gate command cannot be empty".to_string());
        }
        if let Some((prefix, command)) = s.split_once('=')
            && let Ok(category) = prefix.parse::<GateCategory>()
        {
            let command = command.trim();
            if command.is_empty() {
                return Err(format!("Gate '{}' has no command", prefix));
            }
            return Ok(Self::new(category.to_string(), category, command));
        }
        Ok(Self::new("", GateCategory::Test, s))
    }
}

/// Result of running one gate
#[derive(Debug, Clone, Serialize)]
pub struct GateResult {
    pub name: String,

    pub category: GateCategory,

    /// Exit code; -1 when the gate could not be spawned or timed out
    pub exit_code: i32,

    pub stdout: String,

    pub stderr: String,

    pub duration_ms: u64,
}

impl GateResult {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }

    fn output(&self) -> &str {
        if !self.stderr.trim().is_empty() { &self.stderr } else { &self.stdout }
    }
}

/// Outcome of a full gate run
#[derive(Debug, Clone, Serialize)]
pub struct GateReport {
    /// True when every gate passed (vacuously true with no gates)
    pub passed: bool,

    pub results: Vec<GateResult>,
}

impl GateReport {
    /// One-line summary for the iteration log
    pub fn summary(&self) -> String {
        if self.results.is_empty() {
            return "no gates configured".to_string();
        }
        let passed = self.results.iter().filter(|r| r.passed()).count();
        format!("{}/{} gates passed", passed, self.results.len())
    }

    /// Error text built from every failed gate, for injection into a retry
    pub fn failure_text(&self) -> String {
        self.results
            .iter()
            .filter(|r| !r.passed())
            .map(|r| {
                format!(
                    "gate '{}' ({}) failed with exit code {}:\n{}",
                    r.name,
                    r.category,
                    r.exit_code,
                    truncate_tail(r.output().trim(), MAX_GATE_OUTPUT_CHARS)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Run one gate command in `dir`
///
/// Never fails: spawn errors and timeouts become a result with exit code -1
/// and the problem described in stderr.
pub async fn run_gate(gate: &QualityGate, dir: &Path, timeout: Duration) -> GateResult {
    debug!(gate = %gate.label(), command = %gate.command, ?dir, "run_gate: called");
    let start = Instant::now();

    let child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(&gate.command)
        .current_dir(dir)
        .kill_on_drop(true)
        .output();

    let (exit_code, stdout, stderr) = match tokio::time::timeout(timeout, child).await {
        Ok(Ok(output)) => {
            let mut stderr = String::from_utf8_lossy(&output.stderr).to_string();
            if let Some(signal) = exit_signal(&output.status) {
                warn!(gate = %gate.label(), signal, "Gate terminated by signal");
                if !stderr.is_empty() && !stderr.ends_with('\n') {
                    stderr.push('\n');
                }
                stderr.push_str(&format!("gate {}", describe_signal(signal)));
            }
            (
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stdout).to_string(),
                stderr,
            )
        }
        Ok(Err(e)) => {
            warn!(gate = %gate.label(), error = %e, "Failed to spawn gate");
            (-1, String::new(), format!("failed to spawn gate: {}", e))
        }
        Err(_) => {
            warn!(gate = %gate.label(), ?timeout, "Gate timed out");
            (-1, String::new(), format!("gate timed out after {}s", timeout.as_secs()))
        }
    };

    GateResult {
        name: gate.label().to_string(),
        category: gate.category,
        exit_code,
        stdout,
        stderr,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

/// Run every gate sequentially, continuing past failures
pub async fn run_gates(gates: &[QualityGate], dir: &Path, timeout: Duration) -> GateReport {
    debug!(count = gates.len(), ?dir, "run_gates: called");
    let mut results = Vec::with_capacity(gates.len());
    for gate in gates {
        let result = run_gate(gate, dir, timeout).await;
        debug!(gate = %result.name, exit_code = result.exit_code, "run_gates: gate finished");
        results.push(result);
    }

    let report = GateReport {
        passed: results.iter().all(GateResult::passed),
        results,
    };
    info!(summary = %report.summary(), "Quality gates finished");
    report
}
