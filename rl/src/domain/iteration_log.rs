//! IterationRecord domain type
//!
//! Immutable record of a single loop pass, appended to the spec document's
//! `## Iteration Log` section.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// How a pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationOutcome {
    /// Task finished on the first attempt
    Success,
    /// Task finished after one or more self-heal retries
    Partial,
    /// Unfixable error; task blocked without retrying
    Blocked,
    /// Self-heal attempts exhausted; task blocked
    Failed,
}

impl IterationOutcome {
    /// Whether the pass counts as a success for the consecutive-failure counter
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::Partial)
    }
}

impl fmt::Display for IterationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Blocked => "blocked",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Record of a single loop pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Sequence number (1-indexed, equals the spec's iteration_count after the pass)
    pub sequence: u32,

    /// Task reference, e.g. `2.1`
    pub task_ref: String,

    /// Task label at the time of the pass
    pub task_label: String,

    pub outcome: IterationOutcome,

    /// Agent attempts made during the pass
    pub attempts: u32,

    /// Files changed in the working directory (from git status)
    pub files_changed: Vec<String>,

    /// Quality gate summary, e.g. `2/3 gates passed`
    pub test_summary: String,

    /// First learning reported by the agent, if any
    pub learning: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl IterationRecord {
    /// Create a new IterationRecord
    pub fn new(sequence: u32, task_ref: impl Into<String>, task_label: impl Into<String>) -> Self {
        let task_ref = task_ref.into();
        debug!(sequence, %task_ref, "IterationRecord::new: called");
        Self {
            sequence,
            task_ref,
            task_label: task_label.into(),
            outcome: IterationOutcome::Success,
            attempts: 1,
            files_changed: Vec::new(),
            test_summary: String::new(),
            learning: None,
            created_at: Utc::now(),
        }
    }

    /// Builder: set outcome and number of attempts
    pub fn with_outcome(mut self, outcome: IterationOutcome, attempts: u32) -> Self {
        debug!(sequence = self.sequence, %outcome, attempts, "IterationRecord::with_outcome");
        self.outcome = outcome;
        self.attempts = attempts;
        self
    }

    /// Builder: set files changed
    pub fn with_files_changed(mut self, files: Vec<String>) -> Self {
        debug!(sequence = self.sequence, num_files = files.len(), "IterationRecord::with_files_changed");
        self.files_changed = files;
        self
    }

    /// Builder: set quality gate summary
    pub fn with_test_summary(mut self, summary: impl Into<String>) -> Self {
        self.test_summary = summary.into();
        self
    }

    /// Builder: set learning
    pub fn with_learning(mut self, learning: Option<String>) -> Self {
        self.learning = learning;
        self
    }

    /// Render as a Markdown block for the iteration log
    pub fn to_markdown(&self) -> String {
        let files = if self.files_changed.is_empty() {
            "none".to_string()
        } else {
            self.files_changed.join(", ")
        };
        let tests = if self.test_summary.is_empty() {
            "none"
        } else {
            self.test_summary.as_str()
        };
        format!(
            "### Iteration {}\n\
             - task: {} {}\n\
             - outcome: {}\n\
             - attempts: {}\n\
             - files: {}\n\
             - tests: {}\n\
             - learning: {}\n\
             - at: {}\n",
            self.sequence,
            self.task_ref,
            self.task_label,
            self.outcome,
            self.attempts,
            files,
            tests,
            self.learning.as_deref().unwrap_or("none"),
            self.created_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_record_new() {
        let record = IterationRecord::new(1, "2.1", "write parser");
        assert_eq!(record.sequence, 1);
        assert_eq!(record.task_ref, "2.1");
        assert_eq!(record.outcome, IterationOutcome::Success);
        assert_eq!(record.attempts, 1);
        assert!(record.files_changed.is_empty());
    }

    #[test]
    fn test_iteration_record_markdown() {
        let record = IterationRecord::new(3, "1", "login form")
            .with_outcome(IterationOutcome::Partial, 2)
            .with_files_changed(vec!["src/a.rs".to_string(), "src/b.rs".to_string()])
            .with_test_summary("2/2 gates passed")
            .with_learning(Some("forms need csrf tokens".to_string()));

        let md = record.to_markdown();
        assert!(md.starts_with("### Iteration 3\n"));
        assert!(md.contains("- task: 1 login form\n"));
        assert!(md.contains("- outcome: partial\n"));
        assert!(md.contains("- attempts: 2\n"));
        assert!(md.contains("- files: src/a.rs, src/b.rs\n"));
        assert!(md.contains("- tests: 2/2 gates passed\n"));
        assert!(md.contains("- learning: forms need csrf tokens\n"));
    }

    #[test]
    fn test_iteration_record_markdown_empty_fields() {
        let md = IterationRecord::new(1, "1", "x").to_markdown();
        assert!(md.contains("- files: none\n"));
        assert!(md.contains("- tests: none\n"));
        assert!(md.contains("- learning: none\n"));
    }

    #[test]
    fn test_outcome_is_success() {
        assert!(IterationOutcome::Success.is_success());
        assert!(IterationOutcome::Partial.is_success());
        assert!(!IterationOutcome::Blocked.is_success());
        assert!(!IterationOutcome::Failed.is_success());
    }

    #[test]
    fn test_iteration_record_serde() {
        let record = IterationRecord::new(2, "1.1", "a").with_outcome(IterationOutcome::Blocked, 1);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"outcome\":\"blocked\""));
        let back: IterationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.outcome, IterationOutcome::Blocked);
    }
}
