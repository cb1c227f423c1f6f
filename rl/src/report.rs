//! Status and run summary reporting
//!
//! Read-only views over specs on disk, rendered as colored text or JSON.

use std::fmt;
use std::fmt::Write as _;
use std::path::Path;

use colored::*;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{SpecDocument, SpecStatus, Task, TaskState};
use crate::state::SpecRepo;

/// How a `rl run` ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every task is done
    Complete,
    /// Iteration ceiling reached with work left
    MaxIterations,
    /// Nothing selectable is left, or too many passes failed in a row
    Blocked,
    /// Stopped by a signal; rerunning resumes
    Interrupted,
}

impl RunStatus {
    /// Process exit code for this status
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Complete => 0,
            Self::MaxIterations | Self::Blocked => 1,
            Self::Interrupted => 130,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Complete => "complete",
            Self::MaxIterations => "max_iterations",
            Self::Blocked => "blocked",
            Self::Interrupted => "interrupted",
        };
        write!(f, "{}", s)
    }
}

/// Emitted once per `rl run`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationSummary {
    pub run_id: String,

    pub spec: String,

    pub status: RunStatus,

    /// Loop passes made by this run
    pub iterations: u32,

    /// Entries in the context store at exit
    pub learnings: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl IterationSummary {
    pub fn render_text(&self) -> String {
        let status = match self.status {
            RunStatus::Complete => self.status.to_string().green().bold(),
            RunStatus::Interrupted => self.status.to_string().yellow().bold(),
            RunStatus::MaxIterations | RunStatus::Blocked => self.status.to_string().red().bold(),
        };
        let mut out = format!(
            "{} {}\n  iterations: {}\n  learnings:  {}\n  run:        {}\n",
            self.spec.cyan(),
            status,
            self.iterations,
            self.learnings,
            self.run_id.dimmed()
        );
        if let Some(reason) = &self.reason {
            let _ = writeln!(out, "  reason:     {}", reason);
        }
        out
    }
}

/// One row of `rl status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    pub name: String,

    pub status: SpecStatus,

    /// Directory holding the spec document
    pub directory: String,

    pub pending: usize,

    pub completed: usize,

    pub iterations: u32,
}

impl StatusRecord {
    /// Build a record; `directory` is shown relative to `root` when possible
    pub fn from_document(doc: &SpecDocument, root: &Path) -> Self {
        let counts = doc.counts();
        let directory = doc
            .path
            .parent()
            .map(|p| p.strip_prefix(root).unwrap_or(p).display().to_string())
            .unwrap_or_default();
        Self {
            name: doc.name().to_string(),
            status: doc.status(),
            directory,
            pending: counts.pending,
            completed: counts.completed,
            iterations: doc.iteration_count(),
        }
    }
}

/// One record per readable spec, sorted by name
///
/// Specs that fail to parse are skipped with a warning.
pub fn collect_status(repo: &SpecRepo) -> Result<Vec<StatusRecord>> {
    debug!(specs_dir = ?repo.specs_dir(), "collect_status: called");
    let mut records = Vec::new();
    for path in repo.discover()? {
        match SpecDocument::load(&path) {
            Ok(doc) => records.push(StatusRecord::from_document(&doc, repo.root())),
            Err(e) => warn!(?path, error = %e, "Skipping unreadable spec"),
        }
    }
    records.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(records)
}

fn colored_status(status: SpecStatus) -> ColoredString {
    let s = status.to_string();
    match status {
        SpecStatus::Complete => s.green(),
        SpecStatus::Building => s.yellow(),
        SpecStatus::Blocked => s.red(),
        SpecStatus::Pending => s.dimmed(),
    }
}

pub fn render_status_text(records: &[StatusRecord]) -> String {
    if records.is_empty() {
        return "No specs found".to_string();
    }
    let width = records.iter().map(|r| r.name.len()).max().unwrap_or(4).max(4);
    let mut out = format!(
        "{:<width$}  {:<9}  {:>7}  {:>4}  {}\n",
        "NAME",
        "STATUS",
        "DONE",
        "ITER",
        "DIRECTORY",
        width = width
    );
    for r in records {
        let done = format!("{}/{}", r.completed, r.completed + r.pending);
        // Pad before coloring so escape codes don't break alignment
        let status = colored_status(r.status);
        let pad = 9usize.saturating_sub(r.status.to_string().len());
        let _ = writeln!(
            out,
            "{}  {}{}  {:>7}  {:>4}  {}",
            format!("{:<width$}", r.name, width = width).cyan(),
            status,
            " ".repeat(pad),
            done,
            r.iterations,
            r.directory.dimmed(),
        );
    }
    out
}

/// Task tree, counts and continuation marker of one spec
pub fn render_tasks(doc: &SpecDocument) -> String {
    let counts = doc.counts();
    let mut out = format!(
        "{} ({}) {}/{} done\n",
        doc.name().cyan().bold(),
        colored_status(doc.status()),
        counts.completed,
        counts.total
    );
    for (i, task) in doc.tasks().iter().enumerate() {
        write_task(&mut out, &(i + 1).to_string(), task, 1);
        for (j, child) in task.children.iter().enumerate() {
            write_task(&mut out, &format!("{}.{}", i + 1, j + 1), child, 2);
        }
    }
    match doc.continuation() {
        Some(note) => {
            let _ = writeln!(out, "\ncontinuation: {}", note);
        }
        None => out.push_str("\ncontinuation: none\n"),
    }
    out
}

fn write_task(out: &mut String, task_ref: &str, task: &Task, depth: usize) {
    let marker = format!("[{}]", task.state.marker());
    let marker = match task.state {
        TaskState::Done => marker.green(),
        TaskState::InProgress => marker.yellow(),
        TaskState::Blocked => marker.red(),
        TaskState::Pending => marker.normal(),
    };
    let _ = writeln!(out, "{}{} {:<5} {}", "  ".repeat(depth), marker, task_ref, task.label);
}

/// Pretty JSON for any report value
pub fn render_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialize report")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_spec(temp: &TempDir, name: &str, text: &str) {
        let dir = temp.path().join("specs").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("spec.md"), text).unwrap();
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(RunStatus::Complete.exit_code(), 0);
        assert_eq!(RunStatus::MaxIterations.exit_code(), 1);
        assert_eq!(RunStatus::Blocked.exit_code(), 1);
        assert_eq!(RunStatus::Interrupted.exit_code(), 130);
    }

    #[test]
    fn test_summary_json() {
        let summary = IterationSummary {
            run_id: "r1".to_string(),
            spec: "auth".to_string(),
            status: RunStatus::MaxIterations,
            iterations: 5,
            learnings: 2,
            reason: None,
        };
        let json = render_json(&summary).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "max_iterations");
        assert_eq!(value["iterations"], 5);
        assert_eq!(value["learnings"], 2);
        assert!(value.get("reason").is_none());
        assert!(summary.render_text().contains("max_iterations"));
    }

    #[test]
    fn test_collect_status_sorted_by_name() {
        let temp = TempDir::new().unwrap();
        write_spec(&temp, "b-dir", "---\nname: zeta\nstatus: building\niteration_count: 4\n---\n- [x] a\n- [ ] b\n");
        write_spec(&temp, "a-dir", "---\nname: omega\n---\n");
        write_spec(&temp, "c-dir", "---\nname: [broken\n---\n");
        let repo = SpecRepo::new(temp.path(), "specs", ".ralphloop/context.json");

        let records = collect_status(&repo).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "omega");
        assert_eq!(records[0].status, SpecStatus::Pending);
        assert_eq!((records[0].pending, records[0].completed), (0, 0));
        assert_eq!(records[1].name, "zeta");
        assert_eq!(records[1].status, SpecStatus::Building);
        assert_eq!((records[1].pending, records[1].completed, records[1].iterations), (1, 1, 4));
        assert_eq!(records[1].directory, "specs/b-dir");
    }

    #[test]
    fn test_collect_status_empty() {
        let temp = TempDir::new().unwrap();
        let repo = SpecRepo::new(temp.path(), "specs", ".ralphloop/context.json");
        let records = collect_status(&repo).unwrap();
        assert!(records.is_empty());
        assert_eq!(render_json(&records).unwrap(), "[]");
        assert_eq!(render_status_text(&records), "No specs found");
    }

    #[test]
    fn test_render_tasks() {
        colored::control::set_override(false);
        let doc = SpecDocument::parse(
            "specs/auth/spec.md",
            "- [ ] Task 1\n  - [x] a\n  - [!] b\n- [~] Task 2\n<!-- CONTINUATION: next -->\n",
        )
        .unwrap();
        let text = render_tasks(&doc);
        assert!(text.contains("auth (pending) 1/3 done"));
        assert!(text.contains("    [x] 1.1   a"));
        assert!(text.contains("    [!] 1.2   b"));
        assert!(text.contains("  [~] 2     Task 2"));
        assert!(text.contains("continuation: next"));
    }
}
