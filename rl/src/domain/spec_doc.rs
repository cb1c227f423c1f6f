//! SpecDocument domain type
//!
//! A spec is one Markdown file per feature: YAML front matter (name, status,
//! iteration_count) followed by a free-form body holding notes, the task
//! checklist, an optional continuation marker and the iteration log.
//!
//! Edits touch single lines of the body and leave every other byte alone, so
//! a human can keep editing the document between iterations.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use eyre::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::iteration_log::IterationRecord;
use super::task::{self, Task, TaskCounts, TaskRef, TaskState};

/// Heading of the append-only iteration log section
pub const ITERATION_LOG_HEADING: &str = "## Iteration Log";

/// Prefix of the note written under a blocked task
pub const BLOCKED_NOTE_PREFIX: &str = "> Blocked:";

const MAX_NOTE_CHARS: usize = 500;

static CONTINUATION_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!--\s*CONTINUATION:.*?-->[ \t]*\n?").expect("continuation block pattern is valid")
});

/// Errors raised while parsing or editing a spec document
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("Front matter is not terminated by a closing '---' line")]
    UnterminatedFrontMatter,

    #[error("Invalid front matter: {0}")]
    FrontMatter(#[from] serde_yaml::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskRef),
}

/// Lifecycle status of a spec
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecStatus {
    #[default]
    Pending,
    Building,
    Complete,
    Blocked,
}

impl fmt::Display for SpecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Building => "building",
            Self::Complete => "complete",
            Self::Blocked => "blocked",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for SpecStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "building" => Ok(Self::Building),
            "complete" => Ok(Self::Complete),
            "blocked" => Ok(Self::Blocked),
            _ => Err(format!(
                "Unknown status: {}. Use: pending, building, complete, blocked",
                s
            )),
        }
    }
}

/// YAML front matter of a spec document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrontMatter {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub status: SpecStatus,

    #[serde(default)]
    pub iteration_count: u32,

    /// Keys this tool does not interpret, preserved on save
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// A spec document loaded from disk
#[derive(Debug, Clone)]
pub struct SpecDocument {
    /// Where the document lives
    pub path: PathBuf,

    /// Parsed front matter
    pub front: FrontMatter,

    /// Everything after the front matter, verbatim
    body: String,
}

impl SpecDocument {
    /// Parse document text; `path` is used for saving and for the default name
    pub fn parse(path: impl Into<PathBuf>, text: &str) -> Result<Self, SpecError> {
        let path = path.into();
        debug!(?path, len = text.len(), "SpecDocument::parse: called");

        let (yaml, body) = split_front_matter(text)?;
        let mut front: FrontMatter = match yaml {
            Some(yaml) if !yaml.trim().is_empty() => serde_yaml::from_str(yaml)?,
            _ => FrontMatter::default(),
        };
        if front.name.is_empty() {
            front.name = default_name(&path);
            debug!(name = %front.name, "SpecDocument::parse: defaulted name from path");
        }

        Ok(Self {
            path,
            front,
            body: body.to_string(),
        })
    }

    /// Read and parse the document at `path`
    pub fn load(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        debug!(?path, "SpecDocument::load: called");
        let text = fs::read_to_string(path).context(format!("Failed to read spec {}", path.display()))?;
        let doc = Self::parse(path, &text).context(format!("Failed to parse spec {}", path.display()))?;
        Ok(doc)
    }

    /// Write the document atomically to its path
    pub fn save(&self) -> eyre::Result<()> {
        debug!(path = ?self.path, "SpecDocument::save: called");
        let text = self.render()?;
        contextstore::atomic_write(&self.path, &text)
    }

    /// Full document text: front matter plus body
    pub fn render(&self) -> Result<String, SpecError> {
        let yaml = serde_yaml::to_string(&self.front)?;
        Ok(format!("---\n{}---\n{}", yaml, self.body))
    }

    pub fn name(&self) -> &str {
        &self.front.name
    }

    pub fn status(&self) -> SpecStatus {
        self.front.status
    }

    pub fn set_status(&mut self, status: SpecStatus) {
        debug!(name = %self.front.name, from = %self.front.status, to = %status, "SpecDocument::set_status");
        self.front.status = status;
    }

    pub fn iteration_count(&self) -> u32 {
        self.front.iteration_count
    }

    /// Body text after the front matter
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Parsed task tree; line numbers are relative to the body
    pub fn tasks(&self) -> Vec<Task> {
        task::parse_tasks(&self.body)
    }

    pub fn counts(&self) -> TaskCounts {
        TaskCounts::from_tasks(&self.tasks())
    }

    /// True when every leaf-countable task is done, including the zero-task case
    pub fn all_tasks_complete(&self) -> bool {
        self.counts().all_complete()
    }

    pub fn continuation(&self) -> Option<String> {
        task::extract_continuation(&self.body)
    }

    /// Reference and label of the task the next pass should work on
    pub fn next_task(&self) -> Option<(TaskRef, String)> {
        let tasks = self.tasks();
        task::next_task(&tasks).map(|(r, t)| (r, t.label.clone()))
    }

    /// Find a task again after the document may have been edited
    ///
    /// Prefers the same reference when its label still matches, then the
    /// first leaf carrying that label.
    pub fn locate(&self, task_ref: &TaskRef, label: &str) -> Option<TaskRef> {
        let tasks = self.tasks();
        if task::find(&tasks, task_ref).is_some_and(|t| t.label == label) {
            return Some(*task_ref);
        }
        let found = task::leaves(&tasks)
            .into_iter()
            .find(|(_, t)| t.label == label)
            .map(|(r, _)| r);
        debug!(%task_ref, %label, ?found, "SpecDocument::locate: reference moved");
        found
    }

    /// Rewrite a task's checkbox
    ///
    /// Finishing the last open sub-task also finishes the parent; starting a
    /// sub-task of a pending parent marks the parent in progress.
    pub fn set_task_state(&mut self, task_ref: &TaskRef, state: TaskState) -> Result<(), SpecError> {
        debug!(%task_ref, %state, "SpecDocument::set_task_state: called");
        let tasks = self.tasks();
        let target = task::find(&tasks, task_ref).ok_or(SpecError::TaskNotFound(*task_ref))?;
        let mut lines = self.lines();
        rewrite_line(&mut lines, target.line, state);

        if let (Some(parent_ref), Some(sub)) = (task_ref.parent(), task_ref.sub)
            && let Some(parent) = task::find(&tasks, &parent_ref)
        {
            match state {
                TaskState::Done => {
                    let siblings_done = parent
                        .children
                        .iter()
                        .enumerate()
                        .all(|(j, child)| j + 1 == sub || child.state.is_done());
                    if siblings_done {
                        debug!(%parent_ref, "SpecDocument::set_task_state: all sub-tasks done, completing parent");
                        rewrite_line(&mut lines, parent.line, TaskState::Done);
                    }
                }
                TaskState::InProgress if parent.state == TaskState::Pending => {
                    rewrite_line(&mut lines, parent.line, TaskState::InProgress);
                }
                _ => {}
            }
        }

        self.set_lines(lines);
        Ok(())
    }

    /// Mark a task blocked and attach a human-readable reason under it
    pub fn block_task(&mut self, task_ref: &TaskRef, reason: &str) -> Result<(), SpecError> {
        debug!(%task_ref, reason_len = reason.len(), "SpecDocument::block_task: called");
        self.set_task_state(task_ref, TaskState::Blocked)?;

        let tasks = self.tasks();
        let target = task::find(&tasks, task_ref).ok_or(SpecError::TaskNotFound(*task_ref))?;
        let note = format!(
            "{}{} {}",
            " ".repeat(target.indent + 2),
            BLOCKED_NOTE_PREFIX,
            summarize(reason)
        );

        let mut lines = self.lines();
        let next = target.line + 1;
        if lines
            .get(next)
            .is_some_and(|l| l.trim_start().starts_with(BLOCKED_NOTE_PREFIX))
        {
            lines[next] = note;
        } else {
            lines.insert(next, note);
        }
        self.set_lines(lines);
        Ok(())
    }

    /// Replace the continuation marker (last write wins); `None` removes it
    pub fn set_continuation(&mut self, text: Option<&str>) {
        debug!(has_text = text.is_some(), "SpecDocument::set_continuation: called");
        let mut body = CONTINUATION_BLOCK_RE.replace_all(&self.body, "").into_owned();

        if let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) {
            let marker = format!("<!-- CONTINUATION: {} -->\n", text.replace("-->", "- ->"));
            match line_offset(&body, |l| l.trim_end() == ITERATION_LOG_HEADING, 0) {
                Some(pos) => body.insert_str(pos, &format!("{}\n", marker)),
                None => {
                    if !body.is_empty() && !body.ends_with('\n') {
                        body.push('\n');
                    }
                    body.push('\n');
                    body.push_str(&marker);
                }
            }
        }

        self.body = body;
    }

    /// Append a record to the iteration log and advance iteration_count
    pub fn append_iteration_record(&mut self, record: &IterationRecord) {
        debug!(sequence = record.sequence, outcome = %record.outcome, "SpecDocument::append_iteration_record: called");
        if record.sequence <= self.front.iteration_count {
            warn!(
                sequence = record.sequence,
                iteration_count = self.front.iteration_count,
                "Iteration record does not advance iteration_count"
            );
        }
        self.append_to_log(&record.to_markdown());
        self.front.iteration_count = self.front.iteration_count.max(record.sequence);
    }

    fn append_to_log(&mut self, block: &str) {
        match line_offset(&self.body, |l| l.trim_end() == ITERATION_LOG_HEADING, 0) {
            Some(pos) => {
                let after_heading = self.body[pos..].find('\n').map(|i| pos + i + 1).unwrap_or(self.body.len());
                let section_end = line_offset(&self.body, |l| l.starts_with("## "), after_heading)
                    .unwrap_or(self.body.len());

                let before = &self.body[..section_end];
                let mut insert = String::new();
                if !before.ends_with('\n') {
                    insert.push('\n');
                }
                if !before.ends_with("\n\n") {
                    insert.push('\n');
                }
                insert.push_str(block);
                if section_end < self.body.len() {
                    insert.push('\n');
                }
                self.body.insert_str(section_end, &insert);
            }
            None => {
                if !self.body.is_empty() && !self.body.ends_with('\n') {
                    self.body.push('\n');
                }
                self.body.push('\n');
                self.body.push_str(ITERATION_LOG_HEADING);
                self.body.push_str("\n\n");
                self.body.push_str(block);
            }
        }
    }

    fn lines(&self) -> Vec<String> {
        self.body.split('\n').map(String::from).collect()
    }

    fn set_lines(&mut self, lines: Vec<String>) {
        self.body = lines.join("\n");
    }
}

/// Split `---` delimited YAML front matter from the body
fn split_front_matter(text: &str) -> Result<(Option<&str>, &str), SpecError> {
    let Some(rest) = text.strip_prefix("---\n").or_else(|| text.strip_prefix("---\r\n")) else {
        return Ok((None, text));
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Ok((Some(&rest[..offset]), &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    Err(SpecError::UnterminatedFrontMatter)
}

/// Spec name implied by its path: the directory name for `<name>/spec.md`
fn default_name(path: &Path) -> String {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let from_parent = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .filter(|_| stem.eq_ignore_ascii_case("spec"));
    from_parent.unwrap_or(stem).to_string()
}

/// Byte offset of the first line at or after `from` matching `pred`
fn line_offset(text: &str, pred: impl Fn(&str) -> bool, from: usize) -> Option<usize> {
    let mut offset = from;
    for line in text[from..].split_inclusive('\n') {
        if pred(line) {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

fn rewrite_line(lines: &mut [String], line_no: usize, state: TaskState) {
    if let Some(line) = lines.get_mut(line_no)
        && let Some(open) = line.find('[')
    {
        let start = open + 1;
        if let Some(old) = line[start..].chars().next() {
            line.replace_range(start..start + old.len_utf8(), &state.marker().to_string());
        }
    }
}

fn summarize(reason: &str) -> String {
    let flat = reason.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > MAX_NOTE_CHARS {
        let truncated: String = flat.chars().take(MAX_NOTE_CHARS).collect();
        format!("{}…", truncated)
    } else {
        flat
    }
}
