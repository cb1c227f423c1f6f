//! Task tracker
//!
//! Parses the checklist lines of a spec document into a small task tree and
//! folds it into completion counts. A task that owns sub-tasks is counted
//! only through them; its own checkbox is ignored for counting.

use std::fmt;
use std::ops::Add;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Columns a tab counts for when measuring indentation
const TAB_WIDTH: usize = 4;

static CONTINUATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!--\s*CONTINUATION:(.*?)-->").expect("continuation pattern is valid")
});

/// Checkbox state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// `[ ]`
    Pending,
    /// `[~]`
    InProgress,
    /// `[x]` or `[X]`
    Done,
    /// `[!]`
    Blocked,
}

impl TaskState {
    /// Parse the character between the checkbox brackets
    pub fn from_marker(marker: char) -> Option<Self> {
        match marker {
            ' ' => Some(Self::Pending),
            '~' => Some(Self::InProgress),
            'x' | 'X' => Some(Self::Done),
            '!' => Some(Self::Blocked),
            _ => None,
        }
    }

    /// Character written between the checkbox brackets
    pub fn marker(self) -> char {
        match self {
            Self::Pending => ' ',
            Self::InProgress => '~',
            Self::Done => 'x',
            Self::Blocked => '!',
        }
    }

    pub fn is_done(self) -> bool {
        self == Self::Done
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in progress",
            Self::Done => "done",
            Self::Blocked => "blocked",
        };
        write!(f, "{}", s)
    }
}

/// Position of a task in the hierarchy, 1-based (`3` or `3.2`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskRef {
    pub index: usize,
    pub sub: Option<usize>,
}

impl TaskRef {
    pub fn top(index: usize) -> Self {
        Self { index, sub: None }
    }

    pub fn sub(index: usize, sub: usize) -> Self {
        Self { index, sub: Some(sub) }
    }

    /// Reference of the owning top-level task
    pub fn parent(&self) -> Option<Self> {
        self.sub.map(|_| Self::top(self.index))
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sub {
            Some(sub) => write!(f, "{}.{}", self.index, sub),
            None => write!(f, "{}", self.index),
        }
    }
}

impl FromStr for TaskRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |part: &str| {
            part.parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| format!("Invalid task reference: {}", s))
        };
        match s.trim().split_once('.') {
            Some((index, sub)) => Ok(Self::sub(parse(index)?, parse(sub)?)),
            None => Ok(Self::top(parse(s.trim())?)),
        }
    }
}

/// A checklist entry and its sub-tasks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub label: String,
    pub state: TaskState,
    /// Zero-based line number within the text the task was parsed from
    pub line: usize,
    /// Indentation in columns
    pub indent: usize,
    pub children: Vec<Task>,
}

impl Task {
    /// Whether this task is counted through its own checkbox
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Pending/completed/total over leaf-countable tasks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub pending: usize,
    pub completed: usize,
    pub total: usize,
}

impl Add for TaskCounts {
    type Output = TaskCounts;

    fn add(self, rhs: TaskCounts) -> TaskCounts {
        TaskCounts {
            pending: self.pending + rhs.pending,
            completed: self.completed + rhs.completed,
            total: self.total + rhs.total,
        }
    }
}

impl TaskCounts {
    /// Fold a task list into counts; children override their parent
    pub fn from_tasks(tasks: &[Task]) -> Self {
        tasks.iter().map(Self::of).fold(Self::default(), |acc, c| acc + c)
    }

    fn of(task: &Task) -> Self {
        if task.is_leaf() {
            let done = task.state.is_done();
            TaskCounts {
                pending: usize::from(!done),
                completed: usize::from(done),
                total: 1,
            }
        } else {
            Self::from_tasks(&task.children)
        }
    }

    /// True when no countable task is open; vacuously true for zero tasks
    pub fn all_complete(&self) -> bool {
        self.pending == 0
    }
}

/// Parse every checklist line outside fenced code blocks into a task tree
///
/// A line indented deeper than the current top-level task becomes its child.
/// Anything nested deeper than one level is flattened into the same parent.
pub fn parse_tasks(text: &str) -> Vec<Task> {
    debug!(len = text.len(), "parse_tasks: called");
    let mut tasks: Vec<Task> = Vec::new();
    let mut in_fence = false;

    for (line_no, line) in text.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        let Some((indent, state, label)) = parse_checkbox(line) else {
            continue;
        };
        let task = Task {
            label,
            state,
            line: line_no,
            indent,
            children: Vec::new(),
        };

        match tasks.last_mut() {
            Some(parent) if indent > parent.indent => parent.children.push(task),
            _ => tasks.push(task),
        }
    }

    debug!(top_level = tasks.len(), "parse_tasks: done");
    tasks
}

/// Recognise `- [c] label` (also `*` and `+` bullets); returns indent, state and label
pub fn parse_checkbox(line: &str) -> Option<(usize, TaskState, String)> {
    let mut indent = 0;
    let mut rest = line;
    for (i, ch) in line.char_indices() {
        match ch {
            ' ' => indent += 1,
            '\t' => indent += TAB_WIDTH,
            _ => {
                rest = &line[i..];
                break;
            }
        }
    }

    let rest = rest
        .strip_prefix("- ")
        .or_else(|| rest.strip_prefix("* "))
        .or_else(|| rest.strip_prefix("+ "))?;
    let rest = rest.strip_prefix('[')?;
    let mut chars = rest.chars();
    let state = TaskState::from_marker(chars.next()?)?;
    let rest = chars.as_str().strip_prefix(']')?;
    if !(rest.is_empty() || rest.starts_with(char::is_whitespace)) {
        return None;
    }
    Some((indent, state, rest.trim().to_string()))
}

/// Leaf-countable tasks in document order, with their references
pub fn leaves(tasks: &[Task]) -> Vec<(TaskRef, &Task)> {
    let mut out = Vec::new();
    for (i, task) in tasks.iter().enumerate() {
        if task.is_leaf() {
            out.push((TaskRef::top(i + 1), task));
        } else {
            for (j, child) in task.children.iter().enumerate() {
                out.push((TaskRef::sub(i + 1, j + 1), child));
            }
        }
    }
    out
}

/// Pick the task the next iteration works on
///
/// An in-progress leaf always wins; otherwise the first pending leaf in
/// document order. Done and blocked leaves are never selected.
pub fn next_task(tasks: &[Task]) -> Option<(TaskRef, &Task)> {
    let all = leaves(tasks);
    let selected = all
        .iter()
        .find(|(_, t)| t.state == TaskState::InProgress)
        .or_else(|| all.iter().find(|(_, t)| t.state == TaskState::Pending))
        .copied();
    debug!(selected = ?selected.map(|(r, _)| r), "next_task: done");
    selected
}

/// Look up a task by reference
pub fn find<'a>(tasks: &'a [Task], task_ref: &TaskRef) -> Option<&'a Task> {
    let top = tasks.get(task_ref.index.checked_sub(1)?)?;
    match task_ref.sub {
        Some(sub) => top.children.get(sub.checked_sub(1)?),
        None => Some(top),
    }
}

/// Body of the continuation marker, trimmed; the last marker wins
pub fn extract_continuation(text: &str) -> Option<String> {
    let body = CONTINUATION_RE.captures_iter(text).last()?.get(1)?.as_str().trim();
    if body.is_empty() { None } else { Some(body.to_string()) }
}
