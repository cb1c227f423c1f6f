//! Domain types for ralphloop
//!
//! Core domain types: SpecDocument, Task, IterationRecord.
//! Spec documents are plain Markdown on disk; nothing here holds state
//! between loop passes.

mod iteration_log;
mod spec_doc;
mod task;

pub use iteration_log::{IterationOutcome, IterationRecord};
pub use spec_doc::{BLOCKED_NOTE_PREFIX, FrontMatter, ITERATION_LOG_HEADING, SpecDocument, SpecError, SpecStatus};
pub use task::{
    Task, TaskCounts, TaskRef, TaskState, extract_continuation, find, leaves, next_task, parse_checkbox, parse_tasks,
};
