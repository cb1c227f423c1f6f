//! ralphloop - bounded, resumable Ralph Wiggum loops over spec documents
//!
//! ralphloop drives an external coding agent through the task checklist of a
//! Markdown spec, one task per iteration, until every task is done or a limit
//! is hit. Each iteration restarts the agent with a fresh context while state
//! persists in the spec document and a bounded context store.
//!
//! # Core Concepts
//!
//! - **Fresh Context Always**: Every agent invocation is a new process
//! - **State in Files**: Progress persists in the spec and the context store, not memory
//! - **Concrete Validation**: Completion determined by gate exit codes, not agent promises
//! - **Self-Healing**: Failed attempts are retried with the error fed back, unless unfixable
//!
//! # Modules
//!
//! - [`domain`] - Spec documents, task trees and iteration records
//! - [`agent`] - Agent trait and command-backed implementation
//! - [`r#loop`] - Loop engine, self-heal policy and quality gates
//! - [`prompts`] - Prompt templates
//! - [`report`] - Status and run summaries
//! - [`state`] - Spec discovery and project initialization
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod agent;
pub mod cli;
pub mod config;
pub mod domain;
pub mod prompts;
pub mod report;
pub mod state;

// Note: 'loop' is a reserved keyword, so we use r#loop
#[path = "loop/mod.rs"]
pub mod r#loop;

// Re-export commonly used types
pub use agent::{Agent, AgentError, AgentOutput, AgentRequest, CommandAgent};
pub use config::{AgentConfig, Config};
pub use domain::{
    IterationOutcome, IterationRecord, SpecDocument, SpecError, SpecStatus, Task, TaskCounts, TaskRef, TaskState,
};
pub use prompts::{PromptContext, PromptLoader};
pub use r#loop::{
    ErrorClassifier, GateCategory, GateReport, HealPolicy, HealState, LoopConfig, LoopEngine, QualityGate, run_gates,
};
pub use report::{IterationSummary, RunStatus, StatusRecord, collect_status};
pub use state::SpecRepo;
