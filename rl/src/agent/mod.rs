//! Agent module for ralphloop
//!
//! The coding agent is an external command. Each invocation gets a fresh
//! process; memory between passes lives in the spec and the context store.

pub mod client;
mod command;
mod error;
mod learnings;
mod types;

pub use client::Agent;
pub use command::CommandAgent;
pub use error::AgentError;
pub use learnings::extract_learnings;
pub use types::{AgentOutput, AgentRequest, MAX_FAILURE_CHARS, describe_signal, exit_signal, truncate_tail};
