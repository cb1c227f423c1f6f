//! Agent error types

use thiserror::Error;

/// Errors that can occur while invoking the coding agent
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Failed to spawn agent '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Agent I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}
