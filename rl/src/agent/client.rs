//! Agent trait definition

use async_trait::async_trait;
#[allow(unused_imports)]
use tracing::debug;

use super::{AgentError, AgentOutput, AgentRequest};

/// Stateless coding agent - each invocation is independent (fresh context)
///
/// Everything an invocation needs is in the rendered prompt: the spec, the
/// selected task, the context store and any error being healed. Nothing
/// carries over in the agent between calls.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Run the agent once and capture its output
    ///
    /// A non-zero exit is reported through `AgentOutput::exit_code`, not as
    /// an error; errors mean the agent could not be run at all.
    async fn invoke(&self, request: AgentRequest) -> Result<AgentOutput, AgentError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::debug;

    /// Mock agent for unit tests
    ///
    /// Replays scripted outputs in order and records every prompt it sees.
    pub struct MockAgent {
        outputs: Vec<AgentOutput>,
        call_count: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl MockAgent {
        pub fn new(outputs: Vec<AgentOutput>) -> Self {
            debug!(output_count = %outputs.len(), "MockAgent::new: called");
            Self {
                outputs,
                call_count: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        /// Successful output with the given stdout
        pub fn ok(stdout: &str) -> AgentOutput {
            AgentOutput {
                exit_code: 0,
                stdout: stdout.to_string(),
                ..Default::default()
            }
        }

        /// Failed output with the given stderr
        pub fn fail(stderr: &str) -> AgentOutput {
            AgentOutput {
                exit_code: 1,
                stderr: stderr.to_string(),
                ..Default::default()
            }
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl Agent for MockAgent {
        async fn invoke(&self, request: AgentRequest) -> Result<AgentOutput, AgentError> {
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            debug!(%idx, "MockAgent::invoke: called");
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(request.prompt);
            }
            self.outputs.get(idx).cloned().ok_or_else(|| {
                debug!("MockAgent::invoke: no more mock outputs");
                AgentError::InvalidResponse("No more mock outputs".to_string())
            })
        }
    }
}
