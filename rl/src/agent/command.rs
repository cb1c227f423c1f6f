//! Agent backed by an external command

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::types::exit_signal;
use super::{Agent, AgentError, AgentOutput, AgentRequest};
use crate::config::AgentConfig;

/// Runs a configured command per invocation, prompt on stdin
///
/// The child is killed if the invocation future is dropped, so a timeout or
/// interrupt never leaves an orphaned agent behind.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    command: String,
    args: Vec<String>,
}

impl CommandAgent {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        debug!(command = %config.command, args = ?config.args, "CommandAgent::from_config: called");
        Self::new(config.command.clone(), config.args.clone())
    }
}

#[async_trait]
impl Agent for CommandAgent {
    async fn invoke(&self, request: AgentRequest) -> Result<AgentOutput, AgentError> {
        debug!(
            command = %self.command,
            workdir = ?request.workdir,
            prompt_len = request.prompt.len(),
            "CommandAgent::invoke: called"
        );
        let start = Instant::now();

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&request.workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| AgentError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        // Feed stdin concurrently; the agent may start writing before it
        // has read the whole prompt, or never read it at all.
        if let Some(mut stdin) = child.stdin.take() {
            let prompt = request.prompt.into_bytes();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&prompt).await {
                    debug!(error = %e, "CommandAgent::invoke: agent closed stdin early");
                }
            });
        }

        let output = child.wait_with_output().await?;
        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);
        let signal = exit_signal(&output.status);
        if exit_code != 0 {
            warn!(command = %self.command, exit_code, ?signal, duration_ms, "Agent exited unsuccessfully");
        }
        debug!(exit_code, duration_ms, "CommandAgent::invoke: finished");

        Ok(AgentOutput {
            exit_code,
            signal,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sh(script: &str) -> CommandAgent {
        CommandAgent::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_prompt_arrives_on_stdin() {
        let temp = tempdir().unwrap();
        let output = sh("cat")
            .invoke(AgentRequest::new("hello agent", temp.path()))
            .await
            .unwrap();
        assert!(output.succeeded());
        assert_eq!(output.stdout, "hello agent");
    }

    #[tokio::test]
    async fn test_env_and_workdir() {
        let temp = tempdir().unwrap();
        let request = AgentRequest::new("", temp.path()).with_env("RALPHLOOP_ATTEMPT", 3);
        let output = sh("echo $RALPHLOOP_ATTEMPT; touch made.txt").invoke(request).await.unwrap();
        assert_eq!(output.stdout.trim(), "3");
        assert!(temp.path().join("made.txt").exists());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_output_not_error() {
        let temp = tempdir().unwrap();
        let output = sh("echo broken >&2; exit 4")
            .invoke(AgentRequest::new("", temp.path()))
            .await
            .unwrap();
        assert_eq!(output.exit_code, 4);
        assert!(output.stderr.contains("broken"));
    }

    #[tokio::test]
    async fn test_missing_command_is_spawn_error() {
        let temp = tempdir().unwrap();
        let err = CommandAgent::new("definitely-not-a-real-agent-binary", vec![])
            .invoke(AgentRequest::new("", temp.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_killed_agent_reports_signal() {
        let temp = tempdir().unwrap();
        let output = sh("cat >/dev/null; kill -9 $$")
            .invoke(AgentRequest::new("", temp.path()))
            .await
            .unwrap();
        assert_eq!(output.exit_code, -1);
        assert_eq!(output.signal, Some(9));
        assert!(output.failure_text().contains("killed by signal 9 (SIGKILL)"));
    }
}
