//! Agent request/response types

use std::path::PathBuf;

/// Characters of agent output kept when it is fed back as an error
pub const MAX_FAILURE_CHARS: usize = 4000;

/// One invocation of the agent: a fully rendered prompt and where to run it
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Prompt text, delivered on stdin
    pub prompt: String,

    /// Working directory for the agent process
    pub workdir: PathBuf,

    /// Extra environment variables describing the pass
    pub env: Vec<(String, String)>,
}

impl AgentRequest {
    pub fn new(prompt: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            prompt: prompt.into(),
            workdir: workdir.into(),
            env: Vec::new(),
        }
    }

    /// Builder: add an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.env.push((key.into(), value.to_string()));
        self
    }
}

/// Captured result of an agent process
#[derive(Debug, Clone, Default)]
pub struct AgentOutput {
    /// Exit code (-1 when killed by a signal)
    pub exit_code: i32,

    /// Terminating signal, when the process did not exit on its own
    pub signal: Option<i32>,

    pub stdout: String,

    pub stderr: String,

    /// Wall-clock duration of the invocation
    pub duration_ms: u64,
}

impl AgentOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    /// Error text for a failed invocation, keeping the END of the output
    pub fn failure_text(&self) -> String {
        let output = if !self.stderr.trim().is_empty() {
            &self.stderr
        } else {
            &self.stdout
        };
        let tail = truncate_tail(output.trim(), MAX_FAILURE_CHARS);
        match self.signal {
            Some(signal) => format!("agent {}\n{}", describe_signal(signal), tail),
            None => format!("agent exited with code {}\n{}", self.exit_code, tail),
        }
    }
}

/// Signal that terminated a process, if any
#[cfg(unix)]
pub fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
pub fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

/// Human-readable termination, e.g. `killed by signal 9 (SIGKILL)`
///
/// Only SIGKILL is reported as "killed".
pub fn describe_signal(signal: i32) -> String {
    let name = match signal {
        1 => "SIGHUP",
        2 => "SIGINT",
        6 => "SIGABRT",
        9 => "SIGKILL",
        11 => "SIGSEGV",
        13 => "SIGPIPE",
        15 => "SIGTERM",
        _ => "unknown",
    };
    if signal == 9 {
        format!("killed by signal {} ({})", signal, name)
    } else {
        format!("terminated by signal {} ({})", signal, name)
    }
}

/// Keep at most `max_chars` characters from the end of `text`
pub fn truncate_tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - max_chars).collect();
    format!("...[truncated]...\n{}", tail)
}
