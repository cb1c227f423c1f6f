//! Self-healing retry policy
//!
//! One task attempt at a time moves through an explicit state machine:
//!
//! ```text
//! Attempting(n) --success--> Succeeded
//! Attempting(n) --unfixable--> Blocked(Unfixable)
//! Attempting(n) --failure, n < max--> Retrying(n+1) --backoff--> Attempting(n+1)
//! Attempting(n) --failure, n >= max--> Blocked(Exhausted)
//! ```
//!
//! The error text of a failed attempt is carried into the next attempt so it
//! can be injected into the prompt.

use std::future::Future;
use std::time::Duration;

use eyre::Context;
use regex::{RegexSet, RegexSetBuilder};
use tracing::{debug, info, warn};

use super::LoopConfig;

/// Error signatures no retry can fix; they need a human
pub const DEFAULT_UNFIXABLE_PATTERNS: &[&str] = &[
    r"invalid[ _-]?api[ _-]?key|api[ _-]?key (is )?(invalid|expired)|expired[ _-]?(api[ _-]?)?(key|token)",
    r"unauthori[sz]ed|\bhttp\S*\W{1,3}401\b",
    r"permission denied|\beacces\b",
    r"disk full|\benospc\b|no space left",
    r"out of memory|\boom[ _-]?kill|cannot allocate memory",
    r"rate[ _-]?limit|\bhttp\S*\W{1,3}429\b|too many requests",
    r"\bkilled\b|\bsigkill\b",
];

/// Why a task ended up blocked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Error matched an unfixable pattern; no retry was made
    Unfixable,
    /// Every allowed attempt failed
    Exhausted,
}

/// State of one task's self-heal cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealState {
    /// About to run attempt `attempt`, with the previous error if any
    Attempting {
        attempt: u32,
        error: Option<String>,
        first_error: Option<String>,
    },
    /// An attempt failed transiently; `attempt` is the one that runs next
    Retrying {
        attempt: u32,
        error: String,
        first_error: String,
    },
    /// Terminal: the task must be blocked
    Blocked {
        kind: FailureKind,
        reason: String,
        attempts: u32,
    },
    /// Terminal: the task is done; `healed_error` is set when a retry fixed it
    Succeeded {
        attempts: u32,
        healed_error: Option<String>,
    },
}

impl HealState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Blocked { .. } | Self::Succeeded { .. })
    }
}

/// Result of a single attempt, as seen by the policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failure(String),
}

/// Terminal state plus whatever the last attempt reported
#[derive(Debug)]
pub struct HealResult<R> {
    pub state: HealState,
    pub report: R,
}

/// Case-insensitive matcher for unfixable error text
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    set: RegexSet,
}

impl ErrorClassifier {
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = RegexSetBuilder::new(patterns).case_insensitive(true).build()?;
        debug!(patterns = set.len(), "ErrorClassifier::new: compiled");
        Ok(Self { set })
    }

    /// Classifier over the built-in unfixable signatures
    pub fn builtin() -> Self {
        Self::new(DEFAULT_UNFIXABLE_PATTERNS).expect("built-in unfixable patterns are valid")
    }

    pub fn is_unfixable(&self, error: &str) -> bool {
        self.set.is_match(error)
    }

    /// Source of the first pattern matching `error`
    pub fn matched_pattern(&self, error: &str) -> Option<&str> {
        self.set
            .matches(error)
            .iter()
            .next()
            .map(|i| self.set.patterns()[i].as_str())
    }
}

/// Attempt ceiling, backoff and classification for one task
#[derive(Debug, Clone)]
pub struct HealPolicy {
    max_attempts: u32,
    backoff_base: Duration,
    classifier: ErrorClassifier,
}

impl HealPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration, classifier: ErrorClassifier) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
            classifier,
        }
    }

    pub fn from_config(config: &LoopConfig) -> eyre::Result<Self> {
        debug!(
            max_attempts = config.max_attempts,
            backoff_secs = config.retry_backoff_secs,
            "HealPolicy::from_config: called"
        );
        let classifier = ErrorClassifier::new(&config.unfixable_patterns).context("Invalid unfixable pattern")?;
        Ok(Self::new(config.max_attempts, config.retry_backoff(), classifier))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Initial state: first attempt, nothing to inject
    pub fn start(&self) -> HealState {
        HealState::Attempting {
            attempt: 1,
            error: None,
            first_error: None,
        }
    }

    /// Transition function; only `Attempting` reacts to an outcome
    pub fn next(&self, state: HealState, outcome: AttemptOutcome) -> HealState {
        let (attempt, first_error) = match state {
            HealState::Attempting {
                attempt, first_error, ..
            } => (attempt, first_error),
            other => {
                debug!(state = ?other, "HealPolicy::next: state does not take outcomes");
                return other;
            }
        };

        match outcome {
            AttemptOutcome::Success => HealState::Succeeded {
                attempts: attempt,
                healed_error: first_error,
            },
            AttemptOutcome::Failure(error) => {
                if let Some(pattern) = self.classifier.matched_pattern(&error) {
                    warn!(attempt, %pattern, "Unfixable error, not retrying");
                    HealState::Blocked {
                        kind: FailureKind::Unfixable,
                        reason: error,
                        attempts: attempt,
                    }
                } else if attempt < self.max_attempts {
                    debug!(attempt, max = self.max_attempts, "HealPolicy::next: scheduling retry");
                    HealState::Retrying {
                        attempt: attempt + 1,
                        first_error: first_error.unwrap_or_else(|| error.clone()),
                        error,
                    }
                } else {
                    warn!(attempt, "Self-heal attempts exhausted");
                    HealState::Blocked {
                        kind: FailureKind::Exhausted,
                        reason: format!("max self-heal attempts reached ({}): {}", self.max_attempts, error),
                        attempts: attempt,
                    }
                }
            }
        }
    }

    /// Leave `Retrying` for the next attempt, carrying the error forward
    pub fn resume(&self, state: HealState) -> HealState {
        match state {
            HealState::Retrying {
                attempt,
                error,
                first_error,
            } => HealState::Attempting {
                attempt,
                error: Some(error),
                first_error: Some(first_error),
            },
            other => other,
        }
    }

    /// Pause after failed attempt `attempt`: base * 2^(attempt-1)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt.saturating_sub(1))
            .and_then(|factor| self.backoff_base.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }

    /// Drive the state machine to a terminal state
    ///
    /// `attempt_fn` receives the attempt number and the error to inject and
    /// returns the outcome plus a report of what happened; the report of the
    /// last attempt is returned alongside the terminal state.
    pub async fn run<F, Fut, R>(&self, mut attempt_fn: F) -> HealResult<R>
    where
        F: FnMut(u32, Option<String>) -> Fut,
        Fut: Future<Output = (AttemptOutcome, R)>,
    {
        let mut state = self.start();
        loop {
            let (attempt, injected) = match &state {
                HealState::Attempting { attempt, error, .. } => (*attempt, error.clone()),
                _ => (self.max_attempts, None),
            };
            debug!(attempt, has_error = injected.is_some(), "HealPolicy::run: attempting");

            let (outcome, report) = attempt_fn(attempt, injected).await;
            state = self.next(state, outcome);

            if let HealState::Retrying { attempt: next, .. } = &state {
                let delay = self.backoff_for(next - 1);
                info!(next_attempt = next, ?delay, "Retrying after backoff");
                tokio::time::sleep(delay).await;
                state = self.resume(state);
            } else {
                return HealResult { state, report };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> HealPolicy {
        HealPolicy::new(max_attempts, Duration::ZERO, ErrorClassifier::builtin())
    }

    #[test]
    fn test_classifier_builtin_signatures() {
        let c = ErrorClassifier::builtin();
        for error in [
            "Error: Invalid API key provided",
            "HTTP 401 Unauthorized",
            "upstream answered HTTP/1.1 401",
            "GET /v1/messages: HTTP 429",
            "Process was OOM-killed",
            "open /etc/shadow: Permission denied",
            "write failed: ENOSPC",
            "No space left on device",
            "fatal: Out of memory",
            "mmap: Cannot allocate memory",
            "429 Too Many Requests",
            "rate limit exceeded",
            "process Killed",
            "terminated by SIGKILL",
        ] {
            assert!(c.is_unfixable(error), "expected unfixable: {}", error);
        }
        for error in [
            "assertion failed: left == right",
            "cannot find value `x`",
            "exit code 1",
            " --> src/parser.rs:401:9",
            "expected status 429, got 200",
            "test room_booking ... FAILED",
            "let oom = Oom::new();",
        ] {
            assert!(!c.is_unfixable(error), "expected fixable: {}", error);
        }
    }

    #[test]
    fn test_classifier_custom_patterns() {
        let c = ErrorClassifier::new(["license expired"]).unwrap();
        assert!(c.is_unfixable("LICENSE EXPIRED on build host"));
        assert!(!c.is_unfixable("permission denied"));
        assert_eq!(c.matched_pattern("license expired"), Some("license expired"));
        assert!(ErrorClassifier::new(["("]).is_err());
    }

    #[test]
    fn test_next_success_first_attempt() {
        let p = policy(3);
        let state = p.next(p.start(), AttemptOutcome::Success);
        assert_eq!(
            state,
            HealState::Succeeded {
                attempts: 1,
                healed_error: None
            }
        );
        assert!(state.is_terminal());
    }

    #[test]
    fn test_next_unfixable_blocks_immediately() {
        let p = policy(3);
        let state = p.next(p.start(), AttemptOutcome::Failure("permission denied".to_string()));
        assert_eq!(
            state,
            HealState::Blocked {
                kind: FailureKind::Unfixable,
                reason: "permission denied".to_string(),
                attempts: 1
            }
        );
    }

    #[test]
    fn test_next_retry_then_resume() {
        let p = policy(3);
        let state = p.next(p.start(), AttemptOutcome::Failure("test failed".to_string()));
        assert!(matches!(state, HealState::Retrying { attempt: 2, .. }));
        let state = p.resume(state);
        assert_eq!(
            state,
            HealState::Attempting {
                attempt: 2,
                error: Some("test failed".to_string()),
                first_error: Some("test failed".to_string())
            }
        );
    }

    #[test]
    fn test_next_ignores_terminal_states() {
        let p = policy(3);
        let done = HealState::Succeeded {
            attempts: 1,
            healed_error: None,
        };
        assert_eq!(p.next(done.clone(), AttemptOutcome::Failure("x".to_string())), done);
    }

    #[test]
    fn test_backoff_doubles() {
        let p = HealPolicy::new(5, Duration::from_secs(2), ErrorClassifier::builtin());
        assert_eq!(p.backoff_for(1), Duration::from_secs(2));
        assert_eq!(p.backoff_for(2), Duration::from_secs(4));
        assert_eq!(p.backoff_for(3), Duration::from_secs(8));
        assert_eq!(p.backoff_for(33), Duration::MAX);
        assert_eq!(p.backoff_for(200), Duration::MAX);
    }

    #[test]
    fn test_zero_max_attempts_still_attempts_once() {
        assert_eq!(policy(0).max_attempts(), 1);
    }

    #[tokio::test]
    async fn test_run_unfixable_single_attempt() {
        let calls = AtomicU32::new(0);
        let result = policy(3)
            .run(|_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { (AttemptOutcome::Failure("Error: invalid api key".to_string()), ()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result.state,
            HealState::Blocked {
                kind: FailureKind::Unfixable,
                attempts: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_run_exhausts_after_exactly_max_attempts() {
        let calls = AtomicU32::new(0);
        let result = policy(3)
            .run(|attempt, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { (AttemptOutcome::Failure(format!("tests failed on {}", attempt)), attempt) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.report, 3);
        match result.state {
            HealState::Blocked { kind, reason, attempts } => {
                assert_eq!(kind, FailureKind::Exhausted);
                assert_eq!(attempts, 3);
                assert_eq!(reason, "max self-heal attempts reached (3): tests failed on 3");
            }
            other => panic!("Expected Blocked, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_injects_previous_error_and_heals() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let result = policy(3)
            .run(|attempt, error| {
                seen.lock().unwrap().push(error.clone());
                async move {
                    if attempt < 3 {
                        (AttemptOutcome::Failure(format!("boom {}", attempt)), ())
                    } else {
                        (AttemptOutcome::Success, ())
                    }
                }
            })
            .await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![None, Some("boom 1".to_string()), Some("boom 2".to_string())]
        );
        assert_eq!(
            result.state,
            HealState::Succeeded {
                attempts: 3,
                healed_error: Some("boom 1".to_string())
            }
        );
    }

    #[test]
    fn test_from_config_rejects_bad_pattern() {
        let config = LoopConfig {
            unfixable_patterns: vec!["[".to_string()],
            ..Default::default()
        };
        assert!(HealPolicy::from_config(&config).is_err());
        assert!(HealPolicy::from_config(&LoopConfig::default()).is_ok());
    }
}
