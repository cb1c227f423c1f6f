//! LoopEngine - drives one spec through bounded, resumable iterations

use std::path::PathBuf;
use std::sync::Arc;

use contextstore::config::CategoryLimits;
use contextstore::{ContextCategory, ContextEntry, ContextStore};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::{Agent, AgentOutput, AgentRequest, extract_learnings};
use crate::domain::{IterationOutcome, IterationRecord, SpecDocument, SpecStatus, TaskRef, TaskState, extract_continuation};
use crate::prompts::{PromptContext, PromptLoader};
use crate::report::{IterationSummary, RunStatus};

use super::LoopConfig;
use super::heal::{AttemptOutcome, FailureKind, HealPolicy, HealResult, HealState};
use super::validation::{GateReport, QualityGate, run_gates};

/// Characters of a healed error kept in the context store
const MAX_HEALED_ERROR_CHARS: usize = 300;

/// What an attempt produced, kept for the iteration record
#[derive(Debug, Clone, Default)]
pub struct AttemptReport {
    /// Agent output, when the agent ran to completion
    pub output: Option<AgentOutput>,

    /// Gate results, when the agent succeeded and gates ran
    pub gates: Option<GateReport>,
}

/// Loop execution engine for a single spec
pub struct LoopEngine {
    /// Run ID (UUID v7), reported in the summary
    run_id: String,

    /// Spec document driven by this engine
    spec_path: PathBuf,

    /// Project root; the agent and gates run here
    workdir: PathBuf,

    /// Loop configuration
    config: LoopConfig,

    /// Quality gates
    gates: Vec<QualityGate>,

    /// Coding agent
    agent: Arc<dyn Agent>,

    /// Prompt templates
    prompts: PromptLoader,

    /// Context store file and its per-category limits
    store_path: PathBuf,
    limits: CategoryLimits,

    /// Self-heal policy for each task
    policy: HealPolicy,
}

impl LoopEngine {
    /// Create a new loop engine
    ///
    /// The context store defaults to `<workdir>/.ralphloop/context.json`.
    pub fn new(
        spec_path: impl Into<PathBuf>,
        workdir: impl Into<PathBuf>,
        config: LoopConfig,
        agent: Arc<dyn Agent>,
    ) -> eyre::Result<Self> {
        let spec_path = spec_path.into();
        let workdir = workdir.into();
        debug!(?spec_path, ?workdir, "LoopEngine::new: called");
        let policy = HealPolicy::from_config(&config)?;

        Ok(Self {
            run_id: Uuid::now_v7().to_string(),
            prompts: PromptLoader::new(&workdir),
            store_path: workdir.join(contextstore::DEFAULT_STORE_PATH),
            limits: CategoryLimits::default(),
            spec_path,
            workdir,
            config,
            gates: Vec::new(),
            agent,
            policy,
        })
    }

    /// Builder: set quality gates
    pub fn with_gates(mut self, gates: Vec<QualityGate>) -> Self {
        debug!(count = gates.len(), "LoopEngine::with_gates");
        self.gates = gates;
        self
    }

    /// Builder: set context store location and limits
    pub fn with_store(mut self, store_path: impl Into<PathBuf>, limits: CategoryLimits) -> Self {
        self.store_path = store_path.into();
        self.limits = limits;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run until complete, blocked, out of iterations or interrupted
    ///
    /// Every step persists before the next begins, so an interrupted run
    /// resumes from the document on disk.
    pub async fn run(&self, shutdown: &mut mpsc::Receiver<()>) -> eyre::Result<IterationSummary> {
        info!(
            "Starting loop {} (spec: {}, max_iterations: {})",
            self.run_id,
            self.spec_path.display(),
            self.config.max_iterations
        );

        let mut passes = 0u32;
        let mut consecutive_failures = 0u32;

        loop {
            if passes > 0 && !self.config.iteration_delay().is_zero() {
                debug!(delay = ?self.config.iteration_delay(), "LoopEngine::run: pacing");
                tokio::select! {
                    _ = tokio::time::sleep(self.config.iteration_delay()) => {}
                    Some(_) = shutdown.recv() => {
                        warn!("Shutdown received between iterations");
                        return Ok(self.summary(RunStatus::Interrupted, passes, Some("interrupted".to_string())));
                    }
                }
            }

            let mut doc = SpecDocument::load(&self.spec_path)?;

            if doc.all_tasks_complete() {
                info!("Loop {} complete after {} iterations", self.run_id, passes);
                doc.set_status(SpecStatus::Complete);
                doc.save()?;
                return Ok(self.summary(RunStatus::Complete, passes, None));
            }

            if passes >= self.config.max_iterations {
                warn!("Loop {} hit max iterations ({})", self.run_id, self.config.max_iterations);
                let reason = format!("max iterations reached ({})", self.config.max_iterations);
                return Ok(self.summary(RunStatus::MaxIterations, passes, Some(reason)));
            }

            let Some((task_ref, label)) = doc.next_task() else {
                warn!("Loop {}: no selectable task, remaining tasks are blocked", self.run_id);
                doc.set_status(SpecStatus::Blocked);
                doc.save()?;
                let reason = "no selectable task: every open task is blocked".to_string();
                return Ok(self.summary(RunStatus::Blocked, passes, Some(reason)));
            };

            let sequence = doc.iteration_count() + 1;
            info!(
                "Loop {} iteration {} (pass {}/{}): task {} {}",
                self.run_id,
                sequence,
                passes + 1,
                self.config.max_iterations,
                task_ref,
                label
            );

            // Persist the selection first so a resume picks the same task
            doc.set_task_state(&task_ref, TaskState::InProgress)?;
            doc.set_status(SpecStatus::Building);
            doc.save()?;

            let result = tokio::select! {
                result = self.run_pass(&doc, &task_ref, &label, sequence) => result?,
                Some(_) = shutdown.recv() => {
                    warn!("Shutdown received during iteration {}", sequence);
                    return Ok(self.summary(RunStatus::Interrupted, passes, Some("interrupted".to_string())));
                }
            };

            let outcome = self.finish_pass(&task_ref, &label, sequence, result).await?;
            passes += 1;

            if outcome.is_success() {
                consecutive_failures = 0;
            } else {
                consecutive_failures += 1;
                debug!(consecutive_failures, "LoopEngine::run: pass failed");
                let ceiling = self.config.max_consecutive_failures;
                if ceiling > 0 && consecutive_failures >= ceiling {
                    warn!("Loop {}: {} consecutive failed iterations, stopping", self.run_id, consecutive_failures);
                    let mut doc = SpecDocument::load(&self.spec_path)?;
                    doc.set_status(SpecStatus::Blocked);
                    doc.save()?;
                    let reason = format!("{} consecutive failed iterations", consecutive_failures);
                    return Ok(self.summary(RunStatus::Blocked, passes, Some(reason)));
                }
            }
        }
    }

    /// Run the self-heal cycle for one task
    async fn run_pass(
        &self,
        doc: &SpecDocument,
        task_ref: &TaskRef,
        label: &str,
        sequence: u32,
    ) -> eyre::Result<HealResult<AttemptReport>> {
        debug!(%task_ref, %label, sequence, "LoopEngine::run_pass: called");
        let base = PromptContext {
            spec_name: doc.name().to_string(),
            spec_path: doc.path.display().to_string(),
            spec_content: doc.render()?,
            task_ref: task_ref.to_string(),
            task_label: label.to_string(),
            iteration: sequence,
            attempt: 1,
            max_attempts: self.policy.max_attempts(),
            context: ContextStore::load(&self.store_path).render(),
            continuation: doc.continuation(),
            error: None,
            gates: self
                .gates
                .iter()
                .map(|g| format!("{}: {}", g.category, g.command))
                .collect(),
        };

        let result = self
            .policy
            .run(|attempt, error| {
                let ctx = PromptContext {
                    attempt,
                    error,
                    ..base.clone()
                };
                self.attempt(ctx)
            })
            .await;
        Ok(result)
    }

    /// One attempt: render, invoke the agent, then gate, all under the timeout
    async fn attempt(&self, ctx: PromptContext) -> (AttemptOutcome, AttemptReport) {
        debug!(task_ref = %ctx.task_ref, attempt = ctx.attempt, "LoopEngine::attempt: called");
        let prompt = match self.prompts.iteration_prompt(&ctx) {
            Ok(prompt) => prompt,
            Err(e) => {
                return (
                    AttemptOutcome::Failure(format!("failed to render prompt: {}", e)),
                    AttemptReport::default(),
                );
            }
        };
        let request = AgentRequest::new(prompt, &self.workdir)
            .with_env("RALPHLOOP_SPEC", &ctx.spec_name)
            .with_env("RALPHLOOP_TASK", &ctx.task_ref)
            .with_env("RALPHLOOP_ITERATION", ctx.iteration)
            .with_env("RALPHLOOP_ATTEMPT", ctx.attempt);

        let timeout = self.config.iteration_timeout();
        let work = async {
            let output = match self.agent.invoke(request).await {
                Ok(output) => output,
                Err(e) => {
                    warn!(error = %e, "Agent invocation failed");
                    return (AttemptOutcome::Failure(e.to_string()), AttemptReport::default());
                }
            };
            if !output.succeeded() {
                return (
                    AttemptOutcome::Failure(output.failure_text()),
                    AttemptReport {
                        output: Some(output),
                        gates: None,
                    },
                );
            }

            let gates = run_gates(&self.gates, &self.workdir, timeout).await;
            let outcome = if gates.passed {
                AttemptOutcome::Success
            } else {
                AttemptOutcome::Failure(gates.failure_text())
            };
            (
                outcome,
                AttemptReport {
                    output: Some(output),
                    gates: Some(gates),
                },
            )
        };

        match tokio::time::timeout(timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(?timeout, "Iteration attempt timed out");
                (
                    AttemptOutcome::Failure(format!("iteration timed out after {}s", timeout.as_secs())),
                    AttemptReport::default(),
                )
            }
        }
    }

    /// Apply a finished pass to the spec and the context store
    async fn finish_pass(
        &self,
        task_ref: &TaskRef,
        label: &str,
        sequence: u32,
        result: HealResult<AttemptReport>,
    ) -> eyre::Result<IterationOutcome> {
        debug!(%task_ref, sequence, state = ?result.state, "LoopEngine::finish_pass: called");
        // The agent may have edited the spec; work on what is on disk now
        let mut doc = SpecDocument::load(&self.spec_path)?;
        let located = doc.locate(task_ref, label);
        if located.is_none() {
            warn!(%task_ref, %label, "Task no longer in spec, recording without updating it");
        }

        let (outcome, attempts) = match &result.state {
            HealState::Succeeded { attempts, .. } if *attempts <= 1 => (IterationOutcome::Success, *attempts),
            HealState::Succeeded { attempts, .. } => (IterationOutcome::Partial, *attempts),
            HealState::Blocked {
                kind: FailureKind::Unfixable,
                attempts,
                ..
            } => (IterationOutcome::Blocked, *attempts),
            HealState::Blocked { attempts, .. } => (IterationOutcome::Failed, *attempts),
            HealState::Attempting { attempt, .. } | HealState::Retrying { attempt, .. } => {
                (IterationOutcome::Failed, *attempt)
            }
        };

        if let Some(current) = located {
            match &result.state {
                HealState::Succeeded { .. } => doc.set_task_state(&current, TaskState::Done)?,
                HealState::Blocked { reason, .. } => doc.block_task(&current, reason)?,
                _ => doc.block_task(&current, "self-heal cycle ended without a result")?,
            }
        }

        let stdout = result.report.output.as_ref().map(|o| o.stdout.as_str()).unwrap_or_default();
        // A marker in stdout wins; otherwise keep whatever the agent wrote into
        // the document, collapsed to a single marker
        let note = extract_continuation(stdout).or_else(|| doc.continuation());
        debug!(has_note = note.is_some(), "LoopEngine::finish_pass: normalizing continuation");
        doc.set_continuation(note.as_deref());

        let learnings = extract_learnings(stdout);
        let mut store = ContextStore::load(&self.store_path);
        for (category, text) in &learnings {
            store.append(*category, ContextEntry::note(text).with_origin(doc.name(), sequence));
        }
        if let HealState::Succeeded {
            attempts,
            healed_error: Some(error),
        } = &result.state
        {
            let fix = learnings
                .iter()
                .find(|(category, _)| *category == ContextCategory::Fix)
                .map(|(_, text)| text.clone())
                .unwrap_or_else(|| format!("resolved on attempt {} of task {} {}", attempts, task_ref, label));
            info!(%task_ref, attempts, "Recording healed error");
            store.append(
                ContextCategory::ErrorFix,
                ContextEntry::error_fix(condense(error, MAX_HEALED_ERROR_CHARS), fix).with_origin(doc.name(), sequence),
            );
        }
        let evicted = store.prune(&self.limits);
        debug!(evicted, "LoopEngine::finish_pass: pruned context store");

        let test_summary = result
            .report
            .gates
            .as_ref()
            .map(GateReport::summary)
            .unwrap_or_else(|| "gates not run".to_string());
        let record = IterationRecord::new(sequence, task_ref.to_string(), label)
            .with_outcome(outcome, attempts)
            .with_files_changed(changed_files(&self.workdir).await)
            .with_test_summary(test_summary)
            .with_learning(learnings.first().map(|(_, text)| text.clone()));
        doc.append_iteration_record(&record);
        doc.save()?;

        if let Err(e) = store.save(&self.store_path) {
            warn!(error = %e, "Failed to save context store");
        }

        info!(
            "Loop {} iteration {} finished: {} after {} attempt(s)",
            self.run_id, sequence, outcome, attempts
        );
        Ok(outcome)
    }

    fn summary(&self, status: RunStatus, iterations: u32, reason: Option<String>) -> IterationSummary {
        let spec = SpecDocument::load(&self.spec_path)
            .map(|doc| doc.name().to_string())
            .unwrap_or_else(|_| self.spec_path.display().to_string());
        IterationSummary {
            run_id: self.run_id.clone(),
            spec,
            status,
            iterations,
            learnings: ContextStore::load(&self.store_path).len(),
            reason,
        }
    }
}

/// List of changed files from git status; empty outside a git repository
async fn changed_files(workdir: &std::path::Path) -> Vec<String> {
    let output = tokio::process::Command::new("git")
        .args(["status", "--porcelain"])
        .current_dir(workdir)
        .output()
        .await;

    match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout)
            .lines()
            .filter_map(|line| line.get(3..).map(|path| path.trim().to_string()))
            .filter(|path| !path.is_empty())
            .collect(),
        _ => vec![],
    }
}

/// Collapse whitespace and cap length
fn condense(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > max_chars {
        format!("{}…", flat.chars().take(max_chars).collect::<String>())
    } else {
        flat
    }
}
