//! Loop execution module for ralphloop
//!
//! The Loop Engine runs one task per pass: select → prompt → agent → gates →
//! persist, with a self-heal cycle around each task. Each agent invocation
//! starts with a fresh context; state persists in the spec document and the
//! context store, not in memory.

mod config;
mod engine;
mod heal;
mod validation;

pub use config::LoopConfig;
pub use engine::{AttemptReport, LoopEngine};
pub use heal::{
    AttemptOutcome, DEFAULT_UNFIXABLE_PATTERNS, ErrorClassifier, FailureKind, HealPolicy, HealResult, HealState,
};
pub use validation::{GateCategory, GateReport, GateResult, QualityGate, run_gate, run_gates};
