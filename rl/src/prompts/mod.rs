//! Prompt Template System
//!
//! Loads and renders `.pmt` (prompt template) files for loop iterations.
//!
//! Template loading chain:
//! 1. `.ralphloop/prompts/{name}.pmt` (project override)
//! 2. Embedded fallback in code
//!
//! Templates use Handlebars syntax for variable substitution.

pub mod embedded;
mod loader;

pub use loader::{PromptContext, PromptLoader};
