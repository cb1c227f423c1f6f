//! ContextStore - bounded cross-iteration memory for ralph loops
//!
//! Every loop iteration starts with a fresh agent and no memory of the last
//! one. The context store is how lessons survive: learnings, error fixes,
//! patterns and gotchas are appended after each iteration and rendered in
//! full into the next iteration's instructions. Each category is capped so
//! the rendered text never grows without bound.
//!
//! # Architecture
//!
//! ```text
//! .ralphloop/
//! └── context.json          # every entry, in insertion order
//! ```
//!
//! A store that cannot be read is treated as empty (and set aside as
//! `context.json.corrupt`), never as a fatal error.
//!
//! # Example
//!
//! ```ignore
//! use contextstore::{CategoryLimits, ContextCategory, ContextEntry, ContextStore};
//!
//! let mut store = ContextStore::load(".ralphloop/context.json");
//! store.append(ContextCategory::Learning, ContextEntry::note("tests need a mock clock"));
//! store.prune(&CategoryLimits::default());
//! store.save(".ralphloop/context.json")?;
//! println!("{}", store.render());
//! ```

pub mod cli;
pub mod config;
mod store;

pub use config::CategoryLimits;
pub use store::{ContextCategory, ContextEntry, ContextStore, StoreCounts, atomic_write};

/// Default location of the store, relative to the project root
pub const DEFAULT_STORE_PATH: &str = ".ralphloop/context.json";

/// Placeholder rendered for a category with no entries
pub const EMPTY_PLACEHOLDER: &str = "None yet";
