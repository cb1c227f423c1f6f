//! Core ContextStore implementation

use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::config::CategoryLimits;

/// On-disk format version
const STORE_VERSION: u32 = 1;

/// Category an entry is filed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextCategory {
    Learning,
    ErrorFix,
    Pattern,
    Discovery,
    Gotcha,
    Fix,
}

impl ContextCategory {
    /// Every category, in render order
    pub const ALL: [ContextCategory; 6] = [
        ContextCategory::Learning,
        ContextCategory::ErrorFix,
        ContextCategory::Pattern,
        ContextCategory::Discovery,
        ContextCategory::Gotcha,
        ContextCategory::Fix,
    ];

    /// Canonical snake_case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Learning => "learning",
            Self::ErrorFix => "error_fix",
            Self::Pattern => "pattern",
            Self::Discovery => "discovery",
            Self::Gotcha => "gotcha",
            Self::Fix => "fix",
        }
    }

    /// Section heading used when rendering
    pub fn heading(&self) -> &'static str {
        match self {
            Self::Learning => "Learnings",
            Self::ErrorFix => "Error Fixes",
            Self::Pattern => "Patterns",
            Self::Discovery => "Discoveries",
            Self::Gotcha => "Gotchas",
            Self::Fix => "Fixes",
        }
    }
}

impl fmt::Display for ContextCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ContextCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        match normalized.as_str() {
            "learning" | "learnings" => Ok(Self::Learning),
            "error_fix" | "errorfix" | "error_fixes" => Ok(Self::ErrorFix),
            "pattern" | "patterns" => Ok(Self::Pattern),
            "discovery" | "discoveries" => Ok(Self::Discovery),
            "gotcha" | "gotchas" => Ok(Self::Gotcha),
            "fix" | "fixes" => Ok(Self::Fix),
            _ => Err(format!(
                "Unknown category: {}. Use: learning, error_fix, pattern, discovery, gotcha, fix",
                s
            )),
        }
    }
}

/// A single remembered fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    /// Category this entry is filed under (set by [`ContextStore::append`])
    pub category: ContextCategory,
    /// Free text, or the fix half of an error/fix pair
    pub text: String,
    /// The error this entry resolves, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Spec that was active when the entry was recorded
    #[serde(default)]
    pub spec: String,
    /// Iteration number within that spec
    #[serde(default)]
    pub iteration: u32,
    /// When the entry was recorded
    pub recorded_at: DateTime<Utc>,
}

impl ContextEntry {
    /// Free-text entry
    pub fn note(text: impl Into<String>) -> Self {
        Self {
            category: ContextCategory::Learning,
            text: text.into(),
            error: None,
            spec: String::new(),
            iteration: 0,
            recorded_at: Utc::now(),
        }
    }

    /// Error to fix pair
    pub fn error_fix(error: impl Into<String>, fix: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::note(fix)
        }
    }

    /// Builder: associate the entry with a spec and iteration
    pub fn with_origin(mut self, spec: impl Into<String>, iteration: u32) -> Self {
        self.spec = spec.into();
        self.iteration = iteration;
        self
    }

    /// Render as a single Markdown bullet
    pub fn render_line(&self) -> String {
        let text = single_line(&self.text);
        let body = match &self.error {
            Some(error) => format!("{} → {}", single_line(error), text),
            None => text,
        };
        if self.spec.is_empty() {
            format!("- {}", body)
        } else {
            format!("- {} ({} #{})", body, self.spec, self.iteration)
        }
    }
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Entry counts per category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCounts {
    /// Count for every category, in render order
    pub by_category: Vec<(ContextCategory, usize)>,
    /// Sum over all categories
    pub total: usize,
}

/// The main context store
///
/// Entries are kept in a single list in insertion order; insertion order is
/// recency order. Grouping by category happens at render time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextStore {
    #[serde(default = "current_version")]
    version: u32,
    #[serde(default)]
    entries: Vec<ContextEntry>,
}

fn current_version() -> u32 {
    STORE_VERSION
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            version: STORE_VERSION,
            entries: Vec::new(),
        }
    }

    /// Load the store at `path`
    ///
    /// Never fails: a missing file is an empty store, and an unreadable or
    /// corrupt file is logged, moved aside to `<name>.corrupt` and replaced
    /// by an empty store.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        debug!(?path, "ContextStore::load: called");

        if !path.exists() {
            debug!(?path, "ContextStore::load: no store file, starting empty");
            return Self::new();
        }

        match Self::try_load(path) {
            Ok(store) => {
                debug!(?path, entries = store.entries.len(), "ContextStore::load: loaded");
                store
            }
            Err(e) => {
                warn!(?path, error = %e, "Context store is corrupt, continuing with empty context");
                let quarantine = corrupt_path(path);
                match fs::rename(path, &quarantine) {
                    Ok(()) => info!(?quarantine, "Moved corrupt context store aside"),
                    Err(rename_err) => warn!(?path, error = %rename_err, "Failed to move corrupt context store aside"),
                }
                Self::new()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Self::new());
        }
        let store: Self = serde_json::from_str(&content).context("Failed to parse context store")?;
        Ok(store)
    }

    /// Persist the store atomically
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        debug!(?path, entries = self.entries.len(), "ContextStore::save: called");
        let content = serde_json::to_string_pretty(self)?;
        atomic_write(path, &content)
    }

    /// Append an entry under `category`
    pub fn append(&mut self, category: ContextCategory, mut entry: ContextEntry) {
        debug!(%category, spec = %entry.spec, iteration = entry.iteration, "ContextStore::append: called");
        entry.category = category;
        self.entries.push(entry);
    }

    /// Entries of one category, oldest first
    pub fn entries(&self, category: ContextCategory) -> impl Iterator<Item = &ContextEntry> {
        self.entries.iter().filter(move |e| e.category == category)
    }

    /// Number of entries in one category
    pub fn count(&self, category: ContextCategory) -> usize {
        self.entries(category).count()
    }

    /// Total number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Per-category counts
    pub fn counts(&self) -> StoreCounts {
        let by_category: Vec<_> = ContextCategory::ALL.iter().map(|c| (*c, self.count(*c))).collect();
        StoreCounts {
            total: self.entries.len(),
            by_category,
        }
    }

    /// Truncate each category to its newest `limit` entries
    ///
    /// Evicts oldest first, never reorders survivors, and is idempotent.
    /// Returns the number of entries evicted.
    pub fn prune(&mut self, limits: &CategoryLimits) -> usize {
        debug!(entries = self.entries.len(), "ContextStore::prune: called");
        let mut excess: HashMap<ContextCategory, usize> = HashMap::new();
        for category in ContextCategory::ALL {
            let count = self.count(category);
            let limit = limits.limit_for(category);
            if count > limit {
                excess.insert(category, count - limit);
            }
        }

        if excess.is_empty() {
            debug!("ContextStore::prune: nothing to evict");
            return 0;
        }

        let before = self.entries.len();
        self.entries.retain(|entry| match excess.get_mut(&entry.category) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                false
            }
            _ => true,
        });
        let evicted = before - self.entries.len();
        info!(evicted, "Pruned context store");
        evicted
    }

    /// Render every category as a Markdown section for prompt injection
    pub fn render(&self) -> String {
        let mut out = String::new();
        for category in ContextCategory::ALL {
            out.push_str(&format!("### {}\n", category.heading()));
            let mut any = false;
            for entry in self.entries(category) {
                out.push_str(&entry.render_line());
                out.push('\n');
                any = true;
            }
            if !any {
                out.push_str(crate::EMPTY_PLACEHOLDER);
                out.push('\n');
            }
            out.push('\n');
        }
        out.trim_end().to_string()
    }
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".corrupt");
    path.with_file_name(name)
}

/// Write `contents` to `path` via a temp file in the same directory and a rename
///
/// Readers see either the old file or the new one, never a partial write.
pub fn atomic_write(path: &Path, contents: &str) -> Result<()> {
    debug!(?path, len = contents.len(), "atomic_write: called");
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).context(format!("Failed to create directory {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).context("Failed to create temp file")?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .context(format!("Failed to replace {}", path.display()))?;
    Ok(())
}
