//! Project state on disk
//!
//! A project root holds the specs directory (`<specs-dir>/<name>/spec.md`)
//! and the context store file. SpecRepo resolves both relative to the root.

use std::fs;
use std::path::{Path, PathBuf};

use contextstore::ContextStore;
use eyre::{Context, Result, eyre};
use tracing::{debug, info};

/// File name of a spec document inside its directory
pub const SPEC_FILE_NAME: &str = "spec.md";

/// Resolves specs and the context store under a project root
#[derive(Debug, Clone)]
pub struct SpecRepo {
    root: PathBuf,
    specs_dir: PathBuf,
    store_path: PathBuf,
}

/// What `init` had to create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitReport {
    pub created_specs_dir: bool,
    pub created_store: bool,
}

impl SpecRepo {
    pub fn new(root: impl Into<PathBuf>, specs_dir: impl AsRef<Path>, store_path: impl AsRef<Path>) -> Self {
        let root = root.into();
        let specs_dir = root.join(specs_dir);
        let store_path = root.join(store_path);
        debug!(?root, ?specs_dir, ?store_path, "SpecRepo::new: called");
        Self {
            root,
            specs_dir,
            store_path,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn specs_dir(&self) -> &Path {
        &self.specs_dir
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// All spec documents, sorted by path
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        let pattern = format!(
            "{}/*/{}",
            glob::Pattern::escape(&self.specs_dir.to_string_lossy()),
            SPEC_FILE_NAME
        );
        debug!(%pattern, "SpecRepo::discover: called");

        let mut paths = glob::glob(&pattern)
            .context("Invalid specs directory pattern")?
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::warn!("Skipping unreadable spec path: {}", e);
                    None
                }
            })
            .collect::<Vec<_>>();
        paths.sort();
        debug!(count = paths.len(), "SpecRepo::discover: found specs");
        Ok(paths)
    }

    /// Find a spec by name, directory or file path
    pub fn resolve(&self, name_or_path: &str) -> Result<PathBuf> {
        debug!(%name_or_path, "SpecRepo::resolve: called");
        let given = self.root.join(name_or_path);
        let candidates = [
            given.clone(),
            given.join(SPEC_FILE_NAME),
            self.specs_dir.join(name_or_path).join(SPEC_FILE_NAME),
        ];
        candidates
            .into_iter()
            .find(|p| p.is_file())
            .ok_or_else(|| {
                eyre!(
                    "Spec not found: {} (looked for {})",
                    name_or_path,
                    self.specs_dir.join(name_or_path).join(SPEC_FILE_NAME).display()
                )
            })
    }

    /// Create the specs directory and an empty context store if missing
    pub fn init(&self) -> Result<InitReport> {
        debug!(root = ?self.root, "SpecRepo::init: called");
        let created_specs_dir = !self.specs_dir.is_dir();
        if created_specs_dir {
            fs::create_dir_all(&self.specs_dir)
                .context(format!("Failed to create {}", self.specs_dir.display()))?;
        }

        let created_store = !self.store_path.exists();
        if created_store {
            ContextStore::new()
                .save(&self.store_path)
                .context(format!("Failed to create {}", self.store_path.display()))?;
        }

        info!(created_specs_dir, created_store, "Project initialized");
        Ok(InitReport {
            created_specs_dir,
            created_store,
        })
    }
}
