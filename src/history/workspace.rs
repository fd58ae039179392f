//! On-disk layout of one repository's mining workspace.

use std::path::{Path, PathBuf};

use crate::config::RepoSpec;
use crate::errors::{Error, Result};

/// Paths owned by the mining run of a single repository.
///
/// Every component receives this handle explicitly; nothing locates the
/// checkout through ambient state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceHandle {
    root: PathBuf,
    repo_dir: PathBuf,
}

impl WorkspaceHandle {
    pub fn new(root: impl Into<PathBuf>, repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            repo_dir: repo_dir.into(),
        }
    }

    /// `<work_root>/<dataset>/<id>_<name>/` with the checkout in `source/`.
    pub fn for_repo(work_root: &Path, dataset: &str, repo: &RepoSpec) -> Self {
        let root = work_root.join(dataset).join(repo.label());
        let repo_dir = root.join("source");
        Self { root, repo_dir }
    }

    /// Workspace around an existing checkout; artifacts go to `.syncforge/`.
    pub fn for_checkout(repo_dir: impl Into<PathBuf>) -> Self {
        let repo_dir = repo_dir.into();
        Self {
            root: repo_dir.join(".syncforge"),
            repo_dir,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The git checkout that history is traced in.
    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Checkout used for local (non-container) test runs.
    pub fn exec_dir(&self) -> PathBuf {
        self.root.join("exec")
    }

    /// Host copies of candidate files mounted into containers.
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join("staging")
    }

    pub fn venv_dir(&self) -> PathBuf {
        self.root.join("test_venv")
    }

    /// Build context holding the generated Dockerfile.
    pub fn build_dir(&self) -> PathBuf {
        self.root.join("build")
    }

    pub fn dataset_path(&self) -> PathBuf {
        self.root.join("instances.json")
    }

    pub fn construct_log_path(&self) -> PathBuf {
        self.root.join("construct_log.json")
    }

    pub fn targets_cache_path(&self) -> PathBuf {
        self.root.join("test_targets.json")
    }

    /// Path of `path` relative to the checkout root.
    pub fn relative(&self, path: &Path) -> Result<PathBuf> {
        if path.is_relative() {
            return Ok(path.to_path_buf());
        }
        path.strip_prefix(&self.repo_dir)
            .map(Path::to_path_buf)
            .map_err(|_| {
                Error::workspace(
                    path,
                    format!("not inside checkout {}", self.repo_dir.display()),
                )
            })
    }

    /// Fails when the checkout is missing or is not a git work tree.
    pub fn validate(&self) -> Result<()> {
        if !self.repo_dir.is_dir() {
            return Err(Error::workspace(&self.repo_dir, "checkout directory is missing"));
        }
        if !self.repo_dir.join(".git").exists() {
            return Err(Error::workspace(&self.repo_dir, "checkout has no .git"));
        }
        Ok(())
    }
}
