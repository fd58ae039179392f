//! Commit history tracing over a live checkout.
//!
//! The tracer walks every commit that touched a file (newest first), checks
//! each one out into the working tree, and records the function's source at
//! that point. Whatever happens during the walk, the checkout is returned to
//! its default branch afterwards, hard-reset, with stashed work re-applied.

use chrono::{DateTime, FixedOffset};
use git2::build::CheckoutBuilder;
use git2::{BranchType, Commit, DiffFormat, DiffOptions, Oid, Repository, ResetType, Sort};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::workspace::WorkspaceHandle;
use crate::config::CommitTraceMode;
use crate::errors::{Error, Result};
use crate::observability::{set_phase, MiningPhase};
use crate::python::{lookup_function, read_source_lossy, Formatter, FunctionLookup};

const DEFAULT_BRANCHES: [&str; 2] = ["main", "master"];

/// One historical version of a function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub commit: String,
    pub message: String,
    pub author: String,
    /// Commit time with its original offset, `YYYY-MM-DD HH:MM:SS+HH:MM`
    pub date: String,
    /// `git show`-style rendering of the commit
    pub log: String,
    /// Formatted source of the function; `None` when the file did not parse
    pub code: Option<String>,
    /// The whole declaring file at this commit
    pub file_source: String,
}

/// Anything that can produce a function's history.
pub trait HistorySource {
    fn function_history(&mut self, file_path: &Path, name: &str) -> Result<Vec<HistoryEntry>>;
}

/// Traces history with libgit2 inside the workspace checkout.
pub struct CommitHistoryTracer {
    workspace: WorkspaceHandle,
    formatter: Formatter,
    mode: CommitTraceMode,
}

impl CommitHistoryTracer {
    pub fn new(workspace: WorkspaceHandle, formatter: Formatter, mode: CommitTraceMode) -> Self {
        Self {
            workspace,
            formatter,
            mode,
        }
    }

    fn open_repo(&self) -> Result<Repository> {
        self.workspace.validate()?;
        Repository::open(self.workspace.repo_dir())
            .map_err(|e| Error::workspace(self.workspace.repo_dir(), e.message().to_string()))
    }

    /// Versions of `name` in `file_path` that differ from the current one.
    ///
    /// Entries are newest first. With [`CommitTraceMode::Oldest`] only the
    /// oldest surviving entry is returned.
    pub fn trace(&self, file_path: &Path, name: &str) -> Result<Vec<HistoryEntry>> {
        let _phase = set_phase(MiningPhase::Tracing);
        let relative = self.workspace.relative(file_path)?;
        let mut repo = self.open_repo()?;

        let current = read_source_lossy(&self.workspace.repo_dir().join(&relative))
            .ok()
            .and_then(|source| {
                match lookup_function(&source, &relative, name, &self.formatter) {
                    FunctionLookup::Found(code) => Some(code),
                    _ => None,
                }
            });

        let original_head = repo.head().ok().and_then(|head| {
            if head.is_branch() {
                head.name().map(|name| HeadRef::Branch(name.to_string()))
            } else {
                head.target().map(HeadRef::Detached)
            }
        });

        let traced = commits_touching(&repo, &relative)
            .and_then(|oids| self.collect_entries(&repo, &oids, &relative, name));
        let restored = restore_checkout(&mut repo, original_head.as_ref());

        let mut entries = traced?;
        restored?;

        entries.retain(|entry| entry.code.is_none() || entry.code != current);
        if self.mode == CommitTraceMode::Oldest {
            // Oldest version that still parses; unparsable ones carry no code.
            let oldest = entries.iter().rposition(|entry| entry.code.is_some());
            entries = oldest.map(|i| entries.swap_remove(i)).into_iter().collect();
        }

        log::debug!(
            "{} has {} historical version(s) in {}",
            name,
            entries.len(),
            relative.display()
        );
        Ok(entries)
    }

    fn collect_entries(
        &self,
        repo: &Repository,
        oids: &[Oid],
        relative: &Path,
        name: &str,
    ) -> Result<Vec<HistoryEntry>> {
        let workdir = repo
            .workdir()
            .ok_or_else(|| Error::workspace(self.workspace.repo_dir(), "bare repository"))?;
        let file_path = workdir.join(relative);

        let mut entries = Vec::new();
        for oid in oids {
            let commit = repo.find_commit(*oid)?;
            if let Err(e) = checkout_commit(repo, &commit) {
                log::warn!("Failed to check out {}: {}", oid, e);
                continue;
            }

            let Ok(file_source) = read_source_lossy(&file_path) else {
                continue;
            };
            let code = match lookup_function(&file_source, relative, name, &self.formatter) {
                FunctionLookup::Found(code) => Some(code),
                FunctionLookup::Unparsable => None,
                FunctionLookup::Missing => continue,
            };

            let log = render_show(repo, &commit).unwrap_or_else(|e| {
                log::warn!("Failed to render commit {}: {}", oid, e);
                String::new()
            });
            entries.push(HistoryEntry {
                commit: oid.to_string(),
                message: commit.message().unwrap_or("").to_string(),
                author: commit.author().name().unwrap_or("").to_string(),
                date: commit_date(&commit),
                log,
                code,
                file_source,
            });
        }
        Ok(entries)
    }
}

impl HistorySource for CommitHistoryTracer {
    fn function_history(&mut self, file_path: &Path, name: &str) -> Result<Vec<HistoryEntry>> {
        self.trace(file_path, name)
    }
}

enum HeadRef {
    Branch(String),
    Detached(Oid),
}

/// Commits touching `relative`, newest first.
fn commits_touching(repo: &Repository, relative: &Path) -> Result<Vec<Oid>> {
    let mut revwalk = repo.revwalk()?;
    revwalk.push_head()?;
    revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;

    Ok(revwalk
        .filter_map(|oid| oid.ok())
        .filter(|oid| {
            repo.find_commit(*oid)
                .map(|commit| commit_touches_file(repo, &commit, relative))
                .unwrap_or(false)
        })
        .collect())
}

/// Check if a commit changes a file that exists in its tree.
///
/// A merge whose version of the file matches one of its parents brought no
/// change of its own and is skipped.
fn commit_touches_file(repo: &Repository, commit: &Commit<'_>, file_path: &Path) -> bool {
    let tree = match commit.tree() {
        Ok(t) => t,
        Err(_) => return false,
    };
    let blob = match tree.get_path(file_path) {
        Ok(entry) => entry.id(),
        Err(_) => return false,
    };
    if commit.parent_count() > 1 && parents_hold_blob(commit, file_path, blob) {
        return false;
    }

    let parent_tree = commit.parents().next().and_then(|p| p.tree().ok());
    let mut diff_opts = DiffOptions::new();
    diff_opts.pathspec(file_path.to_string_lossy().as_ref());

    match repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut diff_opts)) {
        Ok(diff) => diff.deltas().count() > 0,
        Err(_) => false,
    }
}

fn parents_hold_blob(commit: &Commit<'_>, file_path: &Path, blob: Oid) -> bool {
    commit.parents().any(|parent| {
        parent
            .tree()
            .ok()
            .and_then(|tree| tree.get_path(file_path).ok())
            .is_some_and(|entry| entry.id() == blob)
    })
}

fn force_checkout() -> CheckoutBuilder<'static> {
    let mut builder = CheckoutBuilder::new();
    builder.force();
    builder
}

/// Discard local changes and detach HEAD at `commit`.
fn checkout_commit(repo: &Repository, commit: &Commit<'_>) -> Result<()> {
    repo.checkout_tree(commit.as_object(), Some(&mut force_checkout()))?;
    repo.set_head_detached(commit.id())?;
    Ok(())
}

/// Return to `main` (else `master`, else the starting HEAD), reset hard,
/// and pop the newest stash entry if one exists.
fn restore_checkout(repo: &mut Repository, original: Option<&HeadRef>) -> Result<()> {
    let branch = DEFAULT_BRANCHES
        .iter()
        .find(|b| repo.find_branch(b, BranchType::Local).is_ok())
        .map(|b| format!("refs/heads/{}", b))
        .or_else(|| match original {
            Some(HeadRef::Branch(name)) => Some(name.clone()),
            _ => None,
        });

    {
        match (&branch, original) {
            (Some(refname), _) => {
                let target = repo.revparse_single(refname)?;
                repo.checkout_tree(&target, Some(&mut force_checkout()))?;
                repo.set_head(refname)?;
            }
            (None, Some(HeadRef::Detached(oid))) => {
                let commit = repo.find_commit(*oid)?;
                checkout_commit(repo, &commit)?;
            }
            (None, _) => {
                return Err(Error::workspace(
                    repo.path(),
                    "no main or master branch to restore",
                ))
            }
        }

        let head = repo.head()?.peel_to_commit()?;
        repo.reset(head.as_object(), ResetType::Hard, Some(&mut force_checkout()))?;
    }

    let mut has_stash = false;
    repo.stash_foreach(|_, _, _| {
        has_stash = true;
        false
    })?;
    if has_stash {
        if let Err(e) = repo.stash_pop(0, None) {
            log::warn!("Failed to re-apply stashed changes: {}", e);
        }
    }
    Ok(())
}

fn commit_date(commit: &Commit<'_>) -> String {
    const FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";
    let time = commit.time();
    let Some(utc) = DateTime::from_timestamp(time.seconds(), 0) else {
        return String::new();
    };
    match FixedOffset::east_opt(time.offset_minutes() * 60) {
        Some(offset) => utc.with_timezone(&offset).format(FORMAT).to_string(),
        None => utc.format(FORMAT).to_string(),
    }
}

/// Header, indented message, and patch of a commit, like `git show`.
pub fn render_show(repo: &Repository, commit: &Commit<'_>) -> Result<String> {
    let author = commit.author();
    let mut out = format!(
        "commit {}\nAuthor: {} <{}>\nDate:   {}\n\n",
        commit.id(),
        author.name().unwrap_or(""),
        author.email().unwrap_or(""),
        commit_date(commit)
    );
    for line in commit.message().unwrap_or("").lines() {
        out.push_str("    ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');

    let tree = commit.tree()?;
    let parent_tree = commit.parents().next().and_then(|p| p.tree().ok());
    let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;
    diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        if matches!(line.origin(), '+' | '-' | ' ') {
            out.push(line.origin());
        }
        out.push_str(&String::from_utf8_lossy(line.content()));
        true
    })?;
    Ok(out)
}
