//! Dataset records.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::RepoIdentity;
use crate::errors::{Error, Result};
use crate::execution::{ExecutionOutcome, TestResultSummary};
use crate::history::{HistoryEntry, WorkspaceHandle};
use crate::python::{CodeUnit, UnitKind};

/// How the historical code behaves against the new context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestType {
    /// Historical code fails the test; gold passes
    FailToPass,
    /// Historical code passes the test despite being stale
    PassToPass,
}

impl std::fmt::Display for TestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::FailToPass => "fail-to-pass",
            Self::PassToPass => "pass-to-pass",
        })
    }
}

/// A declaring file before or after the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextVersion {
    pub name: String,
    /// The file with the candidate removed
    pub filtered_code: String,
    pub complete_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub kind: UnitKind,
    pub name: String,
    pub file_name: String,
    /// Relative to the checkout root
    pub file_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub id: String,
    pub date: String,
    pub message: String,
    pub author: String,
    pub log: String,
}

/// One benchmark instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,
    pub dataset: String,
    pub repo: RepoIdentity,
    pub unit: UnitRecord,
    pub gold_code: String,
    pub original_code: String,
    pub code_change_log: String,
    pub old_context: ContextVersion,
    pub new_context: ContextVersion,
    pub context_change_log: String,
    pub commit: CommitRecord,
    pub test_type: TestType,
    /// Relative to the checkout root
    pub test_file: PathBuf,
    pub gold_summary: TestResultSummary,
    pub original_summary: TestResultSummary,
    pub gold_log: String,
    pub initial_error_log: String,
}

/// A (test file, candidate) pair; each is mined at most once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub test_file: PathBuf,
    pub kind: UnitKind,
    pub name: String,
    pub unit_file: PathBuf,
}

/// Everything known about a candidate when it is accepted.
pub struct Acceptance<'a> {
    pub dataset: &'a str,
    pub workspace: &'a WorkspaceHandle,
    pub unit: &'a CodeUnit,
    pub test_file: &'a Path,
    pub entry: &'a HistoryEntry,
    pub old_context: ContextVersion,
    pub new_context: ContextVersion,
    pub gold: &'a ExecutionOutcome,
    pub original: &'a ExecutionOutcome,
}

/// `{repo_id}_{repo_name}_{dataset}__{file stem}__{name}__{commit}`
pub fn instance_id(repo: &RepoIdentity, dataset: &str, unit_file: &Path, name: &str, commit: &str) -> String {
    let stem = unit_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!(
        "{}_{}_{}__{}__{}__{}",
        repo.id, repo.name, dataset, stem, name, commit
    )
}

/// Unified diff from `old` to `new`.
pub fn unified_diff(old: &str, new: &str) -> Result<String> {
    let mut patch = git2::Patch::from_buffers(old.as_bytes(), None, new.as_bytes(), None, None)?;
    let buf = patch.to_buf()?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

impl Instance {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            test_file: self.test_file.clone(),
            kind: self.unit.kind,
            name: self.unit.name.clone(),
            unit_file: self.unit.file_path.clone(),
        }
    }

    /// Validate an acceptance and build the record.
    ///
    /// Gold must have passed with at least one passing test, the code and the
    /// complete contexts must differ, and the test type follows the
    /// historical run's grade.
    pub fn build(acceptance: Acceptance<'_>) -> Result<Self> {
        let Acceptance {
            dataset,
            workspace,
            unit,
            test_file,
            entry,
            old_context,
            new_context,
            gold,
            original,
        } = acceptance;

        let original_code = entry
            .code
            .clone()
            .ok_or_else(|| Error::InvalidRecord(format!("{} has no code at {}", unit.name, entry.commit)))?;
        if original_code == unit.source {
            return Err(Error::InvalidRecord(format!(
                "{} is unchanged at {}",
                unit.name, entry.commit
            )));
        }
        if old_context.complete_code == new_context.complete_code {
            return Err(Error::InvalidRecord(format!(
                "context of {} is unchanged at {}",
                unit.name, entry.commit
            )));
        }

        let gold_report = match gold {
            ExecutionOutcome::Passed(report) if report.summary.passed() > 0 => report,
            other => {
                return Err(Error::InvalidRecord(format!(
                    "gold run of {} did not pass ({})",
                    unit.name,
                    other.label()
                )))
            }
        };
        let (test_type, original_report) = match original {
            ExecutionOutcome::Passed(report) => (TestType::PassToPass, report),
            ExecutionOutcome::Failed(report) => (TestType::FailToPass, report),
            other => {
                return Err(Error::InvalidRecord(format!(
                    "original run of {} has no result ({})",
                    unit.name,
                    other.label()
                )))
            }
        };

        let unit_path = workspace.relative(&unit.file_path)?;
        let test_path = workspace.relative(test_file)?;

        Ok(Self {
            instance_id: instance_id(&unit.repo, dataset, &unit_path, &unit.name, &entry.commit),
            dataset: dataset.to_string(),
            repo: unit.repo.clone(),
            unit: UnitRecord {
                kind: unit.kind,
                name: unit.name.clone(),
                file_name: unit.file_name.clone(),
                file_path: unit_path,
            },
            code_change_log: unified_diff(&original_code, &unit.source)?,
            context_change_log: unified_diff(&old_context.filtered_code, &new_context.filtered_code)?,
            gold_code: unit.source.clone(),
            original_code,
            old_context,
            new_context,
            commit: CommitRecord {
                id: entry.commit.clone(),
                date: entry.date.clone(),
                message: entry.message.clone(),
                author: entry.author.clone(),
                log: entry.log.clone(),
            },
            test_type,
            test_file: test_path,
            gold_summary: gold_report.summary,
            original_summary: original_report.summary,
            gold_log: gold_report.comment.clone(),
            initial_error_log: original_report.comment.clone(),
        })
    }
}
