//! The per-test-file filtering state machine.
//!
//! For every candidate of a [`TestTarget`] the miner walks the candidate's
//! history and, commit by commit, decides whether the historical version
//! yields an instance. Some outcomes skip a single commit; others abandon the
//! whole test file. The checks run in a fixed order:
//!
//! 1. a (test file, candidate) pair is mined once
//! 2. commits without parsable or changed code are skipped
//! 3. commits that leave the declaring file unchanged are skipped
//! 4. gold is evaluated once per declaring file and cached
//! 5. a gold timeout abandons the test file
//! 6. an invalid gold run, or one without passing tests, abandons the file
//! 7. a failing gold run abandons the file
//! 8. a historical timeout skips the commit; an invalid run abandons the file
//! 9. a run that reports it executed nothing abandons the file
//! 10. the historical grade selects the test type, subject to the mode filter
//! 11. accepted instances are checkpointed immediately

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::construct_log::ConstructLog;
use super::discovery::TestTarget;
use super::instance::{Acceptance, ContextVersion, DedupKey, Instance};
use super::store::InstanceStore;
use crate::config::UnittestMode;
use crate::errors::Result;
use crate::execution::{ExecutionOutcome, ExecutionRequest, RunRole, TestExecutor};
use crate::history::{HistoryEntry, HistorySource, WorkspaceHandle};
use crate::observability::{set_candidate, set_phase, set_test_file, MiningPhase};
use crate::python::{read_source_lossy, remove_definition, CodeUnit, Formatter};
use crate::sandbox::CheckoutRefresher;

/// Why a test file produced no further instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    NotPython,
    GoldTimedOut,
    GoldInvalid,
    GoldNoPassingTests,
    GoldFailed,
    OriginalInvalid,
    NoTestsExecuted,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::NotPython => "test file is not a Python file",
            Self::GoldTimedOut => "gold run timed out",
            Self::GoldInvalid => "gold run is invalid",
            Self::GoldNoPassingTests => "gold run has no passing tests",
            Self::GoldFailed => "gold code fails its own test",
            Self::OriginalInvalid => "historical run is invalid",
            Self::NoTestsExecuted => "runner executed no tests",
        })
    }
}

/// What mining one test target produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
    pub test_file: PathBuf,
    pub accepted: usize,
    pub aborted: Option<AbortReason>,
}

enum Step {
    Next,
    Accepted,
    Abort(AbortReason),
}

fn short(commit: &str) -> &str {
    commit.get(..10).unwrap_or(commit)
}

/// Drives tracing and differential execution for one repository.
pub struct Miner<'a> {
    workspace: &'a WorkspaceHandle,
    history: &'a mut dyn HistorySource,
    executor: &'a mut dyn TestExecutor,
    refresher: &'a dyn CheckoutRefresher,
    store: InstanceStore,
    construct_log: Option<ConstructLog>,
    formatter: Formatter,
    mode: UnittestMode,
    dataset: String,
    processed: HashSet<DedupKey>,
}

impl<'a> Miner<'a> {
    /// Create a miner; pairs already present in `store` count as processed.
    pub fn new(
        workspace: &'a WorkspaceHandle,
        history: &'a mut dyn HistorySource,
        executor: &'a mut dyn TestExecutor,
        refresher: &'a dyn CheckoutRefresher,
        store: InstanceStore,
    ) -> Self {
        let processed = store.dedup_keys().collect();
        Self {
            workspace,
            history,
            executor,
            refresher,
            store,
            construct_log: None,
            formatter: Formatter::default(),
            mode: UnittestMode::default(),
            dataset: "callee".to_string(),
            processed,
        }
    }

    pub fn with_mode(mut self, mode: UnittestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = dataset.into();
        self
    }

    pub fn with_formatter(mut self, formatter: Formatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_construct_log(mut self, log: ConstructLog) -> Self {
        self.construct_log = Some(log);
        self
    }

    pub fn store(&self) -> &InstanceStore {
        &self.store
    }

    pub fn into_store(self) -> InstanceStore {
        self.store
    }

    fn dedup_key(&self, test_file: &Path, unit: &CodeUnit) -> Result<DedupKey> {
        Ok(DedupKey {
            test_file: self.workspace.relative(test_file)?,
            kind: unit.kind,
            name: unit.name.clone(),
            unit_file: self.workspace.relative(&unit.file_path)?,
        })
    }

    /// History of `unit`, re-provisioning the checkout once if it broke.
    fn trace(&mut self, unit: &CodeUnit) -> Result<Vec<HistoryEntry>> {
        match self.history.function_history(&unit.file_path, &unit.name) {
            Err(e) if e.is_workspace_invalid() => {
                log::warn!("Tracing {} failed ({}); re-provisioning checkout", unit.name, e);
                self.refresher.refresh(self.workspace)?;
                self.history.function_history(&unit.file_path, &unit.name)
            }
            other => other,
        }
    }

    /// Current text of the declaring file, re-provisioning once on failure.
    fn current_source(&self, unit: &CodeUnit) -> Option<String> {
        if let Ok(source) = read_source_lossy(&unit.file_path) {
            return Some(source);
        }
        log::warn!(
            "Cannot read {}; re-provisioning checkout",
            unit.file_path.display()
        );
        if let Err(e) = self.refresher.refresh(self.workspace) {
            log::warn!("Re-provisioning failed: {}", e);
            return None;
        }
        read_source_lossy(&unit.file_path)
            .map_err(|e| log::warn!("Still cannot read {}: {}", unit.file_path.display(), e))
            .ok()
    }

    fn context_version(&self, unit: &CodeUnit, complete: &str) -> ContextVersion {
        ContextVersion {
            name: unit.file_name.clone(),
            filtered_code: remove_definition(complete, &unit.name, &self.formatter),
            complete_code: complete.to_string(),
        }
    }

    /// Mine every candidate of one test target.
    pub fn mine_target(&mut self, target: &TestTarget) -> Result<TargetReport> {
        let _file = set_test_file(&target.test_file);
        let mut report = TargetReport {
            test_file: target.test_file.clone(),
            accepted: 0,
            aborted: None,
        };

        if target.test_file.extension().and_then(|e| e.to_str()) != Some("py") {
            log::info!("Skipping {}: {}", target.test_file.display(), AbortReason::NotPython);
            report.aborted = Some(AbortReason::NotPython);
            return Ok(report);
        }

        let mut gold_cache: HashMap<PathBuf, ExecutionOutcome> = HashMap::new();
        for unit in &target.units {
            let _candidate = set_candidate(&unit.name);
            let key = self.dedup_key(&target.test_file, unit)?;
            if !self.processed.insert(key) {
                log::info!(
                    "Skipping {} {}: already processed for {}",
                    unit.kind,
                    unit.name,
                    target.test_file.display()
                );
                continue;
            }

            let history = self.trace(unit)?;
            if history.is_empty() {
                log::info!("Skipping {} {}: no historical versions", unit.kind, unit.name);
                continue;
            }
            let Some(current) = self.current_source(unit) else {
                continue;
            };

            for entry in &history {
                match self.mine_commit(target, unit, entry, &current, &mut gold_cache)? {
                    Step::Next => {}
                    Step::Accepted => report.accepted += 1,
                    Step::Abort(reason) => {
                        log::info!(
                            "Abandoning {} at commit {} ({}): {}",
                            target.test_file.display(),
                            short(&entry.commit),
                            unit.name,
                            reason
                        );
                        report.aborted = Some(reason);
                        return Ok(report);
                    }
                }
            }
        }
        Ok(report)
    }

    fn mine_commit(
        &mut self,
        target: &TestTarget,
        unit: &CodeUnit,
        entry: &HistoryEntry,
        current: &str,
        gold_cache: &mut HashMap<PathBuf, ExecutionOutcome>,
    ) -> Result<Step> {
        let commit = short(&entry.commit);
        let Some(original_code) = entry.code.as_deref() else {
            log::info!("Skipping commit {} for {}: code does not parse", commit, unit.name);
            return Ok(Step::Next);
        };
        if original_code == unit.source {
            log::info!("Skipping commit {} for {}: code unchanged", commit, unit.name);
            return Ok(Step::Next);
        }
        if entry.file_source == current {
            log::info!(
                "Skipping commit {} for {}: context of {} unchanged",
                commit,
                unit.name,
                unit.file_name
            );
            return Ok(Step::Next);
        }

        let gold = match gold_cache.get(&unit.file_path) {
            Some(cached) => {
                log::debug!("Reusing gold result for {}", unit.file_path.display());
                cached.clone()
            }
            None => {
                let _phase = set_phase(MiningPhase::GoldEvaluation);
                let outcome = self.executor.execute(&ExecutionRequest {
                    unit,
                    test_file: &target.test_file,
                    candidate: &unit.source,
                    context: current,
                    role: RunRole::Gold,
                })?;
                gold_cache.insert(unit.file_path.clone(), outcome.clone());
                outcome
            }
        };

        match &gold {
            ExecutionOutcome::TimedOut => return Ok(Step::Abort(AbortReason::GoldTimedOut)),
            ExecutionOutcome::Invalid(reason) => {
                log::info!("Gold run of {} is invalid: {}", unit.name, reason);
                return Ok(Step::Abort(AbortReason::GoldInvalid));
            }
            ExecutionOutcome::Passed(report) | ExecutionOutcome::Failed(report)
                if report.summary.passed() == 0 =>
            {
                return Ok(Step::Abort(AbortReason::GoldNoPassingTests));
            }
            ExecutionOutcome::Failed(_) => return Ok(Step::Abort(AbortReason::GoldFailed)),
            ExecutionOutcome::Passed(_) => {}
        }

        let original = {
            let _phase = set_phase(MiningPhase::OriginalEvaluation);
            self.executor.execute(&ExecutionRequest {
                unit,
                test_file: &target.test_file,
                candidate: original_code,
                context: current,
                role: RunRole::History,
            })?
        };
        match &original {
            ExecutionOutcome::TimedOut => {
                log::info!("Skipping commit {} for {}: historical run timed out", commit, unit.name);
                return Ok(Step::Next);
            }
            ExecutionOutcome::Invalid(reason) => {
                log::info!("Historical run of {} is invalid: {}", unit.name, reason);
                return Ok(Step::Abort(AbortReason::OriginalInvalid));
            }
            ExecutionOutcome::Passed(_) | ExecutionOutcome::Failed(_) => {}
        }

        if gold.reported_empty_run() || original.reported_empty_run() {
            return Ok(Step::Abort(AbortReason::NoTestsExecuted));
        }

        let old_context = self.context_version(unit, &entry.file_source);
        let new_context = self.context_version(unit, current);
        let instance = match Instance::build(Acceptance {
            dataset: &self.dataset,
            workspace: self.workspace,
            unit,
            test_file: &target.test_file,
            entry,
            old_context,
            new_context,
            gold: &gold,
            original: &original,
        }) {
            Ok(instance) => instance,
            Err(e) => {
                log::warn!("Skipping commit {} for {}: {}", commit, unit.name, e);
                return Ok(Step::Next);
            }
        };

        if !self.mode.accepts(instance.test_type) {
            log::info!(
                "Skipping commit {} for {}: {} excluded by mode",
                commit,
                unit.name,
                instance.test_type
            );
            return Ok(Step::Next);
        }

        self.accept(instance, &gold, &original)?;
        Ok(Step::Accepted)
    }

    fn accept(
        &mut self,
        instance: Instance,
        gold: &ExecutionOutcome,
        original: &ExecutionOutcome,
    ) -> Result<()> {
        let _phase = set_phase(MiningPhase::Checkpoint);
        log::info!(
            "Accepted {} at commit {} as {}",
            instance.unit.name,
            short(&instance.commit.id),
            instance.test_type
        );
        if let (Some(construct_log), Some(gold), Some(original)) =
            (self.construct_log.as_mut(), gold.report(), original.report())
        {
            construct_log.record(&instance, &gold.run, &original.run)?;
        }
        if self.store.push(instance) {
            self.store.checkpoint()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_commit() {
        assert_eq!(short("0123456789abcdef"), "0123456789");
        assert_eq!(short("abc"), "abc");
    }

    #[test]
    fn test_abort_reasons_read_as_sentences() {
        assert_eq!(AbortReason::GoldTimedOut.to_string(), "gold run timed out");
        assert_eq!(
            AbortReason::NoTestsExecuted.to_string(),
            "runner executed no tests"
        );
    }
}
