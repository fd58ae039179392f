//! Shared fixtures: a scratch checkout plus scripted collaborators for the miner.
#![allow(dead_code)]

use std::cell::Cell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use syncforge::config::RepoIdentity;
use syncforge::errors::{Error, Result};
use syncforge::execution::{
    ExecutionOutcome, ExecutionReport, ExecutionRequest, OutcomeCounts, RawRun, RunRole,
    TestExecutor, TestResultSummary,
};
use syncforge::history::{HistoryEntry, HistorySource, WorkspaceHandle};
use syncforge::mining::TestTarget;
use syncforge::python::{CodeUnit, ContextFile, UnitKind};
use syncforge::sandbox::CheckoutRefresher;
use tempfile::TempDir;

pub const GOLD: &str = "def compute(x):\n    return x * 2\n";
pub const STALE: &str = "def compute(x):\n    return x + 1\n";

pub const CURRENT_FILE: &str =
    "import math\n\n\ndef compute(x):\n    return x * 2\n\n\ndef helper(y):\n    return math.floor(y)\n";
pub const OLD_FILE: &str =
    "import math\n\n\ndef compute(x):\n    return x + 1\n\n\ndef helper(y):\n    return math.floor(y)\n";

pub fn identity() -> RepoIdentity {
    RepoIdentity {
        id: "7".into(),
        name: "widgets".into(),
        url: "https://example.invalid/widgets.git".into(),
    }
}

/// A checkout with `calc.py` and `tests/test_calc.py`.
pub struct Checkout {
    pub temp: TempDir,
    pub workspace: WorkspaceHandle,
}

impl Checkout {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let workspace = WorkspaceHandle::new(temp.path().join("work"), temp.path().join("repo"));
        let checkout = Self { temp, workspace };
        checkout.write("calc.py", CURRENT_FILE);
        checkout.write(
            "tests/test_calc.py",
            "from calc import compute\n\n\ndef test_compute():\n    assert compute(2) == 4\n",
        );
        checkout
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.workspace.repo_dir().join(relative)
    }

    pub fn write(&self, relative: &str, contents: &str) {
        let path = self.path(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    pub fn unit(&self, name: &str, source: &str) -> CodeUnit {
        let path = self.path("calc.py");
        CodeUnit::new(
            UnitKind::Function,
            name,
            &path,
            identity(),
            source,
            vec![ContextFile {
                name: "calc.py".into(),
                path: path.clone(),
                code: CURRENT_FILE.into(),
            }],
        )
        .unwrap()
    }

    pub fn target(&self, units: Vec<CodeUnit>) -> TestTarget {
        TestTarget {
            test_file: self.path("tests/test_calc.py"),
            module_file: self.path("calc.py"),
            units,
        }
    }
}

pub fn entry(commit: &str, code: Option<&str>, file_source: &str) -> HistoryEntry {
    HistoryEntry {
        commit: commit.to_string(),
        message: format!("change {}", commit),
        author: "Dev <dev@example.com>".into(),
        date: "2024-03-01 10:00:00+00:00".into(),
        log: format!("commit {}\n", commit),
        code: code.map(str::to_string),
        file_source: file_source.to_string(),
    }
}

/// A stale version of `compute` at `commit` in an otherwise changed file.
pub fn stale_entry(commit: &str) -> HistoryEntry {
    entry(commit, Some(STALE), OLD_FILE)
}

fn report(counts: OutcomeCounts, stdout: &str, stderr: &str, returncode: i32) -> ExecutionReport {
    let summary = TestResultSummary::new(counts);
    ExecutionReport {
        summary,
        comment: stdout.to_string(),
        run: RawRun {
            returncode: Some(returncode),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        },
        tests_executed: summary.total(),
    }
}

pub fn passed(passed: u32) -> ExecutionOutcome {
    let counts = OutcomeCounts {
        passed,
        ..Default::default()
    };
    ExecutionOutcome::Passed(report(counts, &format!("{} passed in 0.01s", passed), "", 0))
}

pub fn failed(passed: u32, failed: u32) -> ExecutionOutcome {
    let counts = OutcomeCounts {
        passed,
        failed,
        ..Default::default()
    };
    let stdout = format!("{} failed, {} passed in 0.02s", failed, passed);
    ExecutionOutcome::Failed(report(counts, &stdout, "", 1))
}

/// A unittest run that printed `Ran 0 tests in`.
pub fn empty_unittest_run() -> ExecutionOutcome {
    let counts = OutcomeCounts {
        error: 1,
        ..Default::default()
    };
    ExecutionOutcome::Failed(report(counts, "", "\nRan 0 tests in 0.000s\n\nOK\n", 5))
}

/// Replays a fixed history; the first `failures` calls report a broken checkout.
pub struct ScriptedHistory {
    pub entries: Vec<HistoryEntry>,
    pub failures: usize,
    pub calls: Vec<String>,
}

impl ScriptedHistory {
    pub fn new(entries: Vec<HistoryEntry>) -> Self {
        Self {
            entries,
            failures: 0,
            calls: Vec::new(),
        }
    }
}

impl HistorySource for ScriptedHistory {
    fn function_history(&mut self, file_path: &Path, name: &str) -> Result<Vec<HistoryEntry>> {
        self.calls.push(name.to_string());
        if self.failures > 0 {
            self.failures -= 1;
            return Err(Error::workspace(file_path, "checkout vanished"));
        }
        Ok(self.entries.clone())
    }
}

/// Answers gold runs with one outcome and historical runs from a queue.
pub struct ScriptedExecutor {
    pub gold: ExecutionOutcome,
    pub history: VecDeque<ExecutionOutcome>,
    pub calls: Vec<(RunRole, String)>,
}

impl ScriptedExecutor {
    pub fn new(gold: ExecutionOutcome, history: Vec<ExecutionOutcome>) -> Self {
        Self {
            gold,
            history: history.into(),
            calls: Vec::new(),
        }
    }

    pub fn calls_for(&self, role: RunRole) -> usize {
        self.calls.iter().filter(|(r, _)| *r == role).count()
    }
}

impl TestExecutor for ScriptedExecutor {
    fn execute(&mut self, request: &ExecutionRequest<'_>) -> Result<ExecutionOutcome> {
        self.calls.push((request.role, request.candidate.to_string()));
        match request.role {
            RunRole::Gold => Ok(self.gold.clone()),
            RunRole::History => Ok(self
                .history
                .pop_front()
                .unwrap_or_else(|| failed(0, 1))),
        }
    }
}

#[derive(Default)]
pub struct CountingRefresher {
    pub count: Cell<usize>,
}

impl CheckoutRefresher for CountingRefresher {
    fn refresh(&self, _workspace: &WorkspaceHandle) -> Result<()> {
        self.count.set(self.count.get() + 1);
        Ok(())
    }
}
