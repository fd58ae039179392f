//! Interpretation of one finished test run.

use serde::{Deserialize, Serialize};

use super::runner::TestRunner;
use super::summary::TestResultSummary;
use crate::sandbox::ProcessOutput;

/// Captured process result, as stored in datasets and construction logs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRun {
    pub returncode: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl From<ProcessOutput> for RawRun {
    fn from(output: ProcessOutput) -> Self {
        Self {
            returncode: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

/// A run that produced a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub summary: TestResultSummary,
    /// Runner-dependent human-readable log (stdout or stderr)
    pub comment: String,
    pub run: RawRun,
    /// Tests the runner reported before any collection-error substitution
    pub tests_executed: u32,
}

impl ExecutionReport {
    /// The runner explicitly reported that it found nothing to run.
    pub fn reported_empty_run(&self) -> bool {
        self.run.stderr.contains("Ran 0 tests in")
            || self.run.stdout.contains("Ran 0 tests in")
            || self.run.stdout.contains("no tests ran")
    }
}

/// Why a run cannot be used at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    /// The assembled command exceeds the platform's argument limit
    CommandTooLong { length: usize, limit: usize },
    /// The run finished without producing any output or exit status
    NoResult,
    /// The test file exercised nothing
    NoTestsExecuted,
}

impl std::fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CommandTooLong { length, limit } => {
                write!(f, "command length {} exceeds ARG_MAX {}", length, limit)
            }
            Self::NoResult => f.write_str("run produced no result"),
            Self::NoTestsExecuted => f.write_str("no tests were executed"),
        }
    }
}

/// Result of one differential test run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Passed(ExecutionReport),
    Failed(ExecutionReport),
    TimedOut,
    Invalid(InvalidReason),
}

impl ExecutionOutcome {
    pub fn report(&self) -> Option<&ExecutionReport> {
        match self {
            Self::Passed(report) | Self::Failed(report) => Some(report),
            Self::TimedOut | Self::Invalid(_) => None,
        }
    }

    /// 1 for a passing run, 0 for a failing one.
    pub fn grade(&self) -> Option<u8> {
        match self {
            Self::Passed(_) => Some(1),
            Self::Failed(_) => Some(0),
            Self::TimedOut | Self::Invalid(_) => None,
        }
    }

    pub fn tests_executed(&self) -> u32 {
        self.report().map_or(0, |r| r.tests_executed)
    }

    pub fn reported_empty_run(&self) -> bool {
        self.report().is_some_and(ExecutionReport::reported_empty_run)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Passed(_) => "passed",
            Self::Failed(_) => "failed",
            Self::TimedOut => "timeout",
            Self::Invalid(_) => "invalid",
        }
    }
}

/// Whether a run evaluates the current (gold) code or a historical version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunRole {
    Gold,
    History,
}

/// Turn a finished process into an outcome.
///
/// A gold run with no tests is invalid. A historical run with no tests is
/// recorded as a failure with a single error, since the stale code most
/// likely broke collection.
pub fn interpret_run(runner: TestRunner, role: RunRole, output: ProcessOutput) -> ExecutionOutcome {
    if output.timed_out {
        return ExecutionOutcome::TimedOut;
    }
    if output.exit_code.is_none() && output.stdout.is_empty() && output.stderr.is_empty() {
        return ExecutionOutcome::Invalid(InvalidReason::NoResult);
    }

    let parsed = runner.parse(&output.stdout, &output.stderr);
    let tests_executed = parsed.total();

    if tests_executed == 0 {
        return match role {
            RunRole::Gold => ExecutionOutcome::Invalid(InvalidReason::NoTestsExecuted),
            RunRole::History => ExecutionOutcome::Failed(ExecutionReport {
                summary: TestResultSummary::collection_error(),
                comment: output.stderr.clone(),
                run: output.into(),
                tests_executed,
            }),
        };
    }

    let comment = runner.comment(&output.stdout, &output.stderr, output.exit_code, tests_executed);
    let passed = output.exit_code == Some(0);
    let report = ExecutionReport {
        summary: parsed,
        comment,
        run: output.into(),
        tests_executed,
    };
    if passed {
        ExecutionOutcome::Passed(report)
    } else {
        ExecutionOutcome::Failed(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(exit_code: i32, stdout: &str, stderr: &str) -> ProcessOutput {
        ProcessOutput {
            exit_code: Some(exit_code),
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out: false,
        }
    }

    #[test]
    fn test_failing_pytest_run_grades_zero() {
        let outcome = interpret_run(
            TestRunner::Pytest,
            RunRole::History,
            finished(1, "3 passed, 1 failed, 2 warnings", ""),
        );
        assert_eq!(outcome.grade(), Some(0));
        let report = outcome.report().unwrap();
        assert_eq!(report.summary.total(), 6);
        assert_eq!(report.comment, "3 passed, 1 failed, 2 warnings");
        assert_eq!(report.run.returncode, Some(1));
    }

    #[test]
    fn test_timeout_and_missing_result() {
        let timed_out = ProcessOutput {
            timed_out: true,
            ..Default::default()
        };
        assert_eq!(
            interpret_run(TestRunner::Pytest, RunRole::Gold, timed_out),
            ExecutionOutcome::TimedOut
        );
        assert_eq!(
            interpret_run(TestRunner::Pytest, RunRole::Gold, ProcessOutput::default()),
            ExecutionOutcome::Invalid(InvalidReason::NoResult)
        );
    }

    #[test]
    fn test_zero_tests_depends_on_role() {
        let output = finished(2, "", "ImportError: cannot import name 'compute'");
        assert_eq!(
            interpret_run(TestRunner::Pytest, RunRole::Gold, output.clone()),
            ExecutionOutcome::Invalid(InvalidReason::NoTestsExecuted)
        );

        let history = interpret_run(TestRunner::Pytest, RunRole::History, output);
        let report = history.report().unwrap();
        assert_eq!(history.grade(), Some(0));
        assert_eq!(report.summary.error(), 1);
        assert_eq!(report.summary.total(), 1);
        assert_eq!(report.tests_executed, 0);
        assert!(report.comment.contains("ImportError"));
        assert!(!history.reported_empty_run());
    }

    #[test]
    fn test_explicit_empty_unittest_run_is_flagged() {
        let outcome = interpret_run(
            TestRunner::Unittest,
            RunRole::History,
            finished(5, "", "\nRan 0 tests in 0.000s\n\nNO TESTS RAN\n"),
        );
        assert!(outcome.reported_empty_run());
    }

    #[test]
    fn test_unittest_pass_uses_stderr_comment() {
        let outcome = interpret_run(
            TestRunner::Unittest,
            RunRole::Gold,
            finished(0, "", "..\nRan 2 tests in 0.01s\n\nOK\n"),
        );
        assert_eq!(outcome.grade(), Some(1));
        assert!(outcome.report().unwrap().comment.contains("Ran 2 tests"));
    }
}
