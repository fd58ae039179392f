//! Differential test execution and result normalization.

pub mod executor;
pub mod local;
pub mod normalizer;
pub mod outcome;
pub mod runner;
pub mod summary;

pub use executor::{ExecutionRequest, SandboxExecutor, TestExecutor, TestInvocation};
pub use local::LocalVenvExecutor;
pub use normalizer::{parse_pytest, parse_unittest, strip_ansi};
pub use outcome::{interpret_run, ExecutionOutcome, ExecutionReport, InvalidReason, RawRun, RunRole};
pub use runner::TestRunner;
pub use summary::{OutcomeCounts, TestResultSummary};
