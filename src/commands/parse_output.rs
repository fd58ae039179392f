use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use crate::execution::{TestResultSummary, TestRunner};
use crate::python::read_source_lossy;

/// A normalized runner log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedLog {
    pub runner: TestRunner,
    pub summary: TestResultSummary,
    /// 1 when the run exited with 0; absent without an exit code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<u8>,
}

pub fn parse_output(runner: TestRunner, file: &Path, exit_code: Option<i32>) -> Result<ParsedLog> {
    let log = read_source_lossy(file)?;
    Ok(ParsedLog {
        runner,
        summary: runner.parse(&log, ""),
        grade: exit_code.map(|code| u8::from(code == 0)),
    })
}
