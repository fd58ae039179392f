use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::normalizer::{parse_pytest, parse_unittest};
use super::summary::TestResultSummary;

/// Python test runner used by a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TestRunner {
    /// `python -m unittest`
    Unittest,
    /// `python -m pytest`
    Pytest,
}

impl TestRunner {
    pub fn module(self) -> &'static str {
        match self {
            Self::Unittest => "unittest",
            Self::Pytest => "pytest",
        }
    }

    /// Packages installed into every environment for this runner.
    pub fn packages(self) -> &'static [&'static str] {
        match self {
            Self::Unittest => &["pytest-asyncio"],
            Self::Pytest => &["pytest", "pytest-asyncio"],
        }
    }

    /// Normalize captured runner output.
    pub fn parse(self, stdout: &str, stderr: &str) -> TestResultSummary {
        match self {
            Self::Pytest => parse_pytest(stdout),
            // unittest reports on stderr
            Self::Unittest => parse_unittest(&format!("{}\n{}", stdout, stderr)),
        }
    }

    /// Text kept as the human-readable log of a run.
    pub fn comment(self, stdout: &str, stderr: &str, exit_code: Option<i32>, total: u32) -> String {
        match self {
            Self::Unittest => stderr.to_string(),
            Self::Pytest if exit_code != Some(0) && total == 0 => stderr.to_string(),
            Self::Pytest => stdout.to_string(),
        }
    }
}

impl std::fmt::Display for TestRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.module())
    }
}

impl FromStr for TestRunner {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unittest" => Ok(Self::Unittest),
            "pytest" => Ok(Self::Pytest),
            other => Err(format!("unknown test runner: {}", other)),
        }
    }
}
