use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::retry::RetryConfig;
use crate::mining::instance::TestType;

/// Root of `.syncforge.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncforgeConfig {
    #[serde(default)]
    pub mining: MiningConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub formatter: FormatterConfig,

    #[serde(default)]
    pub paths: PathsConfig,
}

/// Which transition types are accepted into the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum UnittestMode {
    #[default]
    Both,
    FailToPass,
    PassToPass,
}

impl UnittestMode {
    pub fn accepts(self, test_type: TestType) -> bool {
        match self {
            Self::Both => true,
            Self::FailToPass => test_type == TestType::FailToPass,
            Self::PassToPass => test_type == TestType::PassToPass,
        }
    }
}

/// How much of a function's history is examined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CommitTraceMode {
    /// Every commit that touched the declaring file
    #[default]
    All,
    /// Only the oldest recorded version
    Oldest,
}

/// Where candidate code is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMethod {
    #[default]
    Sandbox,
    LocalVenv,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningConfig {
    #[serde(default)]
    pub unittest_mode: UnittestMode,

    #[serde(default)]
    pub commit_trace: CommitTraceMode,

    #[serde(default)]
    pub execution: ExecutionMethod,

    /// Per-run wall clock limit (default: 600)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Stop discovery once this many test targets are collected
    #[serde(default = "default_max_extracted_targets")]
    pub max_extracted_targets: usize,

    /// Apply the strict candidate filter during extraction
    #[serde(default)]
    pub strict_unit_filter: bool,

    /// Dataset label written into instance ids
    #[serde(default = "default_dataset")]
    pub dataset: String,

    /// Glob patterns (relative to the checkout) skipped during discovery
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            unittest_mode: UnittestMode::default(),
            commit_trace: CommitTraceMode::default(),
            execution: ExecutionMethod::default(),
            timeout_seconds: default_timeout_seconds(),
            max_extracted_targets: default_max_extracted_targets(),
            strict_unit_filter: false,
            dataset: default_dataset(),
            exclude: default_exclude(),
        }
    }
}

impl MiningConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Container runtime program (default: docker)
    #[serde(default = "default_runtime")]
    pub runtime: String,

    /// Namespace prefix of locally built images
    #[serde(default = "default_image_namespace")]
    pub image_namespace: String,

    /// Working directory inside the image
    #[serde(default = "default_workdir")]
    pub workdir: String,

    /// Keep built images after a repository has been mined
    #[serde(default)]
    pub keep_image: bool,

    /// Push built images under this user namespace when set
    #[serde(default)]
    pub publish_namespace: Option<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            runtime: default_runtime(),
            image_namespace: default_image_namespace(),
            workdir: default_workdir(),
            keep_image: false,
            publish_namespace: None,
        }
    }
}

/// External formatter invocation; `None` selects the built-in normalizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatterConfig {
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_work_root")]
    pub work_root: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            work_root: default_work_root(),
        }
    }
}

fn default_timeout_seconds() -> u64 {
    600
}

fn default_max_extracted_targets() -> usize {
    1_000_000
}

fn default_dataset() -> String {
    "callee".to_string()
}

fn default_exclude() -> Vec<String> {
    vec![
        "**/.git/**".to_string(),
        "**/venv/**".to_string(),
        "**/.venv/**".to_string(),
        "**/site-packages/**".to_string(),
    ]
}

fn default_runtime() -> String {
    "docker".to_string()
}

fn default_image_namespace() -> String {
    "syncforge".to_string()
}

fn default_workdir() -> String {
    "/workspace".to_string()
}

fn default_work_root() -> PathBuf {
    PathBuf::from("./syncforge_build")
}
