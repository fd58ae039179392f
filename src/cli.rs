use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{CommitTraceMode, ExecutionMethod, UnittestMode};
use crate::execution::TestRunner;

#[derive(Parser, Debug)]
#[command(name = "syncforge")]
#[command(about = "Mine git history for out-of-sync Python functions", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (can be repeated: -v, -vv, -vvv)
    ///
    /// -v: info, -vv: debug, -vvv: trace. RUST_LOG takes precedence.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,
}

/// Values that override `.syncforge.toml`.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct MiningOverrides {
    /// Transition types accepted into the dataset
    #[arg(long = "unittest-mode", value_enum)]
    pub unittest_mode: Option<UnittestMode>,

    /// Examine every historical version or only the oldest
    #[arg(long = "commit-trace", value_enum)]
    pub commit_trace: Option<CommitTraceMode>,

    /// Run tests in containers or in a local virtual environment
    #[arg(long = "execution", value_enum)]
    pub execution: Option<ExecutionMethod>,

    /// Per-run timeout in seconds
    #[arg(long = "timeout")]
    pub timeout: Option<u64>,

    /// Apply the strict candidate filter
    #[arg(long = "strict-filter")]
    pub strict_filter: bool,

    /// Root directory for workspaces and datasets
    #[arg(long = "work-root")]
    pub work_root: Option<PathBuf>,

    /// Configuration file (defaults to the nearest .syncforge.toml)
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Mine repositories from a registry into benchmark instances
    Mine {
        /// JSON registry of repositories
        #[arg(long)]
        registry: PathBuf,

        /// Only mine the repository with this id
        #[arg(long = "repo-id", conflicts_with_all = ["start", "end"])]
        repo_id: Option<String>,

        /// First registry index to mine (0-based, inclusive)
        #[arg(long)]
        start: Option<usize>,

        /// Registry index to stop at (exclusive)
        #[arg(long)]
        end: Option<usize>,

        #[command(flatten)]
        overrides: MiningOverrides,
    },

    /// Print the history of one function as JSON
    Trace {
        /// Git checkout to trace in
        #[arg(long)]
        repo: PathBuf,

        /// Declaring file, relative to the checkout or absolute
        #[arg(long)]
        file: PathBuf,

        /// Function or method name
        #[arg(long)]
        name: String,

        /// Only report the oldest version
        #[arg(long)]
        oldest: bool,
    },

    /// Normalize a captured test runner log
    ParseOutput {
        /// Runner that produced the log
        #[arg(long, value_enum)]
        runner: TestRunner,

        /// Captured output (stdout, or both streams for unittest)
        file: PathBuf,

        /// Exit code of the run, used to grade it
        #[arg(long = "exit-code")]
        exit_code: Option<i32>,
    },
}
