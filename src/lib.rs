// Export modules for library usage
pub mod cli;
pub mod commands;
pub mod config;
pub mod errors;
pub mod execution;
pub mod history;
pub mod mining;
pub mod observability;
pub mod python;
pub mod sandbox;

// Re-export commonly used types
pub use crate::errors::{Error, Result};

pub use crate::config::{RepoSpec, SyncforgeConfig};

pub use crate::execution::{ExecutionOutcome, TestResultSummary, TestRunner};

pub use crate::history::{CommitHistoryTracer, HistoryEntry, WorkspaceHandle};

pub use crate::mining::{mine_repository, Instance, Miner, MiningSummary, TestType};

pub use crate::python::{align, CodeUnit, UnitExtractor};
