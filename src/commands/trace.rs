use anyhow::{Context, Result};
use std::path::Path;

use crate::config::{load_config, CommitTraceMode};
use crate::history::{CommitHistoryTracer, HistoryEntry, WorkspaceHandle};
use crate::python::Formatter;

/// History of `name` in `file` inside the checkout at `repo`.
pub fn trace_function(repo: &Path, file: &Path, name: &str, oldest: bool) -> Result<Vec<HistoryEntry>> {
    let repo = repo
        .canonicalize()
        .with_context(|| format!("Checkout {} does not exist", repo.display()))?;
    let file = if file.is_absolute() {
        file.to_path_buf()
    } else {
        repo.join(file)
    };
    let config = load_config();
    let mode = if oldest {
        CommitTraceMode::Oldest
    } else {
        config.mining.commit_trace
    };

    let tracer = CommitHistoryTracer::new(
        WorkspaceHandle::for_checkout(&repo),
        Formatter::from_config(&config.formatter),
        mode,
    );
    tracer
        .trace(&file, name)
        .with_context(|| format!("Failed to trace {} in {}", name, file.display()))
}
