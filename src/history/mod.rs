//! Git history of candidate functions and the workspace that holds the checkout.

pub mod tracer;
pub mod workspace;

pub use tracer::{render_show, CommitHistoryTracer, HistoryEntry, HistorySource};
pub use workspace::WorkspaceHandle;
