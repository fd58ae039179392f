//! Thread-local context tracking for crash reports.
//!
//! Records which mining phase is running and which test file and candidate
//! are being processed. Atomic counters track test-target progress.
//! Context guards use RAII for automatic cleanup on drop.

use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

static TARGETS_PROCESSED: AtomicUsize = AtomicUsize::new(0);
static TARGETS_TOTAL: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static CURRENT_CONTEXT: RefCell<MiningContext> = const { RefCell::new(MiningContext::new()) };
}

/// Snapshot of what the miner was doing.
#[derive(Debug, Clone, Default)]
pub struct MiningContext {
    pub phase: Option<MiningPhase>,
    pub repository: Option<String>,
    pub test_file: Option<PathBuf>,
    pub candidate: Option<String>,
}

impl MiningContext {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: None,
            repository: None,
            test_file: None,
            candidate: None,
        }
    }
}

/// Major stages of mining one repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiningPhase {
    Provisioning,
    Discovery,
    Tracing,
    GoldEvaluation,
    OriginalEvaluation,
    Checkpoint,
    Cleanup,
}

impl std::fmt::Display for MiningPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provisioning => write!(f, "provisioning"),
            Self::Discovery => write!(f, "discovery"),
            Self::Tracing => write!(f, "tracing"),
            Self::GoldEvaluation => write!(f, "gold_evaluation"),
            Self::OriginalEvaluation => write!(f, "original_evaluation"),
            Self::Checkpoint => write!(f, "checkpoint"),
            Self::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// RAII guard restoring the previous context on drop.
pub struct ContextGuard {
    previous: MiningContext,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CURRENT_CONTEXT.with(|ctx| {
            *ctx.borrow_mut() = self.previous.clone();
        });
    }
}

fn update(apply: impl FnOnce(&mut MiningContext)) -> ContextGuard {
    CURRENT_CONTEXT.with(|ctx| {
        let previous = ctx.borrow().clone();
        apply(&mut ctx.borrow_mut());
        ContextGuard { previous }
    })
}

/// Set the current phase; the previous one is restored when the guard drops.
#[must_use]
pub fn set_phase(phase: MiningPhase) -> ContextGuard {
    update(|ctx| ctx.phase = Some(phase))
}

#[must_use]
pub fn set_repository(label: impl Into<String>) -> ContextGuard {
    let label = label.into();
    update(|ctx| ctx.repository = Some(label))
}

#[must_use]
pub fn set_test_file(path: impl Into<PathBuf>) -> ContextGuard {
    let path = path.into();
    update(|ctx| ctx.test_file = Some(path))
}

#[must_use]
pub fn set_candidate(name: impl Into<String>) -> ContextGuard {
    let name = name.into();
    update(|ctx| ctx.candidate = Some(name))
}

pub fn set_progress(processed: usize, total: usize) {
    TARGETS_PROCESSED.store(processed, Ordering::Relaxed);
    TARGETS_TOTAL.store(total, Ordering::Relaxed);
}

pub fn increment_processed() {
    TARGETS_PROCESSED.fetch_add(1, Ordering::Relaxed);
}

/// Called by the panic hook to include context in crash reports.
#[must_use]
pub fn get_current_context() -> MiningContext {
    CURRENT_CONTEXT.with(|ctx| ctx.borrow().clone())
}

#[must_use]
pub fn get_progress() -> (usize, usize) {
    (
        TARGETS_PROCESSED.load(Ordering::Relaxed),
        TARGETS_TOTAL.load(Ordering::Relaxed),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guards_nest_and_restore() {
        {
            let _phase = set_phase(MiningPhase::Tracing);
            {
                let _file = set_test_file("tests/test_core.py");
                let _candidate = set_candidate("compute");
                let ctx = get_current_context();
                assert_eq!(ctx.phase, Some(MiningPhase::Tracing));
                assert_eq!(ctx.candidate.as_deref(), Some("compute"));
            }
            let ctx = get_current_context();
            assert!(ctx.test_file.is_none());
            assert!(ctx.candidate.is_none());
            assert_eq!(ctx.phase, Some(MiningPhase::Tracing));
        }
        assert!(get_current_context().phase.is_none());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(MiningPhase::GoldEvaluation.to_string(), "gold_evaluation");
    }
}
