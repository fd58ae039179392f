//! Observability infrastructure for crash reports and debugging.
//!
//! - **Panic Hook**: produces structured crash reports with context
//! - **Context Tracking**: thread-local mining phase, test file and candidate
//! - **Progress Tracking**: atomic counters over test targets
//!
//! ```ignore
//! use syncforge::observability::{set_phase, set_test_file, MiningPhase};
//!
//! let _phase = set_phase(MiningPhase::GoldEvaluation);
//! let _file = set_test_file(&target.test_file);
//! // a panic here reports both
//! ```

pub mod context;
pub mod panic_hook;

pub use context::{
    get_current_context, get_progress, increment_processed, set_candidate, set_phase,
    set_progress, set_repository, set_test_file, ContextGuard, MiningContext, MiningPhase,
};
pub use panic_hook::install_panic_hook;
