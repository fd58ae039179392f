//! CLI command implementations.
//!
//! - **mine**: mine every selected registry repository into a dataset
//! - **trace**: print the history of one function
//! - **parse-output**: normalize a captured runner log

pub mod mine;
pub mod parse_output;
pub mod trace;

pub use mine::{apply_overrides, resolve_config, run_mine, select_repos, MineConfig};
pub use parse_output::{parse_output, ParsedLog};
pub use trace::trace_function;
