//! Configuration: `.syncforge.toml`, the retry policy, and the repository registry.

mod core;
mod loader;
pub mod registry;
pub mod retry;

pub use core::{
    CommitTraceMode, ExecutionMethod, FormatterConfig, MiningConfig, PathsConfig, SandboxConfig,
    SyncforgeConfig, UnittestMode,
};
pub use loader::{
    directory_ancestors, discover_config, load_config, load_config_from, parse_config,
    CONFIG_FILE_NAME,
};
pub use registry::{load_registry, parse_registry, RepoIdentity, RepoSpec};
pub use retry::{RetryConfig, RetryStrategy};
