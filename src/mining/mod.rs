//! Instance mining: target discovery, the filtering state machine, and the
//! checkpointed dataset it produces.

pub mod construct_log;
pub mod discovery;
pub mod instance;
pub mod miner;
pub mod pipeline;
pub mod store;

pub use construct_log::{ConstructLog, ConstructRecord};
pub use discovery::{imported_modules, is_test_name, TargetDiscovery, TestTarget};
pub use instance::{
    instance_id, unified_diff, Acceptance, CommitRecord, ContextVersion, DedupKey, Instance,
    TestType, UnitRecord,
};
pub use miner::{AbortReason, Miner, TargetReport};
pub use pipeline::{mine_repository, MiningSummary};
pub use store::InstanceStore;
