//! Cloud mirror seam for cross-device replication.
//!
//! # Responsibility
//! - Define the provider contract the store mirrors committed changes to.
//! - Provide an in-process provider for tests and local multi-device runs.
//!
//! # Invariants
//! - Providers never see partial change sets; one push carries one commit.
//! - Pull results are ordered by change token.

pub mod memory;
pub mod options;
pub mod provider;

pub use memory::InMemoryCloud;
pub use options::{CloudSyncOptions, OptionsError};
pub use provider::{
    ChangeToken, CloudError, CloudPullRequest, CloudPullResult, CloudPushRequest,
    CloudPushResult, CloudResult, CloudSyncProvider, RemoteChange, RemoteRecord, SyncStage,
};
