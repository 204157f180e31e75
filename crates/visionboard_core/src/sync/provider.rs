//! Provider contract and wire types for the cloud mirror.

use crate::model::dream::{Dream, DreamField, DreamId};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub type CloudResult<T> = Result<T, CloudError>;

/// Opaque, monotonically increasing position in a provider's change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeToken(pub u64);

impl Display for ChangeToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChangeToken {
    type Err = std::num::ParseIntError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value.trim().parse().map(Self)
    }
}

/// One replicated change.
///
/// `Upsert` carries a new record in full. `Update` carries the committed
/// record but only `fields` are applied on import, so edits to disjoint
/// fields on two devices both survive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteChange {
    Upsert { dream: Dream },
    Update { dream: Dream, fields: Vec<DreamField> },
    Delete { id: DreamId },
}

impl RemoteChange {
    pub fn dream_id(&self) -> DreamId {
        match self {
            Self::Upsert { dream } | Self::Update { dream, .. } => dream.id,
            Self::Delete { id } => *id,
        }
    }
}

/// A change as stored by the provider, stamped with its author device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub device_id: String,
    pub change: RemoteChange,
}

/// Sync pipeline stage, used for error attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Push,
    Pull,
}

impl SyncStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pull => "pull",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudPushRequest {
    pub device_id: String,
    pub changes: Vec<RemoteChange>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudPushResult {
    pub accepted_count: u32,
    /// Token of the last accepted change.
    pub change_token: Option<ChangeToken>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudPullRequest {
    pub device_id: String,
    /// Exclusive lower bound; `None` pulls from the beginning.
    pub after: Option<ChangeToken>,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudPullResult {
    /// Changes authored by other devices, oldest first.
    pub records: Vec<RemoteRecord>,
    /// Token to resume from; covers skipped own-device records too.
    pub next_token: Option<ChangeToken>,
    pub has_more: bool,
}

/// Provider failure envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudError {
    pub container: String,
    pub stage: SyncStage,
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl CloudError {
    pub fn new(
        container: impl Into<String>,
        stage: SyncStage,
        code: impl Into<String>,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self {
            container: container.into(),
            stage,
            code: code.into(),
            message: message.into(),
            retryable,
        }
    }
}

impl Display for CloudError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cloud {} failed for `{}` ({}): {}",
            self.stage.as_str(),
            self.container,
            self.code,
            self.message
        )
    }
}

impl Error for CloudError {}

/// Transport used by the store's cloud mirror.
pub trait CloudSyncProvider: Send + Sync {
    fn container_identifier(&self) -> &str;
    fn push(&self, request: CloudPushRequest) -> CloudResult<CloudPushResult>;
    fn pull(&self, request: CloudPullRequest) -> CloudResult<CloudPullResult>;
}
