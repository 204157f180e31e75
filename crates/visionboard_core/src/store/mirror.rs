//! Cloud mirror attached to a store.
//!
//! # Responsibility
//! - Export committed local changes to the provider.
//! - Page remote changes in for import.
//!
//! # Invariants
//! - Export failures are logged and dropped; nothing is queued for retry.
//! - Records authored by this device are never imported back.

use crate::sync::options::CloudSyncOptions;
use crate::sync::provider::{
    ChangeToken, CloudPullRequest, CloudPullResult, CloudPushRequest, CloudResult,
    CloudSyncProvider, RemoteChange,
};
use log::{info, warn};
use std::sync::Arc;
use std::time::Instant;

const PULL_PAGE_SIZE: u32 = 100;

/// Counts from one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub pulled: usize,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Token persisted after the run, if any change was ever seen.
    pub change_token: Option<ChangeToken>,
}

impl ImportSummary {
    pub fn applied(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

pub(crate) struct CloudMirror {
    provider: Arc<dyn CloudSyncProvider>,
    options: CloudSyncOptions,
    device_id: String,
}

impl CloudMirror {
    pub(crate) fn new(
        provider: Arc<dyn CloudSyncProvider>,
        options: CloudSyncOptions,
        device_id: String,
    ) -> Self {
        Self {
            provider,
            options,
            device_id,
        }
    }

    pub(crate) fn container_identifier(&self) -> &str {
        &self.options.container_identifier
    }

    /// Pushes one commit's changes; failures only reach the log.
    pub(crate) fn export(&self, generation: u64, changes: Vec<RemoteChange>) {
        if changes.is_empty() {
            return;
        }
        let started_at = Instant::now();
        let count = changes.len();
        let request = CloudPushRequest {
            device_id: self.device_id.clone(),
            changes,
        };
        match self.provider.push(request) {
            Ok(result) => info!(
                "event=cloud_export module=store status=ok container={} generation={} accepted={} duration_ms={}",
                self.container_identifier(),
                generation,
                result.accepted_count,
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=cloud_export module=store status=error container={} generation={} changes={} error_code={} retryable={} duration_ms={}",
                self.container_identifier(),
                generation,
                count,
                err.code,
                err.retryable,
                started_at.elapsed().as_millis()
            ),
        }
    }

    pub(crate) fn pull_page(&self, after: Option<ChangeToken>) -> CloudResult<CloudPullResult> {
        self.provider.pull(CloudPullRequest {
            device_id: self.device_id.clone(),
            after,
            limit: PULL_PAGE_SIZE,
        })
    }
}
