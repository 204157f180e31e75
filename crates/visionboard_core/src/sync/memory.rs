//! In-process cloud provider backed by a shared change log.
//!
//! Several stores attached to one `InMemoryCloud` behave like devices signed
//! into the same account.

use crate::sync::provider::{
    ChangeToken, CloudError, CloudPullRequest, CloudPullResult, CloudPushRequest,
    CloudPushResult, CloudResult, CloudSyncProvider, RemoteRecord, SyncStage,
};
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

const PULL_LIMIT_MAX: u32 = 500;

pub struct InMemoryCloud {
    container_identifier: String,
    log: Mutex<Vec<(ChangeToken, RemoteRecord)>>,
    available: AtomicBool,
}

impl InMemoryCloud {
    pub fn new(container_identifier: impl Into<String>) -> Self {
        Self {
            container_identifier: container_identifier.into(),
            log: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulates the service going offline (`false`) or recovering.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of records ever accepted.
    pub fn len(&self) -> usize {
        self.log.lock().map(|log| log.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self, stage: SyncStage) -> CloudResult<()> {
        if self.available.load(Ordering::SeqCst) {
            return Ok(());
        }
        Err(self.error(stage, "service_unavailable", "cloud service is offline", true))
    }

    fn poisoned(&self, stage: SyncStage) -> CloudError {
        self.error(stage, "log_poisoned", "change log poisoned", false)
    }

    fn error(&self, stage: SyncStage, code: &str, message: &str, retryable: bool) -> CloudError {
        CloudError::new(
            self.container_identifier.as_str(),
            stage,
            code,
            message,
            retryable,
        )
    }
}

impl CloudSyncProvider for InMemoryCloud {
    fn container_identifier(&self) -> &str {
        &self.container_identifier
    }

    fn push(&self, request: CloudPushRequest) -> CloudResult<CloudPushResult> {
        self.check_available(SyncStage::Push)?;
        let mut log = self
            .log
            .lock()
            .map_err(|_| self.poisoned(SyncStage::Push))?;

        let mut last = log.last().map(|(token, _)| *token);
        let accepted_count = request.changes.len() as u32;
        for change in request.changes {
            let token = ChangeToken(last.map_or(1, |token| token.0 + 1));
            log.push((
                token,
                RemoteRecord {
                    device_id: request.device_id.clone(),
                    change,
                },
            ));
            last = Some(token);
        }
        debug!(
            "event=cloud_push module=sync status=ok device_id={} accepted={}",
            request.device_id, accepted_count
        );

        Ok(CloudPushResult {
            accepted_count,
            change_token: last,
        })
    }

    fn pull(&self, request: CloudPullRequest) -> CloudResult<CloudPullResult> {
        self.check_available(SyncStage::Pull)?;
        let log = self
            .log
            .lock()
            .map_err(|_| self.poisoned(SyncStage::Pull))?;

        let limit = request.limit.clamp(1, PULL_LIMIT_MAX) as usize;
        let mut pending = log
            .iter()
            .filter(|(token, _)| request.after.map_or(true, |after| *token > after))
            .peekable();

        let mut records = Vec::new();
        let mut next_token = request.after;
        let mut scanned = 0usize;
        while scanned < limit {
            let Some((token, record)) = pending.next() else {
                break;
            };
            scanned += 1;
            next_token = Some(*token);
            if record.device_id != request.device_id {
                records.push(record.clone());
            }
        }
        let has_more = pending.peek().is_some();

        Ok(CloudPullResult {
            records,
            next_token,
            has_more,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::InMemoryCloud;
    use crate::model::dream::Dream;
    use crate::sync::provider::{
        ChangeToken, CloudPullRequest, CloudPushRequest, CloudSyncProvider, RemoteChange,
    };

    fn upsert(title: &str) -> RemoteChange {
        let mut dream = Dream::new();
        dream.title = title.to_string();
        RemoteChange::Upsert { dream }
    }

    fn pull(
        cloud: &InMemoryCloud,
        device: &str,
        after: Option<ChangeToken>,
        limit: u32,
    ) -> super::CloudPullResult {
        cloud
            .pull(CloudPullRequest {
                device_id: device.to_string(),
                after,
                limit,
            })
            .unwrap()
    }

    #[test]
    fn pull_skips_own_records_but_advances_token() {
        let cloud = InMemoryCloud::new("iCloud.Test");
        cloud
            .push(CloudPushRequest {
                device_id: "phone".to_string(),
                changes: vec![upsert("A")],
            })
            .unwrap();
        cloud
            .push(CloudPushRequest {
                device_id: "laptop".to_string(),
                changes: vec![upsert("B")],
            })
            .unwrap();

        let result = pull(&cloud, "phone", None, 10);
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].device_id, "laptop");
        assert_eq!(result.next_token, Some(ChangeToken(2)));
        assert!(!result.has_more);
    }

    #[test]
    fn pull_pages_with_limit() {
        let cloud = InMemoryCloud::new("iCloud.Test");
        cloud
            .push(CloudPushRequest {
                device_id: "laptop".to_string(),
                changes: vec![upsert("A"), upsert("B"), upsert("C")],
            })
            .unwrap();

        let first = pull(&cloud, "phone", None, 2);
        assert_eq!(first.records.len(), 2);
        assert!(first.has_more);

        let second = pull(&cloud, "phone", first.next_token, 2);
        assert_eq!(second.records.len(), 1);
        assert!(!second.has_more);
        assert_eq!(second.next_token, Some(ChangeToken(3)));
    }

    #[test]
    fn offline_cloud_rejects_calls() {
        let cloud = InMemoryCloud::new("iCloud.Test");
        cloud.set_available(false);
        let err = cloud
            .push(CloudPushRequest {
                device_id: "phone".to_string(),
                changes: vec![upsert("A")],
            })
            .unwrap_err();
        assert_eq!(err.code, "service_unavailable");
        assert!(err.retryable);
        assert!(cloud.is_empty());
    }
}
