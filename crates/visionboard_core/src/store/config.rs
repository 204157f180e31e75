//! Store configuration.
//!
//! # Invariants
//! - Defaults match the production app: history tracking and remote change
//!   notifications on, property-level object-trump merge.

use crate::store::merge::MergePolicy;
use crate::store::{StoreError, StoreResult};
use crate::sync::options::CloudSyncOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Backing location for durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum StoreLocation {
    File(PathBuf),
    /// Non-durable backend, discarded when the store handle drops.
    InMemory,
}

/// Options for opening a `PersistentStore`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub location: StoreLocation,
    /// Cloud mirroring; `None` keeps the store local-only.
    pub cloud: Option<CloudSyncOptions>,
    pub history_tracking: bool,
    pub remote_change_notifications: bool,
    pub merge_policy: MergePolicy,
    /// Stable device identity for the mirror; generated and persisted when absent.
    pub device_id: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            location: StoreLocation::InMemory,
            cloud: None,
            history_tracking: true,
            remote_change_notifications: true,
            merge_policy: MergePolicy::default(),
            device_id: None,
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            location: StoreLocation::File(path.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    pub fn with_cloud(mut self, cloud: CloudSyncOptions) -> Self {
        self.cloud = Some(cloud);
        self
    }

    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Parses a JSON config document; omitted keys take defaults.
    pub fn from_json_str(raw: &str) -> StoreResult<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|err| StoreError::Config(format!("invalid store config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StoreResult<()> {
        if let StoreLocation::File(path) = &self.location {
            if path.as_os_str().is_empty() {
                return Err(StoreError::Config("store path cannot be empty".to_string()));
            }
        }
        if let Some(cloud) = &self.cloud {
            cloud
                .validate()
                .map_err(|err| StoreError::Config(err.to_string()))?;
        }
        if let Some(device_id) = &self.device_id {
            if device_id.trim().is_empty() {
                return Err(StoreError::Config("device_id cannot be blank".to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{StoreConfig, StoreLocation};
    use crate::store::merge::MergePolicy;
    use crate::store::StoreError;
    use std::path::PathBuf;

    #[test]
    fn empty_json_yields_defaults() {
        let config = StoreConfig::from_json_str("{}").unwrap();
        assert_eq!(config, StoreConfig::default());
        assert!(config.history_tracking);
        assert!(config.remote_change_notifications);
        assert_eq!(config.merge_policy, MergePolicy::PropertyObjectTrump);
    }

    #[test]
    fn parses_file_location_and_cloud_options() {
        let config = StoreConfig::from_json_str(
            r#"{
                "location": {"kind": "file", "path": "/tmp/board.sqlite3"},
                "cloud": {"container_identifier": "iCloud.VisionBoard"},
                "merge_policy": "property_store_trump"
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.location,
            StoreLocation::File(PathBuf::from("/tmp/board.sqlite3"))
        );
        assert_eq!(
            config.cloud.unwrap().container_identifier,
            "iCloud.VisionBoard"
        );
        assert_eq!(config.merge_policy, MergePolicy::PropertyStoreTrump);
    }

    #[test]
    fn rejects_invalid_container_identifier() {
        let err = StoreConfig::from_json_str(r#"{"cloud": {"container_identifier": "nope"}}"#)
            .unwrap_err();
        assert!(matches!(err, StoreError::Config(message) if message.contains("iCloud")));
    }
}
