//! Core logic for VisionBoard: Dreams, their durable store and the board
//! presentation state.

pub mod board;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod store;
pub mod sync;

pub use board::{
    CardFace, CardModel, DreamBoard, EditorError, EditorSession, GridLayout, ImageSource,
    LayoutProfile, ZoomLevel,
};
pub use logging::{default_log_level, init_logging, logging_status, LogSettings, LoggingError};
pub use model::dream::{Dream, DreamField, DreamId, DreamValidationError};
pub use repo::dream_repo::{DreamRepository, RepoError, RepoResult, SqliteDreamRepository};
pub use store::{
    ChangeNotification, MergePolicy, ObjectContext, PersistentStore, SaveOutcome, StoreConfig,
    StoreError, StoreLocation, StoreResult, Subscription,
};
pub use sync::{CloudSyncOptions, CloudSyncProvider, InMemoryCloud};

/// Liveness check for bindings.
pub fn ping() -> &'static str {
    "pong"
}

pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
