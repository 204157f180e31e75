//! Object store wrapper: one durable, cloud-mirrored collection of Dreams.
//!
//! # Responsibility
//! - Own the SQLite connection and the commit generation counter.
//! - Hand out view and background contexts over the same durable data.
//! - Post change notifications and mirror commits to the cloud provider.
//!
//! # Invariants
//! - The store is constructed explicitly and passed around; there is no
//!   process-wide instance.
//! - Every commit is one SQLite transaction; the generation advances only
//!   after it commits.
//! - Notifications for a commit are posted while the connection lock is
//!   still held, so subscribers observe generations in order.

use crate::db::{open_db, open_db_in_memory, DbError};
use crate::model::dream::{Dream, DreamField, DreamId};
use crate::repo::dream_repo::{
    DreamListQuery, DreamRepository, RepoError, SqliteDreamRepository, UpsertKind,
};
use crate::repo::history_repo::{self, ChangeOrigin, ChangeType, HistoryTransaction};
use crate::repo::sync_state_repo::{
    self, CLOUD_CHANGE_TOKEN_KEY, DEVICE_ID_KEY, STORE_GENERATION_KEY,
};
use crate::sync::provider::{
    ChangeToken, CloudError, CloudSyncProvider, RemoteChange, RemoteRecord,
};
use log::{error, info, warn};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Instant;
use uuid::Uuid;

pub mod config;
pub mod context;
pub mod merge;
mod mirror;
pub mod notify;

pub use config::{StoreConfig, StoreLocation};
pub use context::{ContextId, ContextKind, ObjectContext, QueryGeneration, SaveOutcome, SaveSummary};
pub use merge::MergePolicy;
pub use mirror::ImportSummary;
pub use notify::{ChangeNotification, Subscription};

use mirror::CloudMirror;
use notify::ObserverRegistry;

pub type StoreResult<T> = Result<T, StoreError>;

/// Store-level error.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    Repo(RepoError),
    NotFound(DreamId),
    /// Fields changed both in the context and in the store under `MergePolicy::Error`.
    MergeConflict {
        id: DreamId,
        fields: Vec<DreamField>,
    },
    Cloud(CloudError),
    Config(String),
    /// A thread panicked while holding the connection lock.
    Poisoned,
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "dream not found: {id}"),
            Self::MergeConflict { id, fields } => {
                let names = fields
                    .iter()
                    .map(|field| field.as_str())
                    .collect::<Vec<_>>()
                    .join(",");
                write!(f, "merge conflict on dream {id}: {names}")
            }
            Self::Cloud(err) => write!(f, "{err}"),
            Self::Config(message) => write!(f, "invalid store configuration: {message}"),
            Self::Poisoned => write!(f, "store connection lock poisoned"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Cloud(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<RepoError> for StoreError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            RepoError::Db(err) => Self::Db(err),
            other => Self::Repo(other),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<CloudError> for StoreError {
    fn from(value: CloudError) -> Self {
        Self::Cloud(value)
    }
}

/// One record write a context asks the store to commit.
#[derive(Debug, Clone)]
pub(crate) enum PendingWrite {
    Insert(Dream),
    Update { snapshot: Dream, local: Dream },
    Delete(DreamId),
}

/// What a local commit actually wrote.
#[derive(Debug, Clone, Default)]
pub(crate) struct CommitResult {
    pub(crate) generation: u64,
    /// Final durable values for inserted and updated records.
    pub(crate) written: Vec<Dream>,
    pub(crate) inserted: Vec<DreamId>,
    pub(crate) updated: Vec<DreamId>,
    pub(crate) deleted: Vec<DreamId>,
    /// Updates skipped because the record no longer exists.
    pub(crate) dropped: Vec<DreamId>,
    /// Fields each updated record actually changed, in commit order.
    pub(crate) changed_fields: Vec<(DreamId, Vec<DreamField>)>,
}

struct StoreInner {
    config: StoreConfig,
    conn: Mutex<Connection>,
    generation: AtomicU64,
    next_context_id: AtomicU64,
    observers: Arc<ObserverRegistry>,
    mirror: Option<CloudMirror>,
    device_id: String,
    /// Serializes cloud imports so two pulls never resume from the same token.
    import_lock: Mutex<()>,
    /// Set while a `force_sync` thread runs.
    sync_running: AtomicBool,
}

/// Handle to the durable Dream store. Cloning shares the same store.
#[derive(Clone)]
pub struct PersistentStore {
    inner: Arc<StoreInner>,
}

impl PersistentStore {
    /// Opens the store without a cloud provider.
    ///
    /// A configured `cloud` section is ignored with a warning until a
    /// provider is attached through `open_with_cloud`.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        if let Some(cloud) = &config.cloud {
            warn!(
                "event=store_open module=store status=degraded container={} reason=no_provider",
                cloud.container_identifier
            );
        }
        Self::open_inner(config, None)
    }

    /// Opens the store and mirrors commits through `provider`.
    pub fn open_with_cloud(
        config: StoreConfig,
        provider: Arc<dyn CloudSyncProvider>,
    ) -> StoreResult<Self> {
        let options = config.cloud.clone().unwrap_or_default();
        if provider.container_identifier() != options.container_identifier {
            return Err(StoreError::Config(format!(
                "provider container `{}` does not match configured `{}`",
                provider.container_identifier(),
                options.container_identifier
            )));
        }
        let config = StoreConfig {
            cloud: Some(options),
            ..config
        };
        Self::open_inner(config, Some(provider))
    }

    /// Throwaway, non-durable store.
    pub fn in_memory() -> StoreResult<Self> {
        Self::open(StoreConfig::in_memory())
    }

    /// Startup path: the app cannot run without its store, so failure aborts.
    pub fn open_or_abort(config: StoreConfig) -> Self {
        match Self::open(config) {
            Ok(store) => store,
            Err(err) => {
                error!(
                    "event=store_open module=store status=error error_code=store_open_fatal error={}",
                    err
                );
                log::logger().flush();
                std::process::abort();
            }
        }
    }

    fn open_inner(
        config: StoreConfig,
        provider: Option<Arc<dyn CloudSyncProvider>>,
    ) -> StoreResult<Self> {
        let started_at = Instant::now();
        config.validate()?;

        let conn = match &config.location {
            StoreLocation::File(path) => open_db(path)?,
            StoreLocation::InMemory => open_db_in_memory()?,
        };

        let generation = match sync_state_repo::get_value(&conn, STORE_GENERATION_KEY)? {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                StoreError::Repo(RepoError::InvalidData(format!(
                    "invalid store generation `{raw}`"
                )))
            })?,
            None => 0,
        };
        let device_id = resolve_device_id(&conn, config.device_id.as_deref())?;
        let mirror = match (provider, &config.cloud) {
            (Some(provider), Some(options)) => Some(CloudMirror::new(
                provider,
                options.clone(),
                device_id.clone(),
            )),
            _ => None,
        };

        info!(
            "event=store_open module=store status=ok generation={} cloud={} history={} merge_policy={} duration_ms={}",
            generation,
            mirror.is_some(),
            config.history_tracking,
            config.merge_policy.as_str(),
            started_at.elapsed().as_millis()
        );

        Ok(Self {
            inner: Arc::new(StoreInner {
                config,
                conn: Mutex::new(conn),
                generation: AtomicU64::new(generation),
                next_context_id: AtomicU64::new(0),
                observers: Arc::new(ObserverRegistry::default()),
                mirror,
                device_id,
                import_lock: Mutex::new(()),
                sync_running: AtomicBool::new(false),
            }),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn device_id(&self) -> &str {
        &self.inner.device_id
    }

    pub fn has_cloud(&self) -> bool {
        self.inner.mirror.is_some()
    }

    /// Generation of the latest commit, 0 for a fresh store.
    pub fn current_generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Context for the UI thread; merges other contexts' commits automatically.
    pub fn view_context(&self) -> ObjectContext {
        ObjectContext::new(self.clone(), self.allocate_context_id(), ContextKind::View)
    }

    /// Context for off-UI work. It does not merge other commits until refreshed.
    pub fn new_background_context(&self) -> ObjectContext {
        ObjectContext::new(
            self.clone(),
            self.allocate_context_id(),
            ContextKind::Background,
        )
    }

    /// Subscribes to change notifications for every future commit.
    pub fn subscribe(&self) -> Subscription {
        self.inner.observers.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.observers.len()
    }

    /// Durable record count.
    pub fn count_dreams(&self) -> StoreResult<u64> {
        let conn = self.lock()?;
        Ok(SqliteDreamRepository::new(&conn).count_dreams()?)
    }

    /// Reads one durable record.
    pub fn load_dream(&self, id: DreamId) -> StoreResult<Option<Dream>> {
        let conn = self.lock()?;
        let stored = SqliteDreamRepository::new(&conn).get_dream(id)?;
        Ok(stored.map(|stored| stored.dream))
    }

    /// All durable records ordered by `title, id`.
    pub fn list_dreams(&self) -> StoreResult<Vec<Dream>> {
        let conn = self.lock()?;
        let stored = SqliteDreamRepository::new(&conn).list_dreams(&DreamListQuery::default())?;
        Ok(stored.into_iter().map(|stored| stored.dream).collect())
    }

    /// History of commits after `generation`; empty when tracking is off.
    pub fn history_since(&self, generation: u64) -> StoreResult<Vec<HistoryTransaction>> {
        if !self.inner.config.history_tracking {
            return Ok(Vec::new());
        }
        let conn = self.lock()?;
        Ok(history_repo::transactions_after(&conn, generation)?)
    }

    /// Drops history up to and including `generation`.
    pub fn purge_history_through(&self, generation: u64) -> StoreResult<usize> {
        let conn = self.lock()?;
        let removed = history_repo::purge_through(&conn, generation)?;
        info!(
            "event=history_purge module=store status=ok through={} removed={}",
            generation, removed
        );
        Ok(removed)
    }

    /// Pulls every pending remote change and applies it as origin `Remote`.
    pub fn import_remote_changes(&self) -> StoreResult<ImportSummary> {
        let Some(mirror) = self.inner.mirror.as_ref() else {
            return Ok(ImportSummary::default());
        };
        let _import = self
            .inner
            .import_lock
            .lock()
            .map_err(|_| StoreError::Poisoned)?;
        let started_at = Instant::now();

        let mut summary = ImportSummary {
            change_token: self.stored_change_token()?,
            ..ImportSummary::default()
        };
        loop {
            let page = match mirror.pull_page(summary.change_token) {
                Ok(page) => page,
                Err(err) => {
                    warn!(
                        "event=cloud_import module=store status=error container={} error_code={} retryable={} duration_ms={}",
                        mirror.container_identifier(),
                        err.code,
                        err.retryable,
                        started_at.elapsed().as_millis()
                    );
                    return Err(err.into());
                }
            };
            summary.pulled += page.records.len();
            let applied = self.apply_records(&page.records, page.next_token)?;
            summary.inserted += applied.inserted.len();
            summary.updated += applied.updated.len();
            summary.deleted += applied.deleted.len();
            if page.next_token.is_some() {
                summary.change_token = page.next_token;
            }
            if !page.has_more {
                break;
            }
        }

        info!(
            "event=cloud_import module=store status=ok container={} pulled={} applied={} duration_ms={}",
            mirror.container_identifier(),
            summary.pulled,
            summary.applied(),
            started_at.elapsed().as_millis()
        );
        Ok(summary)
    }

    /// Applies a batch of remote records directly, as a cloud import would.
    pub fn apply_remote_records(&self, records: &[RemoteRecord]) -> StoreResult<ImportSummary> {
        let applied = self.apply_records(records, None)?;
        Ok(ImportSummary {
            pulled: records.len(),
            inserted: applied.inserted.len(),
            updated: applied.updated.len(),
            deleted: applied.deleted.len(),
            change_token: None,
        })
    }

    /// Fire-and-forget sync refresh on a background thread.
    ///
    /// Imports pending remote changes, then re-reads a background context at
    /// the current generation. The outcome is only logged; the handle lets
    /// callers wait for completion, never for a result.
    ///
    /// At most one forced sync runs at a time. While one is in flight,
    /// further calls log a skip and return `None`.
    pub fn force_sync(&self) -> Option<JoinHandle<()>> {
        if self
            .inner
            .sync_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("event=force_sync module=store status=skipped reason=in_flight");
            return None;
        }
        let store = self.clone();
        let spawned = std::thread::Builder::new()
            .name("visionboard-force-sync".to_string())
            .spawn(move || {
                let _running = SyncRunning(&store.inner.sync_running);
                store.run_forced_sync();
            });
        match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                self.inner.sync_running.store(false, Ordering::Release);
                warn!(
                    "event=force_sync module=store status=error error_code=spawn_failed error={}",
                    err
                );
                None
            }
        }
    }

    fn run_forced_sync(&self) {
        let started_at = Instant::now();
        let mut context = self.new_background_context();
        if let Err(err) = self.import_remote_changes() {
            warn!(
                "event=force_sync module=store status=error stage=import error={}",
                err
            );
        }
        match context.set_query_generation_from_current() {
            Ok(generation) => info!(
                "event=force_sync module=store status=ok generation={} duration_ms={}",
                generation.0,
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=force_sync module=store status=error stage=query_generation error={}",
                err
            ),
        }
    }

    pub(crate) fn commit_local(
        &self,
        author: &str,
        context_id: ContextId,
        writes: &[PendingWrite],
        policy: MergePolicy,
    ) -> StoreResult<CommitResult> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut result = CommitResult::default();
        {
            let repo = SqliteDreamRepository::new(&tx);
            for write in writes {
                match write {
                    PendingWrite::Insert(dream) => {
                        repo.insert_dream(dream)?;
                        result.inserted.push(dream.id);
                        result.written.push(dream.clone());
                    }
                    PendingWrite::Update { snapshot, local } => {
                        let Some(stored) = repo.get_dream(local.id)? else {
                            result.dropped.push(local.id);
                            continue;
                        };
                        let merged = if stored.dream == *snapshot {
                            local.clone()
                        } else {
                            merge::resolve(policy, snapshot, local, &stored.dream).map_err(
                                |fields| StoreError::MergeConflict {
                                    id: local.id,
                                    fields,
                                },
                            )?
                        };
                        let fields = merged.changed_fields(&stored.dream);
                        if !fields.is_empty() {
                            repo.update_dream(&merged)?;
                            result.updated.push(merged.id);
                            result.changed_fields.push((merged.id, fields));
                        }
                        result.written.push(merged);
                    }
                    PendingWrite::Delete(id) => {
                        if repo.delete_dream(*id)? {
                            result.deleted.push(*id);
                        }
                    }
                }
            }
        }

        let changes = change_list(&result.inserted, &result.updated, &result.deleted);
        if changes.is_empty() {
            tx.commit()?;
            result.generation = self.current_generation();
            return Ok(result);
        }

        let generation = self.current_generation() + 1;
        self.record_commit(&tx, generation, author, ChangeOrigin::Local, &changes)?;
        tx.commit()?;
        self.inner.generation.store(generation, Ordering::SeqCst);
        result.generation = generation;

        self.inner.observers.post(&ChangeNotification {
            generation,
            author: author.to_string(),
            context_id: Some(context_id),
            origin: ChangeOrigin::Local,
            inserted: result.inserted.clone(),
            updated: result.updated.clone(),
            deleted: result.deleted.clone(),
        });
        drop(conn);

        if let Some(mirror) = &self.inner.mirror {
            mirror.export(generation, exported_changes(&result));
        }

        Ok(result)
    }

    fn apply_records(
        &self,
        records: &[RemoteRecord],
        next_token: Option<ChangeToken>,
    ) -> StoreResult<CommitResult> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut result = CommitResult::default();
        {
            let repo = SqliteDreamRepository::new(&tx);
            for record in records {
                match &record.change {
                    RemoteChange::Upsert { dream } => match repo.upsert_dream(dream)? {
                        UpsertKind::Inserted => result.inserted.push(dream.id),
                        UpsertKind::Updated => result.updated.push(dream.id),
                    },
                    RemoteChange::Update { dream, fields } => {
                        let Some(stored) = repo.get_dream(dream.id)? else {
                            info!(
                                "event=remote_change module=store status=skipped reason=missing_record id={}",
                                dream.id
                            );
                            continue;
                        };
                        let mut patched = stored.dream.clone();
                        for field in fields {
                            patched.copy_field_from(dream, *field);
                        }
                        if patched != stored.dream {
                            repo.update_dream(&patched)?;
                            if !result.updated.contains(&patched.id) {
                                result.updated.push(patched.id);
                            }
                        }
                    }
                    RemoteChange::Delete { id } => {
                        if repo.delete_dream(*id)? {
                            result.deleted.push(*id);
                        }
                    }
                }
            }
        }
        if let Some(token) = next_token {
            sync_state_repo::set_value(&tx, CLOUD_CHANGE_TOKEN_KEY, &token.to_string())?;
        }

        let changes = change_list(&result.inserted, &result.updated, &result.deleted);
        if changes.is_empty() {
            tx.commit()?;
            result.generation = self.current_generation();
            return Ok(result);
        }

        let author = self
            .inner
            .mirror
            .as_ref()
            .map_or("cloud", |mirror| mirror.container_identifier())
            .to_string();
        let generation = self.current_generation() + 1;
        self.record_commit(&tx, generation, &author, ChangeOrigin::Remote, &changes)?;
        tx.commit()?;
        self.inner.generation.store(generation, Ordering::SeqCst);
        result.generation = generation;

        info!(
            "event=remote_change module=store status=ok generation={} inserted={} updated={} deleted={}",
            generation,
            result.inserted.len(),
            result.updated.len(),
            result.deleted.len()
        );
        if self.inner.config.remote_change_notifications {
            self.inner.observers.post(&ChangeNotification {
                generation,
                author,
                context_id: None,
                origin: ChangeOrigin::Remote,
                inserted: result.inserted.clone(),
                updated: result.updated.clone(),
                deleted: result.deleted.clone(),
            });
        }

        Ok(result)
    }

    fn record_commit(
        &self,
        conn: &Connection,
        generation: u64,
        author: &str,
        origin: ChangeOrigin,
        changes: &[(DreamId, ChangeType)],
    ) -> StoreResult<()> {
        sync_state_repo::set_value(conn, STORE_GENERATION_KEY, &generation.to_string())?;
        if self.inner.config.history_tracking {
            history_repo::append_transaction(conn, generation, author, origin, changes)?;
        }
        Ok(())
    }

    fn stored_change_token(&self) -> StoreResult<Option<ChangeToken>> {
        let conn = self.lock()?;
        match sync_state_repo::get_value(&conn, CLOUD_CHANGE_TOKEN_KEY)? {
            Some(raw) => raw.parse().map(Some).map_err(|_| {
                StoreError::Repo(RepoError::InvalidData(format!(
                    "invalid cloud change token `{raw}`"
                )))
            }),
            None => Ok(None),
        }
    }

    fn allocate_context_id(&self) -> ContextId {
        ContextId(self.inner.next_context_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.inner.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

/// Clears the in-flight flag when the sync thread finishes or unwinds.
struct SyncRunning<'a>(&'a AtomicBool);

impl Drop for SyncRunning<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Wire changes for a local commit: new records in full, updates as the
/// fields they changed, then deletions.
fn exported_changes(result: &CommitResult) -> Vec<RemoteChange> {
    let mut exported: Vec<RemoteChange> = result
        .written
        .iter()
        .filter(|dream| result.inserted.contains(&dream.id))
        .map(|dream| RemoteChange::Upsert {
            dream: dream.clone(),
        })
        .collect();
    for (id, fields) in &result.changed_fields {
        if let Some(dream) = result.written.iter().find(|dream| dream.id == *id) {
            exported.push(RemoteChange::Update {
                dream: dream.clone(),
                fields: fields.clone(),
            });
        }
    }
    exported.extend(result.deleted.iter().map(|id| RemoteChange::Delete { id: *id }));
    exported
}

fn change_list(
    inserted: &[DreamId],
    updated: &[DreamId],
    deleted: &[DreamId],
) -> Vec<(DreamId, ChangeType)> {
    inserted
        .iter()
        .map(|id| (*id, ChangeType::Insert))
        .chain(updated.iter().map(|id| (*id, ChangeType::Update)))
        .chain(deleted.iter().map(|id| (*id, ChangeType::Delete)))
        .collect()
}

fn resolve_device_id(conn: &Connection, configured: Option<&str>) -> StoreResult<String> {
    if let Some(device_id) = configured {
        let device_id = device_id.trim().to_string();
        sync_state_repo::set_value(conn, DEVICE_ID_KEY, &device_id)?;
        return Ok(device_id);
    }
    if let Some(existing) = sync_state_repo::get_value(conn, DEVICE_ID_KEY)? {
        return Ok(existing);
    }
    let generated = Uuid::new_v4().to_string();
    sync_state_repo::set_value(conn, DEVICE_ID_KEY, &generated)?;
    Ok(generated)
}
