//! Scoped read/write contexts over the persistent store.
//!
//! # Responsibility
//! - Hold one owner's pending inserts, edits and deletes until `save`.
//! - Overlay pending state on durable data for reads.
//! - Merge other contexts' commits according to the merge policy.
//!
//! # Invariants
//! - A context is single-owner; every mutating API takes `&mut self`.
//! - A failed `save` leaves pending changes exactly as they were.
//! - Pending changes are invisible to other contexts until saved.
//! - Fetch order is `title ASC, id ASC`, byte-wise, pending state included.

use crate::model::dream::{Dream, DreamId};
use crate::store::merge::{self, MergePolicy};
use crate::store::notify::{ChangeNotification, Subscription};
use crate::store::{PendingWrite, PersistentStore, StoreError, StoreResult};
use log::{debug, error, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Process-unique context identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(pub(crate) u64);

impl Display for ContextId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// UI-bound; merges other commits automatically.
    View,
    Background,
}

impl ContextKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Background => "background",
        }
    }
}

/// Store generation a context's clean objects reflect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryGeneration(pub u64);

/// Counts from one successful commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub generation: u64,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Edits discarded because the record was deleted elsewhere.
    pub dropped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    NoChanges,
    Saved(SaveSummary),
}

#[derive(Debug, Clone)]
struct ManagedDream {
    current: Dream,
    /// Durable value last loaded; `None` for a pending insert.
    snapshot: Option<Dream>,
}

impl ManagedDream {
    fn loaded(dream: Dream) -> Self {
        Self {
            current: dream.clone(),
            snapshot: Some(dream),
        }
    }

    fn is_inserted(&self) -> bool {
        self.snapshot.is_none()
    }

    fn is_dirty(&self) -> bool {
        match &self.snapshot {
            None => true,
            Some(snapshot) => *snapshot != self.current,
        }
    }
}

/// Scoped handle for reading and writing Dreams.
pub struct ObjectContext {
    id: ContextId,
    kind: ContextKind,
    name: String,
    store: PersistentStore,
    merge_policy: MergePolicy,
    inbox: Option<Subscription>,
    registered: BTreeMap<DreamId, ManagedDream>,
    deleted: BTreeSet<DreamId>,
    query_generation: QueryGeneration,
}

impl ObjectContext {
    pub(crate) fn new(store: PersistentStore, id: ContextId, kind: ContextKind) -> Self {
        let inbox = match kind {
            ContextKind::View => Some(store.subscribe()),
            ContextKind::Background => None,
        };
        let merge_policy = store.config().merge_policy;
        let query_generation = QueryGeneration(store.current_generation());
        Self {
            id,
            kind,
            name: format!("{}-{}", kind.as_str(), id.0),
            store,
            merge_policy,
            inbox,
            registered: BTreeMap::new(),
            deleted: BTreeSet::new(),
            query_generation,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    /// Author name recorded in history for this context's commits.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &PersistentStore {
        &self.store
    }

    pub fn merge_policy(&self) -> MergePolicy {
        self.merge_policy
    }

    pub fn set_merge_policy(&mut self, policy: MergePolicy) {
        self.merge_policy = policy;
    }

    pub fn automatically_merges_changes(&self) -> bool {
        self.inbox.is_some()
    }

    /// Turns automatic merging of other contexts' commits on or off.
    ///
    /// Commits made while it is off are not replayed when it is turned back
    /// on; call `set_query_generation_from_current` to catch up.
    pub fn set_automatically_merges_changes(&mut self, enabled: bool) {
        match (enabled, self.inbox.is_some()) {
            (true, false) => self.inbox = Some(self.store.subscribe()),
            (false, true) => self.inbox = None,
            _ => {}
        }
    }

    pub fn query_generation(&self) -> QueryGeneration {
        self.query_generation
    }

    /// Registers an empty Dream as a pending insert.
    pub fn insert_new_dream(&mut self) -> DreamId {
        let dream = Dream::new();
        let id = dream.id;
        self.registered.insert(
            id,
            ManagedDream {
                current: dream,
                snapshot: None,
            },
        );
        debug!(
            "event=dream_insert module=store status=pending context={} dream_id={}",
            self.name, id
        );
        id
    }

    /// Registers a fully populated Dream as a pending insert.
    pub fn insert_dream(&mut self, dream: Dream) -> StoreResult<DreamId> {
        dream
            .validate()
            .map_err(|err| StoreError::Repo(err.into()))?;
        let id = dream.id;
        self.deleted.remove(&id);
        self.registered.insert(
            id,
            ManagedDream {
                current: dream,
                snapshot: None,
            },
        );
        Ok(id)
    }

    /// Current in-context value, or `None` when absent or pending deletion.
    pub fn dream(&mut self, id: DreamId) -> StoreResult<Option<Dream>> {
        self.merge_if_automatic()?;
        if self.deleted.contains(&id) {
            return Ok(None);
        }
        Ok(self.ensure_registered(id)?.map(|managed| managed.current.clone()))
    }

    /// Applies `edit` to one Dream; the id cannot be changed.
    pub fn edit(&mut self, id: DreamId, edit: impl FnOnce(&mut Dream)) -> StoreResult<()> {
        if self.deleted.contains(&id) {
            return Err(StoreError::NotFound(id));
        }
        let managed = self
            .ensure_registered(id)?
            .ok_or(StoreError::NotFound(id))?;
        edit(&mut managed.current);
        managed.current.id = id;
        Ok(())
    }

    pub fn set_title(&mut self, id: DreamId, title: impl Into<String>) -> StoreResult<()> {
        let title = title.into();
        self.edit(id, |dream| dream.title = title)
    }

    pub fn set_description(
        &mut self,
        id: DreamId,
        description: impl Into<String>,
    ) -> StoreResult<()> {
        let description = description.into();
        self.edit(id, |dream| dream.description = description)
    }

    /// Replaces the image wholesale; `None` clears it.
    pub fn set_image_data(&mut self, id: DreamId, image_data: Option<Vec<u8>>) -> StoreResult<()> {
        self.edit(id, |dream| dream.image_data = image_data)
    }

    /// Deletes a Dream: a pending insert vanishes, a durable one is queued.
    pub fn delete(&mut self, id: DreamId) -> StoreResult<()> {
        if self.deleted.contains(&id) {
            return Ok(());
        }
        let managed = self
            .ensure_registered(id)?
            .ok_or(StoreError::NotFound(id))?;
        let inserted = managed.is_inserted();
        self.registered.remove(&id);
        if !inserted {
            self.deleted.insert(id);
        }
        debug!(
            "event=dream_delete module=store status=pending context={} dream_id={} was_inserted={}",
            self.name, id, inserted
        );
        Ok(())
    }

    /// Whether `id` is a pending insert in this context.
    pub fn is_inserted(&self, id: DreamId) -> bool {
        self.registered
            .get(&id)
            .is_some_and(|managed| managed.is_inserted())
    }

    pub fn has_changes(&self) -> bool {
        !self.deleted.is_empty() || self.registered.values().any(ManagedDream::is_dirty)
    }

    /// Number of records with pending changes.
    pub fn pending_change_count(&self) -> usize {
        self.deleted.len()
            + self
                .registered
                .values()
                .filter(|managed| managed.is_dirty())
                .count()
    }

    /// Durable Dreams overlaid with this context's pending state, sorted.
    pub fn fetch_dreams(&mut self) -> StoreResult<Vec<Dream>> {
        self.merge_if_automatic()?;

        let mut by_id: BTreeMap<DreamId, Dream> = self
            .store
            .list_dreams()?
            .into_iter()
            .filter(|dream| !self.deleted.contains(&dream.id))
            .map(|dream| (dream.id, dream))
            .collect();
        for (id, managed) in &self.registered {
            by_id.insert(*id, managed.current.clone());
        }

        let mut dreams: Vec<Dream> = by_id.into_values().collect();
        dreams.sort_by(|left, right| {
            left.title
                .cmp(&right.title)
                .then_with(|| left.id.cmp(&right.id))
        });
        Ok(dreams)
    }

    /// Durable record count, ignoring pending changes.
    pub fn count_persisted(&self) -> StoreResult<u64> {
        self.store.count_dreams()
    }

    /// Commits all pending changes in one transaction.
    ///
    /// On error nothing is written and pending changes stay as they were.
    pub fn save(&mut self) -> StoreResult<SaveOutcome> {
        if !self.has_changes() {
            return Ok(SaveOutcome::NoChanges);
        }
        let started_at = Instant::now();

        let mut writes = Vec::new();
        for managed in self.registered.values() {
            match &managed.snapshot {
                None => writes.push(PendingWrite::Insert(managed.current.clone())),
                Some(snapshot) if *snapshot != managed.current => {
                    writes.push(PendingWrite::Update {
                        snapshot: snapshot.clone(),
                        local: managed.current.clone(),
                    })
                }
                Some(_) => {}
            }
        }
        writes.extend(self.deleted.iter().map(|id| PendingWrite::Delete(*id)));

        let result = match self
            .store
            .commit_local(&self.name, self.id, &writes, self.merge_policy)
        {
            Ok(result) => result,
            Err(err) => {
                error!(
                    "event=context_save module=store status=error context={} pending={} duration_ms={} error={}",
                    self.name,
                    writes.len(),
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err);
            }
        };

        for dream in &result.written {
            self.registered.insert(dream.id, ManagedDream::loaded(dream.clone()));
        }
        for id in &result.dropped {
            self.registered.remove(id);
            warn!(
                "event=context_save module=store status=dropped context={} dream_id={} reason=deleted_in_store",
                self.name, id
            );
        }
        self.deleted.clear();
        self.query_generation = QueryGeneration(result.generation);

        let summary = SaveSummary {
            generation: result.generation,
            inserted: result.inserted.len(),
            updated: result.updated.len(),
            deleted: result.deleted.len(),
            dropped: result.dropped.len(),
        };
        info!(
            "event=context_save module=store status=ok context={} generation={} inserted={} updated={} deleted={} duration_ms={}",
            self.name,
            summary.generation,
            summary.inserted,
            summary.updated,
            summary.deleted,
            started_at.elapsed().as_millis()
        );
        Ok(SaveOutcome::Saved(summary))
    }

    /// Saves and reports only through the log. Returns whether nothing is
    /// left pending.
    pub fn save_or_log(&mut self) -> bool {
        match self.save() {
            Ok(_) => true,
            // `save` already logged the failure.
            Err(_) => false,
        }
    }

    /// Discards every pending change.
    pub fn rollback(&mut self) {
        self.deleted.clear();
        self.registered.retain(|_, managed| !managed.is_inserted());
        for managed in self.registered.values_mut() {
            if let Some(snapshot) = &managed.snapshot {
                managed.current = snapshot.clone();
            }
        }
    }

    /// Discards pending changes for one record and re-reads it from the store.
    pub fn refresh(&mut self, id: DreamId) -> StoreResult<()> {
        self.deleted.remove(&id);
        self.registered.remove(&id);
        self.ensure_registered(id)?;
        Ok(())
    }

    /// Re-reads every clean object at the store's current generation.
    pub fn set_query_generation_from_current(&mut self) -> StoreResult<QueryGeneration> {
        let generation = QueryGeneration(self.store.current_generation());
        let clean: Vec<DreamId> = self
            .registered
            .iter()
            .filter(|(_, managed)| !managed.is_dirty())
            .map(|(id, _)| *id)
            .collect();
        for id in clean {
            match self.store.load_dream(id)? {
                Some(dream) => {
                    self.registered.insert(id, ManagedDream::loaded(dream));
                }
                None => {
                    self.registered.remove(&id);
                }
            }
        }
        self.query_generation = generation;
        debug!(
            "event=query_generation module=store status=ok context={} generation={}",
            self.name, generation.0
        );
        Ok(generation)
    }

    /// Drains queued store notifications and merges them.
    ///
    /// Returns the number of notifications merged; own commits are skipped.
    pub fn process_pending_changes(&mut self) -> StoreResult<usize> {
        let Some(inbox) = &self.inbox else {
            return Ok(0);
        };
        let notifications = inbox.drain();
        let mut merged = 0;
        for notification in notifications {
            if notification.context_id == Some(self.id) {
                continue;
            }
            self.merge_notification(&notification)?;
            merged += 1;
        }
        Ok(merged)
    }

    /// Merges one committed change set into registered objects.
    pub fn merge_notification(&mut self, notification: &ChangeNotification) -> StoreResult<()> {
        for id in &notification.deleted {
            self.deleted.remove(id);
            if let Some(managed) = self.registered.remove(id) {
                if managed.is_dirty() {
                    warn!(
                        "event=context_merge module=store status=dropped context={} dream_id={} reason=deleted_in_store",
                        self.name, id
                    );
                }
            }
        }

        for id in notification.inserted.iter().chain(&notification.updated) {
            if !self.registered.contains_key(id) {
                continue;
            }
            let Some(store_value) = self.store.load_dream(*id)? else {
                self.registered.remove(id);
                continue;
            };
            let Some(managed) = self.registered.get_mut(id) else {
                continue;
            };
            if !managed.is_dirty() {
                *managed = ManagedDream::loaded(store_value);
                continue;
            }
            let Some(snapshot) = managed.snapshot.clone() else {
                // A pending insert colliding with a committed id keeps its values.
                continue;
            };
            match merge::resolve(self.merge_policy, &snapshot, &managed.current, &store_value) {
                Ok(merged) => {
                    managed.current = merged;
                    managed.snapshot = Some(store_value);
                }
                Err(fields) => {
                    // Left as-is so the conflict surfaces on save.
                    debug!(
                        "event=context_merge module=store status=conflict context={} dream_id={} fields={}",
                        self.name,
                        id,
                        fields.len()
                    );
                }
            }
        }

        if notification.generation > self.query_generation.0 {
            self.query_generation = QueryGeneration(notification.generation);
        }
        Ok(())
    }

    fn merge_if_automatic(&mut self) -> StoreResult<()> {
        if self.inbox.is_some() {
            self.process_pending_changes()?;
        }
        Ok(())
    }

    fn ensure_registered(&mut self, id: DreamId) -> StoreResult<Option<&mut ManagedDream>> {
        if !self.registered.contains_key(&id) {
            match self.store.load_dream(id)? {
                Some(dream) => {
                    self.registered.insert(id, ManagedDream::loaded(dream));
                }
                None => return Ok(None),
            }
        }
        Ok(self.registered.get_mut(&id))
    }
}

#[cfg(test)]
mod tests {
    use crate::store::{PersistentStore, SaveOutcome};

    #[test]
    fn save_without_changes_is_noop() {
        let store = PersistentStore::in_memory().unwrap();
        let mut context = store.view_context();
        assert_eq!(context.save().unwrap(), SaveOutcome::NoChanges);
        assert_eq!(store.current_generation(), 0);
    }

    #[test]
    fn rollback_discards_inserts_and_edits() {
        let store = PersistentStore::in_memory().unwrap();
        let mut context = store.view_context();
        let kept = context.insert_new_dream();
        context.set_title(kept, "Kept").unwrap();
        context.save().unwrap();

        context.set_title(kept, "Edited").unwrap();
        let discarded = context.insert_new_dream();
        context.rollback();

        assert!(!context.has_changes());
        assert!(context.dream(discarded).unwrap().is_none());
        assert_eq!(context.dream(kept).unwrap().unwrap().title, "Kept");
    }

    #[test]
    fn edit_cannot_change_identity() {
        let store = PersistentStore::in_memory().unwrap();
        let mut context = store.view_context();
        let id = context.insert_new_dream();
        context
            .edit(id, |dream| {
                dream.id = crate::model::dream::DreamId::new();
                dream.description = "kept".to_string();
            })
            .unwrap();

        let dream = context.dream(id).unwrap().unwrap();
        assert_eq!(dream.id, id);
        assert_eq!(dream.description, "kept");
    }

    #[test]
    fn pending_insert_deleted_before_save_never_reaches_store() {
        let store = PersistentStore::in_memory().unwrap();
        let mut context = store.view_context();
        let id = context.insert_new_dream();
        assert!(context.is_inserted(id));

        context.delete(id).unwrap();
        assert!(!context.has_changes());
        assert_eq!(context.save().unwrap(), SaveOutcome::NoChanges);
        assert_eq!(store.count_dreams().unwrap(), 0);
    }
}
