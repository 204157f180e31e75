//! Board view state: the grid of Dream cards.

use super::card::{CardFace, CardModel, FlipState};
use super::editor::EditorSession;
use super::layout::{GridLayout, LayoutEngine, LayoutProfile, ZoomLevel};
use crate::model::dream::{Dream, DreamId};
use crate::store::{ObjectContext, PersistentStore, StoreError, StoreResult, Subscription};
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::thread::JoinHandle;

/// Grid state bound to one store's view context.
pub struct DreamBoard {
    store: PersistentStore,
    context: ObjectContext,
    subscription: Subscription,
    engine: LayoutEngine,
    zoom: ZoomLevel,
    flips: FlipState,
    dreams: Vec<Dream>,
}

impl DreamBoard {
    /// Creates the board and performs the initial fetch.
    pub fn new(store: PersistentStore, profile: LayoutProfile) -> StoreResult<Self> {
        let context = store.view_context();
        let subscription = store.subscribe();
        let mut board = Self {
            store,
            context,
            subscription,
            engine: LayoutEngine::new(profile),
            zoom: ZoomLevel::default(),
            flips: FlipState::default(),
            dreams: Vec::new(),
        };
        board.refresh()?;
        info!(
            "event=board_open module=board status=ok context={} dreams={}",
            board.context.name(),
            board.dreams.len()
        );
        Ok(board)
    }

    pub fn store(&self) -> &PersistentStore {
        &self.store
    }

    /// Dreams in display order: title ascending, then id.
    pub fn dreams(&self) -> &[Dream] {
        &self.dreams
    }

    pub fn len(&self) -> usize {
        self.dreams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dreams.is_empty()
    }

    /// Re-fetches sorted Dreams from the view context.
    pub fn refresh(&mut self) -> StoreResult<()> {
        self.dreams = self.context.fetch_dreams()?;
        let live: BTreeSet<DreamId> = self.dreams.iter().map(|dream| dream.id).collect();
        self.flips.retain_ids(&live);
        Ok(())
    }

    /// Drains store notifications; returns whether the grid changed.
    pub fn poll_changes(&mut self) -> bool {
        let received = self.subscription.drain();
        if received.is_empty() {
            return false;
        }
        let changes: usize = received.iter().map(|note| note.change_count()).sum();
        if let Err(err) = self.context.process_pending_changes() {
            warn!(
                "event=board_poll module=board status=error stage=merge error={}",
                err
            );
        }
        if let Err(err) = self.refresh() {
            warn!(
                "event=board_poll module=board status=error stage=fetch error={}",
                err
            );
            return false;
        }
        debug!(
            "event=board_poll module=board status=ok notifications={} changes={}",
            received.len(),
            changes
        );
        true
    }

    /// Starts an editor on a fresh, empty Dream.
    pub fn create_dream(&mut self) -> EditorSession<'_> {
        let id = self.context.insert_new_dream();
        EditorSession::new(self, id, true)
    }

    /// Starts an editor on an existing Dream.
    pub fn edit_dream(&mut self, id: DreamId) -> StoreResult<EditorSession<'_>> {
        if self.context.dream(id)?.is_none() {
            return Err(StoreError::NotFound(id));
        }
        Ok(EditorSession::new(self, id, false))
    }

    /// Deletes and saves immediately. Returns whether the delete was persisted.
    pub fn delete_dream(&mut self, id: DreamId) -> bool {
        if let Err(err) = self.context.delete(id) {
            warn!(
                "event=dream_delete module=board status=error dream_id={} error={}",
                id, err
            );
            return false;
        }
        let saved = self.context.save_or_log();
        self.refresh_or_log();
        info!(
            "event=dream_delete module=board status={} dream_id={}",
            if saved { "ok" } else { "error" },
            id
        );
        saved
    }

    pub fn toggle_flip(&mut self, id: DreamId) -> CardFace {
        self.flips.toggle(id)
    }

    pub fn card(&self, id: DreamId) -> Option<CardModel<'_>> {
        self.dreams
            .iter()
            .find(|dream| dream.id == id)
            .map(|dream| CardModel::new(dream, self.flips.face(dream.id)))
    }

    /// Cards in display order.
    pub fn cards(&self) -> Vec<CardModel<'_>> {
        self.dreams
            .iter()
            .map(|dream| CardModel::new(dream, self.flips.face(dream.id)))
            .collect()
    }

    pub fn zoom(&self) -> ZoomLevel {
        self.zoom
    }

    pub fn set_zoom(&mut self, value: f64) -> ZoomLevel {
        self.zoom = ZoomLevel::new(value);
        self.zoom
    }

    pub fn zoom_in(&mut self) -> ZoomLevel {
        self.zoom = self.zoom.zoom_in();
        self.zoom
    }

    pub fn zoom_out(&mut self) -> ZoomLevel {
        self.zoom = self.zoom.zoom_out();
        self.zoom
    }

    pub fn layout_profile(&self) -> LayoutProfile {
        self.engine.profile()
    }

    /// Grid geometry for `container_width` at the current zoom.
    pub fn grid(&self, container_width: f64) -> GridLayout {
        self.engine.layout(container_width, self.zoom)
    }

    /// Triggers a background sync; changes arrive through `poll_changes`.
    pub fn force_sync(&self) -> Option<JoinHandle<()>> {
        self.store.force_sync()
    }

    pub fn context(&self) -> &ObjectContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ObjectContext {
        &mut self.context
    }

    /// Stops observing the store.
    pub fn teardown(self) {
        debug!(
            "event=board_close module=board status=ok context={}",
            self.context.name()
        );
        self.subscription.unsubscribe();
    }

    pub(crate) fn refresh_or_log(&mut self) {
        if let Err(err) = self.refresh() {
            warn!(
                "event=board_refresh module=board status=error error={}",
                err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DreamBoard;
    use crate::board::{CardFace, LayoutProfile};
    use crate::model::dream::Dream;
    use crate::store::PersistentStore;

    fn dream(title: &str) -> Dream {
        let mut dream = Dream::new();
        dream.title = title.to_string();
        dream
    }

    #[test]
    fn cards_follow_title_order() {
        let store = PersistentStore::in_memory().unwrap();
        let mut writer = store.new_background_context();
        writer.insert_dream(dream("Travel")).unwrap();
        writer.insert_dream(dream("Garden")).unwrap();
        writer.save().unwrap();

        let board = DreamBoard::new(store, LayoutProfile::desktop()).unwrap();
        let titles: Vec<&str> = board.cards().iter().map(|card| card.title).collect();
        assert_eq!(titles, vec!["Garden", "Travel"]);
    }

    #[test]
    fn poll_picks_up_background_commits() {
        let store = PersistentStore::in_memory().unwrap();
        let mut board = DreamBoard::new(store.clone(), LayoutProfile::phone()).unwrap();
        assert!(!board.poll_changes());

        let mut writer = store.new_background_context();
        writer.insert_dream(dream("Run a marathon")).unwrap();
        writer.save().unwrap();

        assert!(board.poll_changes());
        assert_eq!(board.len(), 1);
    }

    #[test]
    fn flips_are_forgotten_after_delete() {
        let store = PersistentStore::in_memory().unwrap();
        let mut writer = store.new_background_context();
        let id = writer.insert_dream(dream("Learn piano")).unwrap();
        writer.save().unwrap();

        let mut board = DreamBoard::new(store, LayoutProfile::desktop()).unwrap();
        assert_eq!(board.toggle_flip(id), CardFace::Back);
        assert!(board.delete_dream(id));
        assert!(board.card(id).is_none());
        assert!(board.is_empty());
    }

    #[test]
    fn teardown_unsubscribes_board() {
        let store = PersistentStore::in_memory().unwrap();
        let board = DreamBoard::new(store.clone(), LayoutProfile::desktop()).unwrap();
        // View context inbox plus the board's own subscription.
        assert_eq!(store.subscriber_count(), 2);
        board.teardown();
        assert_eq!(store.subscriber_count(), 0);
    }
}
