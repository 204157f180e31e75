use std::time::Duration;
use visionboard_core::repo::history_repo::{ChangeOrigin, ChangeType};
use visionboard_core::store::{MergePolicy, SaveOutcome, StoreConfig, StoreError};
use visionboard_core::sync::{RemoteChange, RemoteRecord};
use visionboard_core::{Dream, PersistentStore};

fn titled(title: &str) -> Dream {
    let mut dream = Dream::new();
    dream.title = title.to_string();
    dream
}

fn remote_upsert(dream: Dream) -> RemoteRecord {
    RemoteRecord {
        device_id: "other-device".to_string(),
        change: RemoteChange::Upsert { dream },
    }
}

#[test]
fn cancelled_untitled_insert_never_reaches_store() {
    let store = PersistentStore::in_memory().unwrap();
    let mut context = store.view_context();

    let id = context.insert_new_dream();
    assert!(context.is_inserted(id));
    context.delete(id).unwrap();

    assert!(!context.has_changes());
    assert_eq!(context.save().unwrap(), SaveOutcome::NoChanges);
    assert_eq!(store.count_dreams().unwrap(), 0);
}

#[test]
fn saving_titled_insert_adds_exactly_one_record() {
    let store = PersistentStore::in_memory().unwrap();
    let mut context = store.view_context();
    let before = store.count_dreams().unwrap();

    let id = context.insert_new_dream();
    context.set_title(id, "Goal A").unwrap();
    assert!(context.save_or_log());

    assert_eq!(store.count_dreams().unwrap(), before + 1);
    assert_eq!(store.load_dream(id).unwrap().unwrap().title, "Goal A");
    assert!(!context.has_changes());
}

#[test]
fn delete_removes_from_store_and_fetch() {
    let store = PersistentStore::in_memory().unwrap();
    let mut context = store.view_context();
    let id = context.insert_dream(titled("Ephemeral")).unwrap();
    context.save().unwrap();

    context.delete(id).unwrap();
    assert!(context.fetch_dreams().unwrap().is_empty());
    context.save().unwrap();

    assert!(store.load_dream(id).unwrap().is_none());
    assert!(context.fetch_dreams().unwrap().iter().all(|d| d.id != id));
}

#[test]
fn fetch_is_sorted_by_title_regardless_of_insert_order() {
    let store = PersistentStore::in_memory().unwrap();
    let mut context = store.view_context();
    context.insert_dream(titled("Zebra")).unwrap();
    context.insert_dream(titled("Apple")).unwrap();

    let pending: Vec<String> = context
        .fetch_dreams()
        .unwrap()
        .into_iter()
        .map(|dream| dream.title)
        .collect();
    assert_eq!(pending, vec!["Apple", "Zebra"]);

    context.save().unwrap();
    let durable: Vec<String> = store
        .list_dreams()
        .unwrap()
        .into_iter()
        .map(|dream| dream.title)
        .collect();
    assert_eq!(durable, vec!["Apple", "Zebra"]);
}

#[test]
fn image_bytes_survive_save_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("board.sqlite3");
    let blob: Vec<u8> = (0..=255u8).cycle().take(4096).collect();

    let id = {
        let store = PersistentStore::open(StoreConfig::file(&path)).unwrap();
        let mut context = store.view_context();
        let id = context.insert_new_dream();
        context.set_image_data(id, Some(blob.clone())).unwrap();
        context.save().unwrap();
        id
    };

    let reopened = PersistentStore::open(StoreConfig::file(&path)).unwrap();
    assert_eq!(reopened.load_dream(id).unwrap().unwrap().image_data, Some(blob));
    assert_eq!(reopened.current_generation(), 1);
}

#[test]
fn local_title_wins_over_remote_title_under_default_policy() {
    let store = PersistentStore::in_memory().unwrap();
    let mut context = store.view_context();
    let original = titled("Old");
    let id = context.insert_dream(original.clone()).unwrap();
    context.save().unwrap();

    context.set_title(id, "Local").unwrap();

    let mut remote = original;
    remote.title = "Remote".to_string();
    remote.description = "from the phone".to_string();
    store.apply_remote_records(&[remote_upsert(remote)]).unwrap();

    let merged = context.dream(id).unwrap().unwrap();
    assert_eq!(merged.title, "Local");
    assert_eq!(merged.description, "from the phone");

    context.save().unwrap();
    let durable = store.load_dream(id).unwrap().unwrap();
    assert_eq!(durable.title, "Local");
    assert_eq!(durable.description, "from the phone");
}

#[test]
fn store_trump_keeps_remote_title() {
    let store = PersistentStore::in_memory().unwrap();
    let mut context = store.view_context();
    context.set_merge_policy(MergePolicy::PropertyStoreTrump);
    let original = titled("Old");
    let id = context.insert_dream(original.clone()).unwrap();
    context.save().unwrap();

    context.set_title(id, "Local").unwrap();
    context.set_description(id, "kept").unwrap();
    let mut remote = original;
    remote.title = "Remote".to_string();
    store.apply_remote_records(&[remote_upsert(remote)]).unwrap();

    let merged = context.dream(id).unwrap().unwrap();
    assert_eq!(merged.title, "Remote");
    assert_eq!(merged.description, "kept");
}

#[test]
fn failed_save_leaves_context_dirty() {
    let store = PersistentStore::in_memory().unwrap();
    let mut writer = store.view_context();
    let id = writer.insert_dream(titled("Shared")).unwrap();
    writer.save().unwrap();

    let mut strict = store.new_background_context();
    strict.set_merge_policy(MergePolicy::Error);
    strict.set_title(id, "Mine").unwrap();

    writer.set_title(id, "Theirs").unwrap();
    writer.save().unwrap();

    let err = strict.save().unwrap_err();
    assert!(matches!(err, StoreError::MergeConflict { id: conflict, .. } if conflict == id));
    assert!(strict.has_changes());
    assert!(!strict.save_or_log());
    assert_eq!(store.load_dream(id).unwrap().unwrap().title, "Theirs");
}

#[test]
fn background_changes_stay_private_until_saved() {
    let store = PersistentStore::in_memory().unwrap();
    let mut view = store.view_context();
    let mut background = store.new_background_context();

    let id = background.insert_dream(titled("Hidden")).unwrap();
    assert!(view.fetch_dreams().unwrap().is_empty());
    assert!(view.dream(id).unwrap().is_none());

    background.save().unwrap();
    assert_eq!(view.dream(id).unwrap().unwrap().title, "Hidden");
}

#[test]
fn background_context_sees_commits_after_refresh() {
    let store = PersistentStore::in_memory().unwrap();
    let mut view = store.view_context();
    let id = view.insert_dream(titled("A")).unwrap();
    view.save().unwrap();

    let mut background = store.new_background_context();
    assert_eq!(background.dream(id).unwrap().unwrap().title, "A");

    view.set_title(id, "B").unwrap();
    view.save().unwrap();
    assert_eq!(background.dream(id).unwrap().unwrap().title, "A");

    let generation = background.set_query_generation_from_current().unwrap();
    assert_eq!(generation.0, store.current_generation());
    assert_eq!(background.dream(id).unwrap().unwrap().title, "B");
}

#[test]
fn view_drops_pending_edit_when_record_is_deleted_elsewhere() {
    let store = PersistentStore::in_memory().unwrap();
    let mut view = store.view_context();
    let id = view.insert_dream(titled("Doomed")).unwrap();
    view.save().unwrap();
    view.set_title(id, "Edited").unwrap();

    let mut other = store.new_background_context();
    other.delete(id).unwrap();
    other.save().unwrap();

    assert!(view.dream(id).unwrap().is_none());
    assert!(!view.has_changes());
}

#[test]
fn subscribers_receive_commit_notifications_in_order() {
    let store = PersistentStore::in_memory().unwrap();
    let subscription = store.subscribe();
    let mut context = store.new_background_context();

    let id = context.insert_dream(titled("First")).unwrap();
    context.save().unwrap();
    context.set_title(id, "Second").unwrap();
    context.save().unwrap();

    let first = subscription.recv_timeout(Duration::from_secs(1)).unwrap();
    let second = subscription.try_next().unwrap();
    assert_eq!(first.generation, 1);
    assert_eq!(first.inserted, vec![id]);
    assert_eq!(second.generation, 2);
    assert_eq!(second.updated, vec![id]);
    assert_eq!(second.origin, ChangeOrigin::Local);
    assert!(subscription.try_next().is_none());

    subscription.unsubscribe();
    assert_eq!(store.subscriber_count(), 0);
}

#[test]
fn remote_notifications_can_be_switched_off() {
    let config = StoreConfig {
        remote_change_notifications: false,
        ..StoreConfig::in_memory()
    };
    let store = PersistentStore::open(config).unwrap();
    let subscription = store.subscribe();

    store
        .apply_remote_records(&[remote_upsert(titled("Quiet"))])
        .unwrap();
    assert!(subscription.try_next().is_none());
    assert_eq!(store.count_dreams().unwrap(), 1);
}

#[test]
fn history_records_local_and_remote_commits() {
    let store = PersistentStore::in_memory().unwrap();
    let mut context = store.view_context();
    let id = context.insert_dream(titled("Tracked")).unwrap();
    context.save().unwrap();
    store
        .apply_remote_records(&[remote_upsert(titled("Imported"))])
        .unwrap();
    context.delete(id).unwrap();
    context.save().unwrap();

    let history = store.history_since(0).unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].origin, ChangeOrigin::Local);
    assert_eq!(history[0].changes, vec![(id, ChangeType::Insert)]);
    assert_eq!(history[1].origin, ChangeOrigin::Remote);
    assert_eq!(history[2].changes, vec![(id, ChangeType::Delete)]);

    assert_eq!(store.purge_history_through(2).unwrap(), 2);
    assert_eq!(store.history_since(0).unwrap().len(), 1);
}

#[test]
fn history_can_be_disabled() {
    let config = StoreConfig {
        history_tracking: false,
        ..StoreConfig::in_memory()
    };
    let store = PersistentStore::open(config).unwrap();
    let mut context = store.view_context();
    context.insert_dream(titled("Untracked")).unwrap();
    context.save().unwrap();

    assert_eq!(store.current_generation(), 1);
    assert!(store.history_since(0).unwrap().is_empty());
}
