use uuid::Uuid;
use visionboard_core::db::open_db_in_memory;
use visionboard_core::repo::dream_repo::{DreamListQuery, UpsertKind};
use visionboard_core::{
    Dream, DreamId, DreamRepository, DreamValidationError, RepoError, SqliteDreamRepository,
};

fn dream(title: &str) -> Dream {
    let mut dream = Dream::new();
    dream.title = title.to_string();
    dream
}

#[test]
fn insert_and_get_roundtrip_keeps_image_bytes() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDreamRepository::new(&conn);

    let mut goal = dream("Sail the Aegean");
    goal.description = "Two weeks, no phone".to_string();
    goal.image_data = Some(vec![0, 1, 2, 254, 255]);
    repo.insert_dream(&goal).unwrap();

    let stored = repo.get_dream(goal.id).unwrap().unwrap();
    assert_eq!(stored.dream, goal);
    assert_eq!(stored.version, 1);
    assert!(stored.updated_at >= stored.created_at);
}

#[test]
fn update_bumps_version() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDreamRepository::new(&conn);

    let mut goal = dream("draft");
    repo.insert_dream(&goal).unwrap();
    goal.title = "final".to_string();
    goal.image_data = Some(vec![9; 16]);

    assert_eq!(repo.update_dream(&goal).unwrap(), 2);
    let stored = repo.get_dream(goal.id).unwrap().unwrap();
    assert_eq!(stored.dream.title, "final");
    assert_eq!(stored.dream.image_data, Some(vec![9; 16]));
}

#[test]
fn update_missing_dream_returns_not_found() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDreamRepository::new(&conn);

    let ghost = dream("ghost");
    let err = repo.update_dream(&ghost).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(id) if id == ghost.id));
}

#[test]
fn upsert_reports_insert_then_update() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDreamRepository::new(&conn);

    let mut goal = dream("remote");
    assert_eq!(repo.upsert_dream(&goal).unwrap(), UpsertKind::Inserted);
    goal.description = "changed elsewhere".to_string();
    assert_eq!(repo.upsert_dream(&goal).unwrap(), UpsertKind::Updated);
    assert_eq!(repo.count_dreams().unwrap(), 1);
}

#[test]
fn nil_id_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDreamRepository::new(&conn);

    let invalid = Dream::with_id(DreamId::from_uuid(Uuid::nil()));
    let err = repo.insert_dream(&invalid).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(DreamValidationError::NilId)
    ));
}

#[test]
fn list_sorts_by_title_then_id_and_pages() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDreamRepository::new(&conn);

    for title in ["Zebra", "Apple", "Mango"] {
        repo.insert_dream(&dream(title)).unwrap();
    }
    let twin_a = dream("Apple");
    repo.insert_dream(&twin_a).unwrap();

    let all = repo.list_dreams(&DreamListQuery::default()).unwrap();
    let titles: Vec<&str> = all.iter().map(|row| row.dream.title.as_str()).collect();
    assert_eq!(titles, vec!["Apple", "Apple", "Mango", "Zebra"]);
    assert!(all[0].dream.id < all[1].dream.id);

    let page = repo
        .list_dreams(&DreamListQuery {
            limit: Some(2),
            offset: 2,
        })
        .unwrap();
    let titles: Vec<&str> = page.iter().map(|row| row.dream.title.as_str()).collect();
    assert_eq!(titles, vec!["Mango", "Zebra"]);
}

#[test]
fn delete_is_hard_and_reports_absence() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDreamRepository::new(&conn);

    let goal = dream("temporary");
    repo.insert_dream(&goal).unwrap();
    assert!(repo.delete_dream(goal.id).unwrap());
    assert!(!repo.delete_dream(goal.id).unwrap());
    assert!(repo.get_dream(goal.id).unwrap().is_none());
    assert_eq!(repo.count_dreams().unwrap(), 0);
}
