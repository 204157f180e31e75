use rusqlite::Connection;
use visionboard_core::db::migrations::latest_version;
use visionboard_core::db::{open_db, open_db_in_memory, DbError};

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "dreams");
    assert_table_exists(&conn, "history_transactions");
    assert_table_exists(&conn, "history_changes");
    assert_table_exists(&conn, "sync_state");
}

#[test]
fn reopening_file_database_keeps_schema_and_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("visionboard.db");

    let conn = open_db(&path).unwrap();
    conn.execute(
        "INSERT INTO dreams (uuid, title) VALUES ('3f1c6a52-8d1e-4c1b-9a55-2f8f3b7f0c11', 'Sail');",
        [],
    )
    .unwrap();
    drop(conn);

    let reopened = open_db(&path).unwrap();
    assert_eq!(schema_version(&reopened), latest_version());
    let count: i64 = reopened
        .query_row("SELECT COUNT(*) FROM dreams;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn new_rows_get_storage_defaults() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO dreams (uuid) VALUES ('0b0d7f55-1f57-4d0e-8a0c-6c3b1f9d2e44');",
        [],
    )
    .unwrap();

    let (title, description, version, created_at): (String, String, i64, i64) = conn
        .query_row(
            "SELECT title, description, version, created_at FROM dreams;",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .unwrap();
    assert_eq!(title, "");
    assert_eq!(description, "");
    assert_eq!(version, 1);
    assert!(created_at > 0);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match open_db(&path).unwrap_err() {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
