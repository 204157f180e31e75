//! Key/value persistence for store and cloud mirror bookkeeping.

use crate::repo::dream_repo::RepoResult;
use rusqlite::{params, Connection, OptionalExtension};

/// Key under which the store's commit generation is stored.
pub const STORE_GENERATION_KEY: &str = "store.generation";
/// Key under which the last imported cloud change token is stored.
pub const CLOUD_CHANGE_TOKEN_KEY: &str = "cloud.change_token";
/// Key under which this store's device identity is stored.
pub const DEVICE_ID_KEY: &str = "cloud.device_id";

pub fn get_value(conn: &Connection, key: &str) -> RepoResult<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM sync_state WHERE key = ?1;",
            [key],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(value)
}

pub fn set_value(conn: &Connection, key: &str, value: &str) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO sync_state (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
        params![key, value],
    )?;
    Ok(())
}
