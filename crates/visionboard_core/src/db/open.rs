//! Connection setup: pragmas, then migrations.

use super::migrations::apply_migrations;
use super::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens (or creates) the database file at `path`, migrated to the latest schema.
///
/// File databases run in WAL mode so the force-sync thread can read while
/// the UI commits.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let path = path.as_ref();
    let location = path.display().to_string();
    open_with(&location, true, || Connection::open(path))
}

/// Opens a migrated, throwaway in-memory database.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_with(":memory:", false, Connection::open_in_memory)
}

fn open_with(
    location: &str,
    wal: bool,
    connect: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();

    let result = connect()
        .map_err(|source| DbError::Open {
            location: location.to_string(),
            source,
        })
        .and_then(|mut conn| {
            configure(&conn, wal)?;
            let applied = apply_migrations(&mut conn)?;
            Ok((conn, applied))
        });

    match result {
        Ok((conn, applied)) => {
            info!(
                "event=db_open module=db status=ok wal={} migrations_applied={} duration_ms={}",
                wal,
                applied,
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error wal={} duration_ms={} error={}",
                wal,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn configure(conn: &Connection, wal: bool) -> DbResult<()> {
    conn.pragma_update(None, "foreign_keys", true)?;
    if wal {
        // journal_mode answers with a row.
        let _: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    }
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}
