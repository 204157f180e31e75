//! Dream repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD APIs over the canonical `dreams` table.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Write paths call `Dream::validate()` before SQL mutations.
//! - Listing order is always `title ASC, uuid ASC` (BINARY collation).
//! - Every write bumps the row `version`.

use crate::db::DbError;
use crate::model::dream::{Dream, DreamId, DreamValidationError};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const DREAM_SELECT_SQL: &str = "SELECT
    uuid,
    title,
    description,
    image_data,
    version,
    created_at,
    updated_at
FROM dreams";

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for Dream persistence and queries.
#[derive(Debug)]
pub enum RepoError {
    Validation(DreamValidationError),
    Db(DbError),
    NotFound(DreamId),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "dream not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted dream data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DreamValidationError> for RepoError {
    fn from(value: DreamValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Durable row: the Dream plus storage metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDream {
    pub dream: Dream,
    /// Monotonic per-row write counter.
    pub version: i64,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds.
    pub updated_at: i64,
}

/// Result of an upsert from a remote record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertKind {
    Inserted,
    Updated,
}

/// Query options for listing dreams.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DreamListQuery {
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Repository interface for Dream CRUD operations.
pub trait DreamRepository {
    fn insert_dream(&self, dream: &Dream) -> RepoResult<DreamId>;
    /// Overwrites all user fields; returns the new row version.
    fn update_dream(&self, dream: &Dream) -> RepoResult<i64>;
    fn upsert_dream(&self, dream: &Dream) -> RepoResult<UpsertKind>;
    fn get_dream(&self, id: DreamId) -> RepoResult<Option<StoredDream>>;
    fn list_dreams(&self, query: &DreamListQuery) -> RepoResult<Vec<StoredDream>>;
    /// Hard delete. Returns whether a row was removed.
    fn delete_dream(&self, id: DreamId) -> RepoResult<bool>;
    fn count_dreams(&self) -> RepoResult<u64>;
}

/// SQLite-backed Dream repository.
pub struct SqliteDreamRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDreamRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl DreamRepository for SqliteDreamRepository<'_> {
    fn insert_dream(&self, dream: &Dream) -> RepoResult<DreamId> {
        dream.validate()?;

        self.conn.execute(
            "INSERT INTO dreams (uuid, title, description, image_data)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                dream.id.to_string(),
                dream.title.as_str(),
                dream.description.as_str(),
                dream.image_data.as_deref(),
            ],
        )?;

        Ok(dream.id)
    }

    fn update_dream(&self, dream: &Dream) -> RepoResult<i64> {
        dream.validate()?;

        let version = self
            .conn
            .query_row(
                "UPDATE dreams
                 SET
                    title = ?1,
                    description = ?2,
                    image_data = ?3,
                    version = version + 1,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE uuid = ?4
                 RETURNING version;",
                params![
                    dream.title.as_str(),
                    dream.description.as_str(),
                    dream.image_data.as_deref(),
                    dream.id.to_string(),
                ],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;

        version.ok_or(RepoError::NotFound(dream.id))
    }

    fn upsert_dream(&self, dream: &Dream) -> RepoResult<UpsertKind> {
        match self.update_dream(dream) {
            Ok(_) => Ok(UpsertKind::Updated),
            Err(RepoError::NotFound(_)) => {
                self.insert_dream(dream)?;
                Ok(UpsertKind::Inserted)
            }
            Err(err) => Err(err),
        }
    }

    fn get_dream(&self, id: DreamId) -> RepoResult<Option<StoredDream>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{DREAM_SELECT_SQL} WHERE uuid = ?1;"))?;

        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_dream_row(row)?));
        }

        Ok(None)
    }

    fn list_dreams(&self, query: &DreamListQuery) -> RepoResult<Vec<StoredDream>> {
        let mut sql = format!("{DREAM_SELECT_SQL} ORDER BY title ASC, uuid ASC");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut dreams = Vec::new();

        while let Some(row) = rows.next()? {
            dreams.push(parse_dream_row(row)?);
        }

        Ok(dreams)
    }

    fn delete_dream(&self, id: DreamId) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM dreams WHERE uuid = ?1;", [id.to_string()])?;
        Ok(changed > 0)
    }

    fn count_dreams(&self) -> RepoResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM dreams;", [], |row| row.get(0))?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative dream count `{count}`")))
    }
}

fn parse_dream_row(row: &Row<'_>) -> RepoResult<StoredDream> {
    let uuid_text: String = row.get("uuid")?;
    let id: DreamId = uuid_text.parse().map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{uuid_text}` in dreams.uuid"))
    })?;

    let dream = Dream {
        id,
        title: row.get("title")?,
        description: row.get("description")?,
        image_data: row.get("image_data")?,
    };
    dream.validate()?;

    Ok(StoredDream {
        dream,
        version: row.get("version")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
