//! Persistent history of committed store transactions.
//!
//! # Responsibility
//! - Append one `history_transactions` row per commit, with its record changes.
//! - Read back and purge history by generation.
//!
//! # Invariants
//! - Generations are allocated by the store and strictly increase.
//! - Change rows are removed together with their transaction.

use crate::model::dream::DreamId;
use crate::repo::dream_repo::{RepoError, RepoResult};
use rusqlite::{params, Connection};

/// Where a committed transaction came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeOrigin {
    /// Saved by a context in this process.
    Local,
    /// Imported from the cloud mirror.
    Remote,
}

impl ChangeOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "local" => Some(Self::Local),
            "remote" => Some(Self::Remote),
            _ => None,
        }
    }
}

/// Kind of change one transaction applied to one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    Insert,
    Update,
    Delete,
}

impl ChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "insert" => Some(Self::Insert),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// One committed transaction read back from history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTransaction {
    pub generation: u64,
    pub author: String,
    pub origin: ChangeOrigin,
    pub committed_at: i64,
    pub changes: Vec<(DreamId, ChangeType)>,
}

/// Appends one transaction row under a caller-allocated generation.
pub fn append_transaction(
    conn: &Connection,
    generation: u64,
    author: &str,
    origin: ChangeOrigin,
    changes: &[(DreamId, ChangeType)],
) -> RepoResult<()> {
    let generation = to_sql_generation(generation)?;
    conn.execute(
        "INSERT INTO history_transactions (generation, author, origin) VALUES (?1, ?2, ?3);",
        params![generation, author, origin.as_str()],
    )?;

    let mut stmt = conn.prepare(
        "INSERT OR REPLACE INTO history_changes (generation, dream_uuid, change_type)
         VALUES (?1, ?2, ?3);",
    )?;
    for (id, change_type) in changes {
        stmt.execute(params![generation, id.to_string(), change_type.as_str()])?;
    }

    Ok(())
}

/// Lists transactions with `generation > after`, oldest first.
pub fn transactions_after(conn: &Connection, after: u64) -> RepoResult<Vec<HistoryTransaction>> {
    let after = to_sql_generation(after)?;

    let mut stmt = conn.prepare(
        "SELECT generation, author, origin, committed_at
         FROM history_transactions
         WHERE generation > ?1
         ORDER BY generation ASC;",
    )?;
    let mut rows = stmt.query([after])?;
    let mut transactions = Vec::new();
    while let Some(row) = rows.next()? {
        let origin_text: String = row.get(2)?;
        let origin = ChangeOrigin::parse(&origin_text).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid origin `{origin_text}` in history_transactions.origin"
            ))
        })?;
        transactions.push(HistoryTransaction {
            generation: to_generation(row.get(0)?)?,
            author: row.get(1)?,
            origin,
            committed_at: row.get(3)?,
            changes: Vec::new(),
        });
    }

    let mut change_stmt = conn.prepare(
        "SELECT dream_uuid, change_type
         FROM history_changes
         WHERE generation = ?1
         ORDER BY dream_uuid ASC;",
    )?;
    for transaction in &mut transactions {
        let mut rows = change_stmt.query([to_sql_generation(transaction.generation)?])?;
        while let Some(row) = rows.next()? {
            let uuid_text: String = row.get(0)?;
            let id: DreamId = uuid_text.parse().map_err(|_| {
                RepoError::InvalidData(format!(
                    "invalid uuid `{uuid_text}` in history_changes.dream_uuid"
                ))
            })?;
            let type_text: String = row.get(1)?;
            let change_type = ChangeType::parse(&type_text).ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "invalid change type `{type_text}` in history_changes.change_type"
                ))
            })?;
            transaction.changes.push((id, change_type));
        }
    }

    Ok(transactions)
}

/// Deletes transactions with `generation <= through`; returns removed count.
pub fn purge_through(conn: &Connection, through: u64) -> RepoResult<usize> {
    let through = to_sql_generation(through)?;
    conn.execute(
        "DELETE FROM history_changes WHERE generation <= ?1;",
        [through],
    )?;
    let removed = conn.execute(
        "DELETE FROM history_transactions WHERE generation <= ?1;",
        [through],
    )?;
    Ok(removed)
}

fn to_sql_generation(value: u64) -> RepoResult<i64> {
    i64::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("generation `{value}` out of range")))
}

fn to_generation(value: i64) -> RepoResult<u64> {
    u64::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("negative generation `{value}`")))
}
