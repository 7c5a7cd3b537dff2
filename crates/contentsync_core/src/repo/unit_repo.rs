//! Content unit repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist units keyed by `(type_id, canonical unit_key)`.
//! - Own the atomic insert-or-fetch used for idempotent unit creation.
//! - Own parent/child link rows.
//!
//! # Invariants
//! - Unit creation relies on the schema's UNIQUE constraint, never on a
//!   read-then-write check, so racing writers converge on one row.
//! - Child links are set-inserts; concurrent linkers never overwrite each
//!   other's children.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::DbError;
use crate::model::content_unit::{canonical_unit_key, ContentUnit, Metadata, UnitId, UnitKey};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const UNIT_SELECT_SQL: &str = "SELECT
    id,
    type_id,
    unit_key,
    metadata,
    storage_path,
    updated_at
FROM content_units";

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for unit and association persistence.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    UnitNotFound { type_id: String, id: UnitId },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::UnitNotFound { type_id, id } => {
                write!(f, "content unit not found: {type_id}/{id}")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted unit data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::UnitNotFound { .. } => None,
            Self::InvalidData(_) => None,
        }
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

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidData(value.to_string())
    }
}

/// Result of an insert-or-fetch on the natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub id: UnitId,
    /// `false` when the natural key already existed.
    pub created: bool,
}

/// Repository interface for content unit persistence.
pub trait UnitRepository {
    /// Inserts `unit` unless its natural key exists; an existing row takes the
    /// unit's metadata and (when set) storage path.
    fn upsert_unit(&self, unit: &ContentUnit) -> RepoResult<UpsertOutcome>;
    /// Replaces metadata of a persisted unit, and its storage path when set.
    fn update_unit(&self, id: UnitId, unit: &ContentUnit) -> RepoResult<()>;
    /// Merges `metadata` keys into the stored metadata.
    fn merge_metadata(&self, type_id: &str, id: UnitId, metadata: &Metadata) -> RepoResult<()>;
    fn get_unit(&self, type_id: &str, id: UnitId) -> RepoResult<Option<ContentUnit>>;
    fn find_unit_by_key(&self, type_id: &str, unit_key: &UnitKey)
        -> RepoResult<Option<ContentUnit>>;
    fn count_units(&self, type_id: &str) -> RepoResult<u64>;
    /// Adds a child link; returns `false` when it already existed.
    fn add_child(&self, parent_id: UnitId, child_type_id: &str, child_id: UnitId)
        -> RepoResult<bool>;
    /// Removes a child link; returns `false` when it did not exist.
    fn remove_child(
        &self,
        parent_id: UnitId,
        child_type_id: &str,
        child_id: UnitId,
    ) -> RepoResult<bool>;
    /// Lists child ids of one type in link order.
    fn list_children(&self, parent_id: UnitId, child_type_id: &str) -> RepoResult<Vec<UnitId>>;
}

/// SQLite-backed unit repository.
#[derive(Clone, Copy)]
pub struct SqliteUnitRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUnitRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl UnitRepository for SqliteUnitRepository<'_> {
    fn upsert_unit(&self, unit: &ContentUnit) -> RepoResult<UpsertOutcome> {
        let key_text = canonical_unit_key(&unit.unit_key)?;
        let metadata_text = serde_json::to_string(&unit.metadata)?;
        let candidate = Uuid::new_v4();

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let inserted = tx.execute(
            "INSERT INTO content_units (
                id,
                type_id,
                unit_key,
                metadata,
                storage_path
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (type_id, unit_key) DO NOTHING;",
            params![
                candidate.to_string(),
                unit.type_id.as_str(),
                key_text.as_str(),
                metadata_text.as_str(),
                unit.storage_path.as_deref(),
            ],
        )?;

        let outcome = if inserted == 1 {
            UpsertOutcome {
                id: candidate,
                created: true,
            }
        } else {
            let existing: String = tx.query_row(
                "SELECT id
                 FROM content_units
                 WHERE type_id = ?1
                   AND unit_key = ?2;",
                params![unit.type_id.as_str(), key_text.as_str()],
                |row| row.get(0),
            )?;
            tx.execute(
                "UPDATE content_units
                 SET
                    metadata = ?2,
                    storage_path = COALESCE(?3, storage_path),
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1;",
                params![
                    existing.as_str(),
                    metadata_text.as_str(),
                    unit.storage_path.as_deref()
                ],
            )?;
            UpsertOutcome {
                id: parse_unit_id(&existing)?,
                created: false,
            }
        };
        tx.commit()?;

        Ok(outcome)
    }

    fn update_unit(&self, id: UnitId, unit: &ContentUnit) -> RepoResult<()> {
        let metadata_text = serde_json::to_string(&unit.metadata)?;
        let changed = self.conn.execute(
            "UPDATE content_units
             SET
                metadata = ?3,
                storage_path = COALESCE(?4, storage_path),
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND type_id = ?2;",
            params![
                id.to_string(),
                unit.type_id.as_str(),
                metadata_text.as_str(),
                unit.storage_path.as_deref(),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::UnitNotFound {
                type_id: unit.type_id.clone(),
                id,
            });
        }

        Ok(())
    }

    fn merge_metadata(&self, type_id: &str, id: UnitId, metadata: &Metadata) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let stored: Option<String> = tx
            .query_row(
                "SELECT metadata
                 FROM content_units
                 WHERE id = ?1
                   AND type_id = ?2;",
                params![id.to_string(), type_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(stored) = stored else {
            return Err(RepoError::UnitNotFound {
                type_id: type_id.to_string(),
                id,
            });
        };

        let mut merged: Metadata = serde_json::from_str(&stored)?;
        merged.extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        tx.execute(
            "UPDATE content_units
             SET
                metadata = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id.to_string(), serde_json::to_string(&merged)?],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn get_unit(&self, type_id: &str, id: UnitId) -> RepoResult<Option<ContentUnit>> {
        let mut stmt = self.conn.prepare(&format!(
            "{UNIT_SELECT_SQL}
             WHERE id = ?1
               AND type_id = ?2;"
        ))?;

        let mut rows = stmt.query(params![id.to_string(), type_id])?;
        if let Some(row) = rows.next()? {
            let mut unit = parse_unit_row(row)?;
            unit.children = load_children(self.conn, id)?;
            return Ok(Some(unit));
        }

        Ok(None)
    }

    fn find_unit_by_key(
        &self,
        type_id: &str,
        unit_key: &UnitKey,
    ) -> RepoResult<Option<ContentUnit>> {
        let key_text = canonical_unit_key(unit_key)?;
        let mut stmt = self.conn.prepare(&format!(
            "{UNIT_SELECT_SQL}
             WHERE type_id = ?1
               AND unit_key = ?2;"
        ))?;

        let mut rows = stmt.query(params![type_id, key_text])?;
        if let Some(row) = rows.next()? {
            let mut unit = parse_unit_row(row)?;
            if let Some(id) = unit.id {
                unit.children = load_children(self.conn, id)?;
            }
            return Ok(Some(unit));
        }

        Ok(None)
    }

    fn count_units(&self, type_id: &str) -> RepoResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM content_units WHERE type_id = ?1;",
            [type_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn add_child(
        &self,
        parent_id: UnitId,
        child_type_id: &str,
        child_id: UnitId,
    ) -> RepoResult<bool> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let inserted = tx.execute(
            "INSERT INTO unit_children (
                parent_id,
                child_type_id,
                child_id
            ) VALUES (?1, ?2, ?3)
            ON CONFLICT (parent_id, child_type_id, child_id) DO NOTHING;",
            params![parent_id.to_string(), child_type_id, child_id.to_string()],
        )?;
        if inserted == 1 {
            touch_unit(&tx, parent_id)?;
        }
        tx.commit()?;
        Ok(inserted == 1)
    }

    fn remove_child(
        &self,
        parent_id: UnitId,
        child_type_id: &str,
        child_id: UnitId,
    ) -> RepoResult<bool> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let removed = tx.execute(
            "DELETE FROM unit_children
             WHERE parent_id = ?1
               AND child_type_id = ?2
               AND child_id = ?3;",
            params![parent_id.to_string(), child_type_id, child_id.to_string()],
        )?;
        if removed > 0 {
            touch_unit(&tx, parent_id)?;
        }
        tx.commit()?;
        Ok(removed > 0)
    }

    fn list_children(&self, parent_id: UnitId, child_type_id: &str) -> RepoResult<Vec<UnitId>> {
        let mut stmt = self.conn.prepare(
            "SELECT child_id
             FROM unit_children
             WHERE parent_id = ?1
               AND child_type_id = ?2
             ORDER BY seq ASC;",
        )?;
        let mut rows = stmt.query(params![parent_id.to_string(), child_type_id])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let text: String = row.get(0)?;
            ids.push(parse_unit_id(&text)?);
        }
        Ok(ids)
    }
}

fn touch_unit(conn: &Connection, id: UnitId) -> RepoResult<()> {
    conn.execute(
        "UPDATE content_units
         SET updated_at = (strftime('%s', 'now') * 1000)
         WHERE id = ?1;",
        [id.to_string()],
    )?;
    Ok(())
}

fn load_children(
    conn: &Connection,
    parent_id: UnitId,
) -> RepoResult<BTreeMap<String, Vec<UnitId>>> {
    let mut stmt = conn.prepare(
        "SELECT child_type_id, child_id
         FROM unit_children
         WHERE parent_id = ?1
         ORDER BY seq ASC;",
    )?;
    let mut rows = stmt.query([parent_id.to_string()])?;
    let mut children: BTreeMap<String, Vec<UnitId>> = BTreeMap::new();
    while let Some(row) = rows.next()? {
        let child_type_id: String = row.get(0)?;
        let child_text: String = row.get(1)?;
        children
            .entry(child_type_id)
            .or_default()
            .push(parse_unit_id(&child_text)?);
    }
    Ok(children)
}

fn parse_unit_row(row: &Row<'_>) -> RepoResult<ContentUnit> {
    let id_text: String = row.get("id")?;
    let id = parse_unit_id(&id_text)?;

    let key_text: String = row.get("unit_key")?;
    let unit_key: UnitKey = serde_json::from_str(&key_text).map_err(|err| {
        RepoError::InvalidData(format!(
            "invalid unit key `{key_text}` in content_units.unit_key: {err}"
        ))
    })?;

    let metadata_text: String = row.get("metadata")?;
    let metadata: Metadata = serde_json::from_str(&metadata_text).map_err(|err| {
        RepoError::InvalidData(format!(
            "invalid metadata for unit {id} in content_units.metadata: {err}"
        ))
    })?;

    Ok(ContentUnit {
        id: Some(id),
        type_id: row.get("type_id")?,
        unit_key,
        metadata,
        storage_path: row.get("storage_path")?,
        children: BTreeMap::new(),
        updated_at: Some(row.get("updated_at")?),
    })
}

pub(crate) fn parse_unit_id(value: &str) -> RepoResult<UnitId> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid unit id value `{value}`")))
}
