//! Repository/unit association contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist the repository to content unit join table.
//! - Expose repository listings as lazily paged, restartable sequences.
//!
//! # Invariants
//! - `(repo_id, unit_id, unit_type_id)` is unique; associate and
//!   disassociate are single idempotent statements.
//! - Repository listings are ordered by insertion sequence.
//! - Association writes never touch `content_units`.

use crate::model::association::{AssociationOwner, OwnerType, RepoContentUnit};
use crate::model::content_unit::UnitId;
use crate::repo::unit_repo::{parse_unit_id, RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::collections::VecDeque;

/// Rows fetched per round trip when callers do not configure a page size.
pub const DEFAULT_PAGE_SIZE: u32 = 500;

const ASSOCIATION_SELECT_SQL: &str = "SELECT
    seq,
    repo_id,
    unit_id,
    unit_type_id,
    owner_type,
    owner_id,
    created_at,
    updated_at
FROM repo_content_units";

/// Filter options for repository listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociationQuery {
    /// Restrict to these unit types. `Some(vec![])` matches nothing.
    pub type_ids: Option<Vec<String>>,
    /// Maximum rows to yield.
    pub limit: Option<u32>,
}

impl AssociationQuery {
    pub fn for_types<I>(type_ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            type_ids: Some(type_ids.into_iter().map(Into::into).collect()),
            limit: None,
        }
    }
}

/// Repository interface for association persistence.
pub trait AssociationRepository {
    /// Inserts the join row; returns `false` when it already existed.
    fn associate(
        &self,
        repo_id: &str,
        unit_id: UnitId,
        unit_type_id: &str,
        owner: &AssociationOwner,
    ) -> RepoResult<bool>;
    /// Deletes the join row; returns `false` when it did not exist.
    fn disassociate(&self, repo_id: &str, unit_id: UnitId, unit_type_id: &str)
        -> RepoResult<bool>;
    fn get_association(
        &self,
        repo_id: &str,
        unit_id: UnitId,
        unit_type_id: &str,
    ) -> RepoResult<Option<RepoContentUnit>>;
    /// Fetches up to `page_size` rows of `repo_id` with `seq > after_seq`.
    fn fetch_page(
        &self,
        repo_id: &str,
        query: &AssociationQuery,
        after_seq: i64,
        page_size: u32,
    ) -> RepoResult<Vec<RepoContentUnit>>;
    /// Lists every repository holding the unit.
    fn repos_for_unit(&self, unit_id: UnitId, unit_type_id: &str)
        -> RepoResult<Vec<RepoContentUnit>>;
    fn count_for_repo(&self, repo_id: &str) -> RepoResult<u64>;

    fn page_size(&self) -> u32 {
        DEFAULT_PAGE_SIZE
    }

    /// Lazily walks the units of `repo_id`.
    ///
    /// Each call starts a fresh walk; rows are fetched a page at a time.
    fn units_for_repo(&self, repo_id: &str, query: &AssociationQuery) -> AssociationPages<'_, Self>
    where
        Self: Sized,
    {
        AssociationPages::new(self, repo_id, query.clone())
    }
}

/// Iterator over one repository's associations, fetched in pages.
pub struct AssociationPages<'r, R: AssociationRepository> {
    repo: &'r R,
    repo_id: String,
    query: AssociationQuery,
    buffer: VecDeque<RepoContentUnit>,
    after_seq: i64,
    remaining: Option<u32>,
    exhausted: bool,
}

impl<'r, R: AssociationRepository> AssociationPages<'r, R> {
    fn new(repo: &'r R, repo_id: &str, query: AssociationQuery) -> Self {
        let remaining = query.limit;
        Self {
            repo,
            repo_id: repo_id.to_string(),
            query,
            buffer: VecDeque::new(),
            after_seq: 0,
            remaining,
            exhausted: false,
        }
    }

    fn refill(&mut self) -> RepoResult<()> {
        let page_size = match self.remaining {
            Some(remaining) => remaining.min(self.repo.page_size()),
            None => self.repo.page_size(),
        }
        .max(1);
        let page = self
            .repo
            .fetch_page(&self.repo_id, &self.query, self.after_seq, page_size)?;
        if (page.len() as u32) < page_size {
            self.exhausted = true;
        }
        if let Some(last) = page.last() {
            self.after_seq = last.seq;
        }
        self.buffer.extend(page);
        Ok(())
    }
}

impl<R: AssociationRepository> Iterator for AssociationPages<'_, R> {
    type Item = RepoResult<RepoContentUnit>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            return None;
        }
        if self.buffer.is_empty() {
            if self.exhausted {
                return None;
            }
            if let Err(err) = self.refill() {
                self.exhausted = true;
                self.buffer.clear();
                return Some(Err(err));
            }
        }

        let item = self.buffer.pop_front()?;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(Ok(item))
    }
}

/// SQLite-backed association repository.
#[derive(Clone, Copy)]
pub struct SqliteAssociationRepository<'conn> {
    conn: &'conn Connection,
    page_size: u32,
}

impl<'conn> SqliteAssociationRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self::with_page_size(conn, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(conn: &'conn Connection, page_size: u32) -> Self {
        Self {
            conn,
            page_size: page_size.max(1),
        }
    }
}

impl AssociationRepository for SqliteAssociationRepository<'_> {
    fn associate(
        &self,
        repo_id: &str,
        unit_id: UnitId,
        unit_type_id: &str,
        owner: &AssociationOwner,
    ) -> RepoResult<bool> {
        let inserted = self.conn.execute(
            "INSERT INTO repo_content_units (
                repo_id,
                unit_id,
                unit_type_id,
                owner_type,
                owner_id
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (repo_id, unit_id, unit_type_id) DO NOTHING;",
            params![
                repo_id,
                unit_id.to_string(),
                unit_type_id,
                owner.owner_type.as_str(),
                owner.owner_id.as_str(),
            ],
        )?;
        Ok(inserted == 1)
    }

    fn disassociate(
        &self,
        repo_id: &str,
        unit_id: UnitId,
        unit_type_id: &str,
    ) -> RepoResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM repo_content_units
             WHERE repo_id = ?1
               AND unit_id = ?2
               AND unit_type_id = ?3;",
            params![repo_id, unit_id.to_string(), unit_type_id],
        )?;
        Ok(removed > 0)
    }

    fn get_association(
        &self,
        repo_id: &str,
        unit_id: UnitId,
        unit_type_id: &str,
    ) -> RepoResult<Option<RepoContentUnit>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ASSOCIATION_SELECT_SQL}
             WHERE repo_id = ?1
               AND unit_id = ?2
               AND unit_type_id = ?3;"
        ))?;
        let mut rows = stmt.query(params![repo_id, unit_id.to_string(), unit_type_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_association_row(row)?));
        }
        Ok(None)
    }

    fn fetch_page(
        &self,
        repo_id: &str,
        query: &AssociationQuery,
        after_seq: i64,
        page_size: u32,
    ) -> RepoResult<Vec<RepoContentUnit>> {
        let mut sql = format!("{ASSOCIATION_SELECT_SQL} WHERE repo_id = ? AND seq > ?");
        let mut bind_values: Vec<Value> = vec![
            Value::Text(repo_id.to_string()),
            Value::Integer(after_seq),
        ];

        if let Some(type_ids) = &query.type_ids {
            if type_ids.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders = vec!["?"; type_ids.len()].join(", ");
            sql.push_str(&format!(" AND unit_type_id IN ({placeholders})"));
            bind_values.extend(type_ids.iter().map(|id| Value::Text(id.clone())));
        }

        sql.push_str(" ORDER BY seq ASC LIMIT ?");
        bind_values.push(Value::Integer(i64::from(page_size)));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_association_row(row)?);
        }
        Ok(items)
    }

    fn repos_for_unit(
        &self,
        unit_id: UnitId,
        unit_type_id: &str,
    ) -> RepoResult<Vec<RepoContentUnit>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ASSOCIATION_SELECT_SQL}
             WHERE unit_id = ?1
               AND unit_type_id = ?2
             ORDER BY repo_id ASC;"
        ))?;
        let mut rows = stmt.query(params![unit_id.to_string(), unit_type_id])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_association_row(row)?);
        }
        Ok(items)
    }

    fn count_for_repo(&self, repo_id: &str) -> RepoResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM repo_content_units WHERE repo_id = ?1;",
            [repo_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn page_size(&self) -> u32 {
        self.page_size
    }
}

fn parse_association_row(row: &Row<'_>) -> RepoResult<RepoContentUnit> {
    let unit_text: String = row.get("unit_id")?;
    let owner_text: String = row.get("owner_type")?;
    let owner_type = OwnerType::parse(&owner_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid owner type `{owner_text}` in repo_content_units.owner_type"
        ))
    })?;

    Ok(RepoContentUnit {
        seq: row.get("seq")?,
        repo_id: row.get("repo_id")?,
        unit_id: parse_unit_id(&unit_text)?,
        unit_type_id: row.get("unit_type_id")?,
        owner: AssociationOwner {
            owner_type,
            owner_id: row.get("owner_id")?,
        },
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
