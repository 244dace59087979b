use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row, ToSql};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::schema::init_schema;
use super::{MemberRecord, TypeKind, TypeRecord};
use crate::error::{PrismError, Result};

/// Type alias for connection pool
pub type ConnectionPool = Pool<SqliteConnectionManager>;

impl ToSql for TypeKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TypeKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        TypeKind::parse(text)
            .ok_or_else(|| FromSqlError::Other(format!("unknown type kind: {}", text).into()))
    }
}

/// Lifecycle of a namespace store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    NotIndexed,
    Populating,
    Ready,
}

impl IndexState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexState::NotIndexed => "not_indexed",
            IndexState::Populating => "populating",
            IndexState::Ready => "ready",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "populating" => IndexState::Populating,
            "ready" => IndexState::Ready,
            _ => IndexState::NotIndexed,
        }
    }
}

/// Keys used in the `index_meta` table
pub mod meta {
    pub const SCHEMA_VERSION: &str = "schema_version";
    pub const STATE: &str = "state";
    pub const INDEXED_AT: &str = "indexed_at";
    pub const FILES_INDEXED: &str = "files_indexed";
    pub const SOURCE_DIGEST: &str = "source_digest";
}

/// Type row without members
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeSummary {
    pub package: String,
    pub type_name: String,
    pub kind: TypeKind,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<String>,
}

/// Type row with its (possibly filtered) members
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDetail {
    pub package: String,
    pub type_name: String,
    pub kind: TypeKind,
    pub path: String,
    pub parent: Option<String>,
    pub interfaces: Vec<String>,
    pub members: Vec<MemberRecord>,
}

/// One full-text match
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub package: String,
    pub type_name: String,
    pub kind: TypeKind,
    pub member_name: String,
    pub return_type: String,
    pub params: String,
    pub path: String,
    /// Matching rows for this type within the over-fetched window; only set when deduplicating
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_count: Option<usize>,
}

/// Parameters of a full-text search, already validated and clamped
#[derive(Debug, Clone)]
pub struct SearchQuery<'a> {
    pub term: &'a str,
    pub limit: usize,
    pub package_prefix: Option<&'a str>,
    pub kind: Option<TypeKind>,
    pub dedupe_by_type: bool,
    pub overfetch: usize,
}

/// Index statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub type_count: usize,
    pub member_count: usize,
}

/// Database connection manager
#[derive(Clone)]
pub struct IndexDatabase {
    pool: ConnectionPool,
    db_path: PathBuf,
}

impl IndexDatabase {
    /// Open a store for writing, (re)creating its schema
    pub fn create(db_path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        info!("Opening index store for writing at: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(&db_path).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")
        });

        let pool = Pool::builder()
            .max_size(2)
            .connection_timeout(Duration::from_secs(10))
            .build(manager)?;

        {
            let conn = pool.get()?;
            init_schema(&conn)?;
        }

        Ok(Self { pool, db_path })
    }

    /// Open an existing store read-only. A missing file means the namespace was never indexed.
    pub fn open_existing(
        db_path: impl AsRef<Path>,
        namespace: &str,
        busy_timeout: Duration,
    ) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if !db_path.is_file() {
            return Err(PrismError::no_index(namespace));
        }

        debug!("Opening index store read-only at: {}", db_path.display());

        let manager = SqliteConnectionManager::file(&db_path)
            .with_flags(
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .with_init(move |conn| conn.busy_timeout(busy_timeout));

        let pool = Pool::builder()
            .max_size(4)
            .min_idle(Some(0))
            .connection_timeout(Duration::from_secs(10))
            .build(manager)?;

        Ok(Self { pool, db_path })
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Lifecycle state recorded by the last indexing run
    pub fn state(&self) -> Result<IndexState> {
        let conn = self.get_conn()?;
        match get_meta(&conn, meta::STATE) {
            Ok(value) => Ok(value.map_or(IndexState::NotIndexed, |v| IndexState::parse(&v))),
            Err(PrismError::Store(e)) if e.to_string().contains("no such table") => {
                Ok(IndexState::NotIndexed)
            }
            Err(e) => Err(e),
        }
    }

    pub fn meta(&self, key: &str) -> Result<Option<String>> {
        let conn = self.get_conn()?;
        get_meta(&conn, key)
    }

    /// Get index statistics
    pub fn stats(&self) -> Result<IndexStats> {
        let conn = self.get_conn()?;
        stats(&conn)
    }

    /// Type by exact key
    pub fn find_type(&self, package: &str, name: &str) -> Result<Option<TypeSummary>> {
        let conn = self.get_conn()?;
        let summary = conn
            .query_row(
                "SELECT package, name, kind, path, parent, interfaces FROM types
                 WHERE package = ?1 AND name = ?2",
                params![package.trim(), name.trim()],
                row_to_summary,
            )
            .optional()?;
        Ok(summary)
    }

    /// Every type with the given simple name, across all packages
    pub fn find_types_named(&self, name: &str) -> Result<Vec<TypeSummary>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT package, name, kind, path, parent, interfaces FROM types
             WHERE name = ?1 ORDER BY package",
        )?;
        let types = stmt
            .query_map([name.trim()], row_to_summary)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(types)
    }

    /// Type and all of its members, ordered by member name
    pub fn get_type_and_members(&self, package: &str, name: &str) -> Result<Option<TypeDetail>> {
        self.type_detail(package, name, None)
    }

    /// Type and only the members called `member_name`; `None` when the type itself is missing
    pub fn get_member(
        &self,
        package: &str,
        name: &str,
        member_name: &str,
    ) -> Result<Option<TypeDetail>> {
        self.type_detail(package, name, Some(member_name.trim()))
    }

    fn type_detail(
        &self,
        package: &str,
        name: &str,
        member_filter: Option<&str>,
    ) -> Result<Option<TypeDetail>> {
        let conn = self.get_conn()?;

        let row = conn
            .query_row(
                "SELECT id, package, name, kind, path, parent, interfaces FROM types
                 WHERE package = ?1 AND name = ?2",
                params![package.trim(), name.trim()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        TypeDetail {
                            package: row.get(1)?,
                            type_name: row.get(2)?,
                            kind: row.get(3)?,
                            path: row.get(4)?,
                            parent: row.get(5)?,
                            interfaces: split_interfaces(row.get::<_, Option<String>>(6)?),
                            members: Vec::new(),
                        },
                    ))
                },
            )
            .optional()?;

        let Some((type_id, mut detail)) = row else {
            return Ok(None);
        };

        detail.members = match member_filter {
            Some(member_name) => {
                let mut stmt = conn.prepare(
                    "SELECT name, return_type, params, is_static, annotation FROM members
                     WHERE type_id = ?1 AND name = ?2 ORDER BY name, params",
                )?;
                let members = stmt
                    .query_map(params![type_id, member_name], row_to_member)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                members
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT name, return_type, params, is_static, annotation FROM members
                     WHERE type_id = ?1 ORDER BY name, params",
                )?;
                let members = stmt
                    .query_map([type_id], row_to_member)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                members
            }
        };

        Ok(Some(detail))
    }

    /// Page through types of a package, or of a package and all its subpackages
    pub fn list_types(
        &self,
        package_prefix: &str,
        prefix_match: bool,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TypeSummary>> {
        let package = package_prefix.trim().trim_end_matches('.');
        if package.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.get_conn()?;
        let types = if prefix_match {
            let mut stmt = conn.prepare(
                "SELECT package, name, kind, path, parent, interfaces FROM types
                 WHERE package = ?1 OR substr(package, 1, length(?2)) = ?2
                 ORDER BY package, name
                 LIMIT ?3 OFFSET ?4",
            )?;
            let rows = stmt
                .query_map(
                    params![package, format!("{}.", package), limit as i64, offset as i64],
                    row_to_summary,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        } else {
            let mut stmt = conn.prepare(
                "SELECT package, name, kind, path, parent, interfaces FROM types
                 WHERE package = ?1
                 ORDER BY name
                 LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt
                .query_map(params![package, limit as i64, offset as i64], row_to_summary)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };

        Ok(types)
    }

    /// Full-text search over the search shadow, joined back to types for the path.
    ///
    /// With `dedupe_by_type` the query over-fetches `limit * overfetch` rows and
    /// collapses them to one row per type in rank order. Both the chosen types
    /// and their `match_count` only reflect that window, so this is not an exact
    /// top-K by match count.
    pub fn search(&self, query: &SearchQuery<'_>) -> Result<Vec<SearchHit>> {
        let term = query.term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }

        let fetch_limit = if query.dedupe_by_type {
            query.limit.saturating_mul(query.overfetch.max(1))
        } else {
            query.limit
        };

        let mut sql = String::from(
            "SELECT search_shadow.package, search_shadow.type_name, search_shadow.kind,
                    search_shadow.member_name, search_shadow.return_type, search_shadow.params,
                    t.path
             FROM search_shadow
             JOIN types t ON t.package = search_shadow.package AND t.name = search_shadow.type_name
             WHERE search_shadow MATCH ?",
        );
        let mut values: Vec<Value> = vec![Value::Text(term.to_string())];

        if let Some(prefix) = query.package_prefix.map(|p| p.trim().trim_end_matches('.')) {
            if !prefix.is_empty() {
                sql.push_str(" AND (t.package = ? OR substr(t.package, 1, length(?)) = ?)");
                let dotted = format!("{}.", prefix);
                values.push(Value::Text(prefix.to_string()));
                values.push(Value::Text(dotted.clone()));
                values.push(Value::Text(dotted));
            }
        }
        if let Some(kind) = query.kind {
            sql.push_str(" AND search_shadow.kind = ?");
            values.push(Value::Text(kind.as_str().to_string()));
        }
        sql.push_str(" ORDER BY search_shadow.rank LIMIT ?");
        values.push(Value::Integer(fetch_limit as i64));

        debug!("FTS search '{}' (fetch limit {})", term, fetch_limit);

        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&sql).map_err(classify_search_error)?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                Ok(SearchHit {
                    package: row.get(0)?,
                    type_name: row.get(1)?,
                    kind: row.get(2)?,
                    member_name: row.get(3)?,
                    return_type: row.get(4)?,
                    params: row.get(5)?,
                    path: row.get(6)?,
                    match_count: None,
                })
            })
            .map_err(classify_search_error)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(classify_search_error)?;

        if !query.dedupe_by_type {
            return Ok(rows);
        }

        Ok(dedupe_by_type(rows, query.limit))
    }
}

/// Collapse hits to the first row per (package, type), counting rows per type
fn dedupe_by_type(rows: Vec<SearchHit>, limit: usize) -> Vec<SearchHit> {
    let mut collapsed: Vec<SearchHit> = Vec::new();
    for row in &rows {
        if collapsed
            .iter()
            .any(|hit| hit.package == row.package && hit.type_name == row.type_name)
        {
            continue;
        }
        let count = rows
            .iter()
            .filter(|r| r.package == row.package && r.type_name == row.type_name)
            .count();
        collapsed.push(SearchHit {
            match_count: Some(count),
            ..row.clone()
        });
        if collapsed.len() >= limit {
            break;
        }
    }
    collapsed
}

/// FTS5 reports malformed MATCH expressions as generic SQLite errors; tell them apart by text
fn classify_search_error(e: rusqlite::Error) -> PrismError {
    if let rusqlite::Error::SqliteFailure(_, Some(message)) = &e {
        let lower = message.to_lowercase();
        let is_syntax = ["fts5", "syntax error", "unterminated", "no such column", "unknown special query"]
            .iter()
            .any(|needle| lower.contains(needle));
        if is_syntax {
            return PrismError::query_syntax(message.clone());
        }
    }
    PrismError::Store(e)
}

/// Insert a type or, when (package, name) exists, overwrite its attributes. Returns the row id.
pub fn upsert_type(conn: &Connection, record: &TypeRecord) -> Result<i64> {
    let interfaces = if record.interfaces.is_empty() {
        None
    } else {
        Some(record.interfaces.join(","))
    };

    let id = conn.query_row(
        "INSERT INTO types (package, name, kind, path, parent, interfaces)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(package, name) DO UPDATE SET
             kind = excluded.kind,
             path = excluded.path,
             parent = excluded.parent,
             interfaces = excluded.interfaces
         RETURNING id",
        params![
            record.package,
            record.name,
            record.kind,
            record.path,
            record.parent,
            interfaces,
        ],
        |row| row.get(0),
    )?;

    Ok(id)
}

/// Append a member row; overloads simply add more rows
pub fn insert_member(conn: &Connection, type_id: i64, member: &MemberRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO members (type_id, name, return_type, params, is_static, annotation)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            type_id,
            member.name,
            member.return_type,
            member.params,
            member.is_static,
            member.annotation,
        ],
    )?;
    Ok(())
}

/// Append the search projection of one member
pub fn insert_search_shadow_row(
    conn: &Connection,
    record: &TypeRecord,
    member: &MemberRecord,
) -> Result<()> {
    conn.execute(
        "INSERT INTO search_shadow (package, type_name, kind, member_name, return_type, params)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.package,
            record.name,
            record.kind,
            member.name,
            member.return_type,
            member.params,
        ],
    )?;
    Ok(())
}

/// Upsert a type, then append its members and their search rows. Returns the member count.
pub fn store_type(conn: &Connection, record: &TypeRecord) -> Result<usize> {
    let type_id = upsert_type(conn, record)?;
    for member in &record.members {
        insert_member(conn, type_id, member)?;
        insert_search_shadow_row(conn, record, member)?;
    }
    Ok(record.members.len())
}

/// Remove every member, type and search row; members go first as they reference types
pub fn clear_namespace(conn: &Connection) -> Result<()> {
    conn.execute("DELETE FROM members", [])?;
    conn.execute("DELETE FROM types", [])?;
    conn.execute("DELETE FROM search_shadow", [])?;
    Ok(())
}

pub fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO index_meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

pub fn set_state(conn: &Connection, state: IndexState) -> Result<()> {
    set_meta(conn, meta::STATE, state.as_str())
}

pub fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM index_meta WHERE key = ?1", [key], |row| row.get(0))
        .optional()?;
    Ok(value)
}

pub fn stats(conn: &Connection) -> Result<IndexStats> {
    let type_count: i64 = conn.query_row("SELECT COUNT(*) FROM types", [], |row| row.get(0))?;
    let member_count: i64 = conn.query_row("SELECT COUNT(*) FROM members", [], |row| row.get(0))?;

    Ok(IndexStats {
        type_count: type_count as usize,
        member_count: member_count as usize,
    })
}

fn split_interfaces(raw: Option<String>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Convert database row to TypeSummary
fn row_to_summary(row: &Row) -> rusqlite::Result<TypeSummary> {
    Ok(TypeSummary {
        package: row.get(0)?,
        type_name: row.get(1)?,
        kind: row.get(2)?,
        path: row.get(3)?,
        parent: row.get(4)?,
        interfaces: split_interfaces(row.get(5)?),
    })
}

/// Convert database row to MemberRecord
fn row_to_member(row: &Row) -> rusqlite::Result<MemberRecord> {
    Ok(MemberRecord {
        name: row.get(0)?,
        return_type: row.get(1)?,
        params: row.get(2)?,
        is_static: row.get(3)?,
        annotation: row.get(4)?,
    })
}
