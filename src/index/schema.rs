use rusqlite::{Connection, Result};
use tracing::{debug, info};

use super::db::meta;

/// Bumped whenever the table layout changes. A store written under another
/// version is rebuilt on the next indexing run rather than migrated.
pub const SCHEMA_VERSION: i32 = 2;

/// Drop and recreate every table. Running it twice leaves the same empty schema.
pub fn init_schema(conn: &Connection) -> Result<()> {
    info!("Initializing Prism schema v{}", SCHEMA_VERSION);

    drop_schema(conn)?;

    // Types: one row per (package, name), last write wins
    conn.execute(
        "CREATE TABLE types (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            package TEXT NOT NULL,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            path TEXT NOT NULL,
            parent TEXT,
            interfaces TEXT,
            UNIQUE(package, name)
        )",
        [],
    )?;

    conn.execute("CREATE INDEX idx_types_package ON types(package)", [])?;
    conn.execute("CREATE INDEX idx_types_name ON types(name)", [])?;

    // Members: owned by a type, overloads allowed
    conn.execute(
        "CREATE TABLE members (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            type_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            return_type TEXT NOT NULL,
            params TEXT NOT NULL,
            is_static INTEGER NOT NULL DEFAULT 0,
            annotation TEXT,
            FOREIGN KEY (type_id) REFERENCES types(id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute("CREATE INDEX idx_members_type_id ON members(type_id, name)", [])?;

    // Search shadow: denormalized member projection, only ever MATCHed
    conn.execute(
        "CREATE VIRTUAL TABLE search_shadow USING fts5(
            package,
            type_name,
            kind,
            member_name,
            return_type,
            params,
            tokenize='unicode61'
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "INSERT INTO index_meta (key, value) VALUES (?1, ?2)",
        [meta::SCHEMA_VERSION.to_string(), SCHEMA_VERSION.to_string()],
    )?;

    debug!("Schema v{} created", SCHEMA_VERSION);

    Ok(())
}

/// Drop all tables
pub fn drop_schema(conn: &Connection) -> Result<()> {
    debug!("Dropping all schema tables");

    conn.execute("DROP TABLE IF EXISTS index_meta", [])?;
    conn.execute("DROP TABLE IF EXISTS search_shadow", [])?;
    conn.execute("DROP TABLE IF EXISTS members", [])?;
    conn.execute("DROP TABLE IF EXISTS types", [])?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn table_names(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_init_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables = table_names(&conn);
        assert!(tables.contains(&"types".to_string()));
        assert!(tables.contains(&"members".to_string()));
        assert!(tables.contains(&"search_shadow".to_string()));
        assert!(tables.contains(&"index_meta".to_string()));
    }

    #[test]
    fn test_init_is_destructive() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO types (package, name, kind, path) VALUES ('a', 'B', 'class', 'a/B.java')",
            [],
        )
        .unwrap();

        init_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM types", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);

        let versions: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM index_meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn test_drop_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        drop_schema(&conn).unwrap();

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type='table' AND name NOT LIKE 'sqlite_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(count, 0);
    }
}
