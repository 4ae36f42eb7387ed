//! SQLite schema for the annotation database
//!
//! The database travels inside the container as `data.sqlite`. Every
//! statement is `IF NOT EXISTS` so databases written before `schema_info`
//! existed are brought up to date on open.

use rusqlite::{Connection, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Document metadata (title, page_count, last_page, ...)
        CREATE TABLE IF NOT EXISTS metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Highlights, notes and bookmarks
        CREATE TABLE IF NOT EXISTS annotations (
            id TEXT PRIMARY KEY,
            type TEXT NOT NULL CHECK(type IN ('highlight', 'note', 'bookmark')),
            page_number INTEGER NOT NULL CHECK(page_number >= 1),
            color TEXT,
            content TEXT,
            position_data TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        -- Per-page lookups are the hot path while reading
        CREATE INDEX IF NOT EXISTS idx_annotations_page ON annotations(page_number);
        CREATE INDEX IF NOT EXISTS idx_annotations_type ON annotations(type);
        "#,
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_info WHERE key = 'version'")?;
    let result: Result<String> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version_str) => Ok(version_str.parse().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if schema needs initialization or migration
pub fn needs_init(conn: &Connection) -> bool {
    let table_exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !table_exists {
        return true;
    }

    match get_schema_version(conn) {
        Ok(Some(v)) => v < SCHEMA_VERSION,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(conn: &Connection, kind: &str) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type = ?1 ORDER BY name")
            .unwrap()
            .query_map([kind], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_init_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables = names(&conn, "table");
        assert!(tables.contains(&"metadata".to_string()));
        assert!(tables.contains(&"annotations".to_string()));
        assert!(tables.contains(&"schema_info".to_string()));
    }

    #[test]
    fn test_schema_version() {
        let conn = Connection::open_in_memory().unwrap();

        assert!(needs_init(&conn));

        init_schema(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
        assert!(!needs_init(&conn));
    }

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO metadata (key, value) VALUES ('title', 'Paper')",
            [],
        )
        .unwrap();

        init_schema(&conn).unwrap();

        let title: String = conn
            .query_row("SELECT value FROM metadata WHERE key = 'title'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(title, "Paper");
    }

    #[test]
    fn test_legacy_database_without_schema_info_needs_init() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL);")
            .unwrap();

        assert!(needs_init(&conn));
        init_schema(&conn).unwrap();
        assert!(!needs_init(&conn));
    }

    #[test]
    fn test_type_and_page_constraints() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let bad_type = conn.execute(
            "INSERT INTO annotations (id, type, page_number, created_at, updated_at)
             VALUES ('a', 'circle', 1, 'now', 'now')",
            [],
        );
        assert!(bad_type.is_err());

        let bad_page = conn.execute(
            "INSERT INTO annotations (id, type, page_number, created_at, updated_at)
             VALUES ('b', 'note', 0, 'now', 'now')",
            [],
        );
        assert!(bad_page.is_err());
    }

    #[test]
    fn test_indexes_exist() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let indexes = names(&conn, "index");
        assert!(indexes.contains(&"idx_annotations_page".to_string()));
        assert!(indexes.contains(&"idx_annotations_type".to_string()));
    }
}
