//! Annotation store
//!
//! CRUD for annotations and document metadata inside one SQLite database.
//! The store knows nothing about containers or sessions; it is handed a
//! database path (usually inside a session's working directory) and owns
//! the connection until `close`.
//!
//! ## Tables
//!
//! - `annotations` - highlight / note / bookmark records
//! - `metadata` - string key/value pairs scoped to the container

use std::path::Path;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

use crate::models::{Annotation, AnnotationPatch, AnnotationType, NewAnnotation, PositionData};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::schema::{init_schema, needs_init};

const SELECT_COLUMNS: &str =
    "SELECT id, type, page_number, color, content, position_data, created_at, updated_at FROM annotations";

/// SQLite-backed annotation and metadata store
pub struct AnnotationStore {
    conn: Connection,
}

impl AnnotationStore {
    /// Open (or create) the database at `path` and bring its schema up to date
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        if needs_init(&conn) {
            debug!(path = %path.display(), "initializing annotation schema");
            init_schema(&conn)?;
        }

        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // ==================== Annotations ====================

    /// List annotations, optionally restricted to one page
    ///
    /// Results are grouped by page; within a page they come back in insertion
    /// order.
    pub fn list(&self, page: Option<u32>) -> StorageResult<Vec<Annotation>> {
        let rows = match page {
            Some(page) => {
                let mut stmt = self.conn.prepare(&format!(
                    "{} WHERE page_number = ?1 ORDER BY rowid",
                    SELECT_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![page], AnnotationRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = self
                    .conn
                    .prepare(&format!("{} ORDER BY page_number, rowid", SELECT_COLUMNS))?;
                let rows = stmt
                    .query_map([], AnnotationRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };

        rows.into_iter().map(AnnotationRow::hydrate).collect()
    }

    /// Get a single annotation by ID
    pub fn get(&self, id: &str) -> StorageResult<Option<Annotation>> {
        let row = self
            .conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                AnnotationRow::from_row,
            )
            .optional()?;

        row.map(AnnotationRow::hydrate).transpose()
    }

    /// Create an annotation and return the stored record
    pub fn create(&self, input: &NewAnnotation) -> StorageResult<Annotation> {
        if input.page_number < 1 {
            return Err(StorageError::InvalidPage {
                page: input.page_number,
            });
        }

        let position_json = encode_position(input.position_data.as_ref())?;
        let id = Uuid::new_v4().to_string();
        let now = now();
        let stamp = format_timestamp(&now);

        self.conn.execute(
            "INSERT INTO annotations (id, type, page_number, color, content, position_data, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                id,
                input.annotation_type.as_str(),
                input.page_number,
                input.color,
                input.content,
                position_json,
                stamp,
            ],
        )?;

        debug!(id = %id, page = input.page_number, kind = %input.annotation_type, "annotation created");

        Ok(Annotation {
            id,
            annotation_type: input.annotation_type,
            page_number: input.page_number,
            color: input.color.clone(),
            content: input.content.clone(),
            position_data: input.position_data.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a partial update; returns whether the annotation existed
    ///
    /// Fields left as `None` in the patch keep their stored value. The update
    /// timestamp is refreshed even when the patch is empty.
    pub fn update(&self, id: &str, patch: &AnnotationPatch) -> StorageResult<bool> {
        let position_json = encode_position(patch.position_data.as_ref())?;
        let stamp = format_timestamp(&now());

        let rows_affected = self.conn.execute(
            "UPDATE annotations SET
                color = COALESCE(?1, color),
                content = COALESCE(?2, content),
                position_data = COALESCE(?3, position_data),
                updated_at = ?4
             WHERE id = ?5",
            params![patch.color, patch.content, position_json, stamp, id],
        )?;

        Ok(rows_affected > 0)
    }

    /// Delete an annotation; returns whether it existed
    pub fn delete(&self, id: &str) -> StorageResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM annotations WHERE id = ?1", params![id])?;
        Ok(rows_affected > 0)
    }

    /// Get annotation count
    pub fn count(&self) -> StorageResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM annotations", [], |row| row.get(0))
            .map_err(Into::into)
    }

    // ==================== Metadata ====================

    /// Insert or replace a metadata value
    pub fn set_metadata(&self, key: &str, value: &str) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO metadata (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Read a metadata value; `None` when the key was never set
    pub fn get_metadata(&self, key: &str) -> StorageResult<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    // ==================== Lifecycle ====================

    /// Move any WAL content into the main database file
    ///
    /// Must run before the database file is copied into a container.
    pub fn flush(&self) -> StorageResult<()> {
        self.conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        Ok(())
    }

    /// Close the connection, reporting any error SQLite raises on close
    pub fn close(self) -> StorageResult<()> {
        self.conn.close().map_err(|(_, err)| err.into())
    }
}

/// Raw row as stored, before decoding enum, payload and timestamps
struct AnnotationRow {
    id: String,
    annotation_type: String,
    page_number: u32,
    color: Option<String>,
    content: Option<String>,
    position_data: Option<String>,
    created_at: String,
    updated_at: String,
}

impl AnnotationRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            annotation_type: row.get(1)?,
            page_number: row.get(2)?,
            color: row.get(3)?,
            content: row.get(4)?,
            position_data: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn hydrate(self) -> StorageResult<Annotation> {
        let corrupt = |details: String| StorageError::CorruptRecord {
            id: self.id.clone(),
            details,
        };

        let annotation_type: AnnotationType = self.annotation_type.parse().map_err(corrupt)?;
        let position_data = self
            .position_data
            .as_deref()
            .map(PositionData::from_json)
            .transpose()
            .map_err(|e| corrupt(format!("invalid position data: {}", e)))?;
        let created_at = parse_timestamp(&self.created_at).map_err(corrupt)?;
        let updated_at = parse_timestamp(&self.updated_at).map_err(corrupt)?;

        Ok(Annotation {
            id: self.id,
            annotation_type,
            page_number: self.page_number,
            color: self.color,
            content: self.content,
            position_data,
            created_at,
            updated_at,
        })
    }
}

/// Validate and serialize a position payload for the `position_data` column
fn encode_position(position: Option<&PositionData>) -> StorageResult<Option<String>> {
    let Some(position) = position else {
        return Ok(None);
    };
    position
        .validate()
        .map_err(|details| StorageError::InvalidPosition { details })?;
    Ok(Some(position.to_json()?))
}

/// Current time at the precision timestamps are stored with
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp '{}': {}", value, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Rect;
    use tempfile::TempDir;

    fn store() -> AnnotationStore {
        AnnotationStore::open_in_memory().unwrap()
    }

    fn highlight(page: u32) -> NewAnnotation {
        let position = PositionData::new(vec![Rect::new(72.0, 100.0, 200.0, 14.0)], 612.0, 792.0)
            .with_text("a sentence", 10, 20);
        NewAnnotation::highlight(page, position).with_color("#ffeb3b")
    }

    #[test]
    fn test_create_and_get() {
        let store = store();

        let created = store.create(&highlight(2)).unwrap();
        assert_eq!(created.created_at, created.updated_at);
        assert!(Uuid::parse_str(&created.id).is_ok());

        let fetched = store.get(&created.id).unwrap().unwrap();
        assert_eq!(fetched, created);
    }

    #[test]
    fn test_create_rejects_page_zero() {
        let store = store();

        let err = store.create(&NewAnnotation::bookmark(0)).unwrap_err();
        assert!(matches!(err, StorageError::InvalidPage { page: 0 }));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_ids_are_unique() {
        let store = store();
        let a = store.create(&NewAnnotation::bookmark(1)).unwrap();
        let b = store.create(&NewAnnotation::bookmark(1)).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_list_page_filter() {
        let store = store();
        let first = store.create(&highlight(1)).unwrap();
        let on_three = store.create(&NewAnnotation::note(3, "margin note")).unwrap();
        let second = store.create(&NewAnnotation::bookmark(1)).unwrap();

        let page_one = store.list(Some(1)).unwrap();
        let ids: Vec<_> = page_one.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);

        let page_three = store.list(Some(3)).unwrap();
        assert_eq!(page_three, vec![on_three]);

        assert!(store.list(Some(99)).unwrap().is_empty());
        assert_eq!(store.list(None).unwrap().len(), 3);
    }

    #[test]
    fn test_list_all_groups_by_page_in_insertion_order() {
        let store = store();
        let p2a = store.create(&NewAnnotation::bookmark(2)).unwrap();
        let p1 = store.create(&NewAnnotation::bookmark(1)).unwrap();
        let p2b = store.create(&NewAnnotation::note(2, "x")).unwrap();

        let all: Vec<_> = store
            .list(None)
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(all, vec![p1.id, p2a.id, p2b.id]);
    }

    #[test]
    fn test_update_is_partial() {
        let store = store();
        let created = store.create(&highlight(4)).unwrap();

        let patch = AnnotationPatch {
            content: Some("now a comment".to_string()),
            ..Default::default()
        };
        assert!(store.update(&created.id, &patch).unwrap());

        let updated = store.get(&created.id).unwrap().unwrap();
        assert_eq!(updated.content.as_deref(), Some("now a comment"));
        assert_eq!(updated.color, created.color);
        assert_eq!(updated.position_data, created.position_data);
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[test]
    fn test_empty_update_refreshes_timestamp() {
        let store = store();
        let created = store.create(&NewAnnotation::bookmark(1)).unwrap();

        // Stored at microsecond precision, so a short pause guarantees a new value
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(store.update(&created.id, &AnnotationPatch::default()).unwrap());

        let updated = store.get(&created.id).unwrap().unwrap();
        assert!(updated.updated_at > created.updated_at);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[test]
    fn test_create_rejects_non_finite_position() {
        let store = store();
        let kept = store.create(&NewAnnotation::bookmark(1)).unwrap();

        let bad = [
            PositionData::new(vec![Rect::new(f64::NAN, 1.0, 1.0, 1.0)], 612.0, 792.0),
            PositionData::new(vec![Rect::new(1.0, 1.0, f64::INFINITY, 1.0)], 612.0, 792.0),
            PositionData::new(vec![], f64::NEG_INFINITY, 792.0),
        ];
        for position in bad {
            let err = store
                .create(&NewAnnotation::highlight(1, position))
                .unwrap_err();
            assert!(matches!(err, StorageError::InvalidPosition { .. }));
        }

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.list(Some(1)).unwrap(), vec![kept]);
    }

    #[test]
    fn test_update_rejects_non_finite_position() {
        let store = store();
        let created = store.create(&highlight(2)).unwrap();

        let patch = AnnotationPatch {
            content: Some("should not land".to_string()),
            position_data: Some(PositionData::new(
                vec![Rect::new(1.0, f64::NAN, 1.0, 1.0)],
                612.0,
                792.0,
            )),
            ..Default::default()
        };
        let err = store.update(&created.id, &patch).unwrap_err();
        assert!(matches!(err, StorageError::InvalidPosition { .. }));

        assert_eq!(store.get(&created.id).unwrap().unwrap(), created);
        assert_eq!(store.list(None).unwrap().len(), 1);
    }

    #[test]
    fn test_update_replaces_position() {
        let store = store();
        let created = store.create(&highlight(1)).unwrap();

        let moved = PositionData::new(vec![Rect::new(1.0, 2.0, 3.0, 4.0)], 612.0, 792.0);
        let patch = AnnotationPatch {
            position_data: Some(moved.clone()),
            ..Default::default()
        };
        store.update(&created.id, &patch).unwrap();

        let updated = store.get(&created.id).unwrap().unwrap();
        assert_eq!(updated.position_data, Some(moved));
    }

    #[test]
    fn test_update_missing_returns_false() {
        let store = store();
        let patch = AnnotationPatch {
            color: Some("red".to_string()),
            ..Default::default()
        };
        assert!(!store.update("missing", &patch).unwrap());
    }

    #[test]
    fn test_delete() {
        let store = store();
        let created = store.create(&NewAnnotation::bookmark(5)).unwrap();

        assert!(store.delete(&created.id).unwrap());
        assert!(!store.delete(&created.id).unwrap());
        assert!(store.get(&created.id).unwrap().is_none());
    }

    #[test]
    fn test_metadata_upsert() {
        let store = store();

        assert_eq!(store.get_metadata("k").unwrap(), None);

        store.set_metadata("k", "v1").unwrap();
        store.set_metadata("k", "v2").unwrap();
        assert_eq!(store.get_metadata("k").unwrap(), Some("v2".to_string()));
    }

    #[test]
    fn test_position_payload_stored_verbatim() {
        let store = store();
        let input = highlight(1);
        let created = store.create(&input).unwrap();

        let stored: String = store
            .connection()
            .query_row(
                "SELECT position_data FROM annotations WHERE id = ?1",
                params![created.id],
                |row| row.get(0),
            )
            .unwrap();

        let expected = input.position_data.unwrap().to_json().unwrap();
        assert_eq!(stored, expected);

        let reencoded = PositionData::from_json(&stored).unwrap().to_json().unwrap();
        assert_eq!(reencoded, stored);
    }

    #[test]
    fn test_corrupt_position_is_reported() {
        let store = store();
        store
            .connection()
            .execute(
                "INSERT INTO annotations (id, type, page_number, position_data, created_at, updated_at)
                 VALUES ('bad', 'highlight', 1, 'not json', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
                [],
            )
            .unwrap();

        let err = store.list(None).unwrap_err();
        assert!(matches!(err, StorageError::CorruptRecord { ref id, .. } if id == "bad"));
    }

    #[test]
    fn test_reads_legacy_timestamps() {
        let store = store();
        store
            .connection()
            .execute(
                "INSERT INTO annotations (id, type, page_number, created_at, updated_at)
                 VALUES ('old', 'note', 1, '2024-05-01T10:20:30.123456789+00:00', '2024-05-01T10:20:30.123456789+00:00')",
                [],
            )
            .unwrap();

        let old = store.get("old").unwrap().unwrap();
        assert_eq!(old.annotation_type, AnnotationType::Note);
        assert_eq!(old.created_at.timestamp(), 1714558830);
    }

    #[test]
    fn test_persists_to_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.sqlite");

        let id = {
            let store = AnnotationStore::open(&path).unwrap();
            let created = store.create(&NewAnnotation::note(1, "kept")).unwrap();
            store.set_metadata("last_page", "12").unwrap();
            store.flush().unwrap();
            store.close().unwrap();
            created.id
        };

        let reopened = AnnotationStore::open(&path).unwrap();
        assert_eq!(
            reopened.get(&id).unwrap().unwrap().content.as_deref(),
            Some("kept")
        );
        assert_eq!(
            reopened.get_metadata("last_page").unwrap(),
            Some("12".to_string())
        );
    }
}
