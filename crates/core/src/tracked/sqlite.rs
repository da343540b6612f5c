//! SQLite-backed tracked download store.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{TrackedDownload, TrackedDownloadStore, TrackedState};
use crate::decision::Decision;
use crate::download_client::ClientDownloadId;
use crate::import::ImportFailure;
use crate::indexer::TargetId;
use crate::store::{parse_timestamp, StoreError};

const COLUMNS: &str = "id, target_id, client_id, state, decision, history, progress, poll_failures, next_poll_at, import_attempts, last_import_failure, imported_files, output_path, last_error, created_at, updated_at";

pub struct SqliteTrackedDownloadStore {
    conn: Mutex<Connection>,
}

impl SqliteTrackedDownloadStore {
    /// Open (or create) the database at `path`.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tracked_downloads (
                id TEXT PRIMARY KEY,
                target_id TEXT NOT NULL,
                client_id TEXT,
                state TEXT NOT NULL,
                decision TEXT NOT NULL,
                history TEXT NOT NULL,
                progress REAL NOT NULL DEFAULT 0,
                poll_failures INTEGER NOT NULL DEFAULT 0,
                next_poll_at TEXT,
                import_attempts INTEGER NOT NULL DEFAULT 0,
                last_import_failure TEXT,
                imported_files TEXT NOT NULL DEFAULT '[]',
                output_path TEXT,
                last_error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tracked_target ON tracked_downloads(target_id);
            CREATE INDEX IF NOT EXISTS idx_tracked_created_at ON tracked_downloads(created_at);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn row_to_download(row: &rusqlite::Row) -> rusqlite::Result<TrackedDownload> {
        let id: String = row.get(0)?;
        let target_id: String = row.get(1)?;
        let client_id: Option<String> = row.get(2)?;
        let state_json: String = row.get(3)?;
        let decision_json: String = row.get(4)?;
        let history_json: String = row.get(5)?;
        let next_poll_at: Option<String> = row.get(8)?;
        let failure_json: Option<String> = row.get(10)?;
        let files_json: String = row.get(11)?;
        let output_path: Option<String> = row.get(12)?;
        let created_at: String = row.get(14)?;
        let updated_at: String = row.get(15)?;

        let json_err = |col: usize, e: serde_json::Error| {
            rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
        };

        let state: TrackedState =
            serde_json::from_str(&state_json).map_err(|e| json_err(3, e))?;
        let decision: Decision =
            serde_json::from_str(&decision_json).map_err(|e| json_err(4, e))?;
        let history = serde_json::from_str(&history_json).unwrap_or_default();
        let last_import_failure: Option<ImportFailure> =
            failure_json.and_then(|json| serde_json::from_str(&json).ok());
        let imported_files: Vec<PathBuf> = serde_json::from_str(&files_json).unwrap_or_default();

        Ok(TrackedDownload {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            target_id: TargetId(target_id),
            client_id: client_id.map(ClientDownloadId),
            state,
            decision,
            history,
            progress: row.get(6)?,
            poll_failures: row.get(7)?,
            next_poll_at: next_poll_at.as_deref().map(parse_timestamp),
            import_attempts: row.get(9)?,
            last_import_failure,
            imported_files,
            output_path: output_path.map(PathBuf::from),
            last_error: row.get(13)?,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }

    fn query(
        conn: &Connection,
        sql: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<TrackedDownload>, StoreError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(args, Self::row_to_download)?;
        let mut downloads = Vec::new();
        for row in rows {
            downloads.push(row?);
        }
        Ok(downloads)
    }
}

/// Serialized columns shared by insert and update.
struct Encoded {
    state: String,
    decision: String,
    history: String,
    last_import_failure: Option<String>,
    imported_files: String,
}

impl Encoded {
    fn new(d: &TrackedDownload) -> Result<Self, StoreError> {
        Ok(Self {
            state: serde_json::to_string(&d.state)?,
            decision: serde_json::to_string(&d.decision)?,
            history: serde_json::to_string(&d.history)?,
            last_import_failure: d
                .last_import_failure
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            imported_files: serde_json::to_string(&d.imported_files)?,
        })
    }
}

impl TrackedDownloadStore for SqliteTrackedDownloadStore {
    fn insert(&self, d: &TrackedDownload) -> Result<(), StoreError> {
        let encoded = Encoded::new(d)?;
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO tracked_downloads ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                COLUMNS
            ),
            params![
                d.id.to_string(),
                d.target_id.as_str(),
                d.client_id.as_ref().map(|c| c.as_str()),
                encoded.state,
                encoded.decision,
                encoded.history,
                d.progress,
                d.poll_failures,
                d.next_poll_at.map(|t| t.to_rfc3339()),
                d.import_attempts,
                encoded.last_import_failure,
                encoded.imported_files,
                d.output_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
                d.last_error,
                d.created_at.to_rfc3339(),
                d.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn update(&self, d: &TrackedDownload) -> Result<bool, StoreError> {
        let encoded = Encoded::new(d)?;
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE tracked_downloads SET client_id = ?, state = ?, decision = ?, history = ?, progress = ?, poll_failures = ?, next_poll_at = ?, import_attempts = ?, last_import_failure = ?, imported_files = ?, output_path = ?, last_error = ?, updated_at = ? WHERE id = ?",
            params![
                d.client_id.as_ref().map(|c| c.as_str()),
                encoded.state,
                encoded.decision,
                encoded.history,
                d.progress,
                d.poll_failures,
                d.next_poll_at.map(|t| t.to_rfc3339()),
                d.import_attempts,
                encoded.last_import_failure,
                encoded.imported_files,
                d.output_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
                d.last_error,
                d.updated_at.to_rfc3339(),
                d.id.to_string(),
            ],
        )?;
        Ok(changed > 0)
    }

    fn get(&self, id: Uuid) -> Result<Option<TrackedDownload>, StoreError> {
        let conn = self.lock()?;
        let download = conn
            .query_row(
                &format!("SELECT {} FROM tracked_downloads WHERE id = ?", COLUMNS),
                params![id.to_string()],
                Self::row_to_download,
            )
            .optional()?;
        Ok(download)
    }

    fn list(&self) -> Result<Vec<TrackedDownload>, StoreError> {
        let conn = self.lock()?;
        Self::query(
            &conn,
            &format!(
                "SELECT {} FROM tracked_downloads ORDER BY created_at ASC",
                COLUMNS
            ),
            &[],
        )
    }

    fn in_states(&self, states: &[TrackedState]) -> Result<Vec<TrackedDownload>, StoreError> {
        if states.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; states.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM tracked_downloads WHERE json_extract(state, '$.type') IN ({}) ORDER BY created_at ASC",
            COLUMNS, placeholders
        );
        let names: Vec<&str> = states.iter().map(|s| s.as_str()).collect();
        let args: Vec<&dyn rusqlite::ToSql> =
            names.iter().map(|n| n as &dyn rusqlite::ToSql).collect();

        let conn = self.lock()?;
        Self::query(&conn, &sql, &args)
    }

    fn for_target(&self, target_id: &TargetId) -> Result<Vec<TrackedDownload>, StoreError> {
        let conn = self.lock()?;
        Self::query(
            &conn,
            &format!(
                "SELECT {} FROM tracked_downloads WHERE target_id = ? ORDER BY created_at ASC",
                COLUMNS
            ),
            &[&target_id.as_str()],
        )
    }

    fn for_release(&self, guid: &str) -> Result<Vec<TrackedDownload>, StoreError> {
        let conn = self.lock()?;
        Self::query(
            &conn,
            &format!(
                "SELECT {} FROM tracked_downloads WHERE json_extract(decision, '$.release.guid') = ? ORDER BY created_at ASC",
                COLUMNS
            ),
            &[&guid],
        )
    }

    fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "DELETE FROM tracked_downloads WHERE id = ?",
            params![id.to_string()],
        )?;
        Ok(changed > 0)
    }
}
