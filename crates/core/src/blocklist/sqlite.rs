//! SQLite-backed blocklist.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{BlocklistEntry, BlocklistStore};
use crate::indexer::{Protocol, TargetId};
use crate::store::{parse_timestamp, StoreError};

const COLUMNS: &str = "id, target_id, source_title, source_name, protocol, info_hash, size, publish_date, reason, created_at";

pub struct SqliteBlocklistStore {
    conn: Mutex<Connection>,
}

impl SqliteBlocklistStore {
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
            CREATE TABLE IF NOT EXISTS blocklist (
                id TEXT PRIMARY KEY,
                target_id TEXT NOT NULL,
                source_title TEXT NOT NULL,
                source_name TEXT NOT NULL,
                protocol TEXT NOT NULL,
                info_hash TEXT,
                size INTEGER NOT NULL DEFAULT 0,
                publish_date TEXT,
                reason TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_blocklist_target ON blocklist(target_id);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<BlocklistEntry> {
        let id: String = row.get(0)?;
        let target_id: String = row.get(1)?;
        let protocol: String = row.get(4)?;
        let size: i64 = row.get(6)?;
        let publish_date: Option<String> = row.get(7)?;
        let created_at: String = row.get(9)?;

        Ok(BlocklistEntry {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            target_id: TargetId(target_id),
            source_title: row.get(2)?,
            source_name: row.get(3)?,
            protocol: if protocol == "torrent" {
                Protocol::Torrent
            } else {
                Protocol::Usenet
            },
            info_hash: row.get(5)?,
            size: size.max(0) as u64,
            publish_date: publish_date.as_deref().map(parse_timestamp),
            reason: row.get(8)?,
            created_at: parse_timestamp(&created_at),
        })
    }

    fn query(
        conn: &Connection,
        sql: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<BlocklistEntry>, StoreError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(args, Self::row_to_entry)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

impl BlocklistStore for SqliteBlocklistStore {
    fn insert(&self, entry: &BlocklistEntry) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO blocklist ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                COLUMNS
            ),
            params![
                entry.id.to_string(),
                entry.target_id.as_str(),
                entry.source_title,
                entry.source_name,
                entry.protocol.to_string(),
                entry.info_hash,
                entry.size as i64,
                entry.publish_date.map(|d| d.to_rfc3339()),
                entry.reason,
                entry.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<Option<BlocklistEntry>, StoreError> {
        let conn = self.lock()?;
        let entry = conn
            .query_row(
                &format!("SELECT {} FROM blocklist WHERE id = ?", COLUMNS),
                params![id.to_string()],
                Self::row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    fn for_target(&self, target_id: &TargetId) -> Result<Vec<BlocklistEntry>, StoreError> {
        let conn = self.lock()?;
        Self::query(
            &conn,
            &format!(
                "SELECT {} FROM blocklist WHERE target_id = ? ORDER BY created_at ASC",
                COLUMNS
            ),
            &[&target_id.as_str()],
        )
    }

    fn list(&self) -> Result<Vec<BlocklistEntry>, StoreError> {
        let conn = self.lock()?;
        Self::query(
            &conn,
            &format!("SELECT {} FROM blocklist ORDER BY created_at DESC", COLUMNS),
            &[],
        )
    }

    fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM blocklist WHERE id = ?", params![id.to_string()])?;
        Ok(deleted > 0)
    }

    fn delete_for_target(&self, target_id: &TargetId) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM blocklist WHERE target_id = ?",
            params![target_id.as_str()],
        )?;
        Ok(deleted)
    }
}
