//! SQLite persistence for the paste list.
//!
//! IDs come from an `AUTOINCREMENT` primary key, so they stay monotonic
//! across restarts even after the newest paste was deleted. Databases
//! created without `AUTOINCREMENT` (the older `pastytext.db` layout, where
//! SQLite reuses the largest rowid once it is deleted) are rebuilt on open.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{info, warn};

use crate::errors::StoreError;
use crate::paste::{NewPaste, Paste, PasteId};

const PRAGMAS: &str = "PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 5000;";

const CREATE_TABLES: &str = "CREATE TABLE IF NOT EXISTS pastes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL,
    network TEXT NOT NULL DEFAULT '',
    user TEXT NOT NULL DEFAULT '',
    device TEXT NOT NULL DEFAULT '',
    content TEXT NOT NULL
);";

/// Copies a rowid-keyed table into the `AUTOINCREMENT` layout. Explicit ids
/// seed `sqlite_sequence` with the largest existing id.
const REBUILD_LEGACY: &str = "ALTER TABLE pastes RENAME TO pastes_legacy;
CREATE TABLE pastes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL,
    network TEXT NOT NULL DEFAULT '',
    user TEXT NOT NULL DEFAULT '',
    device TEXT NOT NULL DEFAULT '',
    content TEXT NOT NULL
);
INSERT INTO pastes (id, created_at, network, user, device, content)
    SELECT id, CAST(created_at AS TEXT), COALESCE(network, ''), COALESCE(user, ''),
           COALESCE(device, ''), COALESCE(content, '')
    FROM pastes_legacy ORDER BY id;
DROP TABLE pastes_legacy;";

/// Timestamp layout `mattn/go-sqlite3` writes for `DATETIME` columns.
const LEGACY_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S%.f%:z";

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, LEGACY_TIMESTAMP))
        .map(|t| t.with_timezone(&Utc))
}

fn has_device_column(conn: &Connection) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM pragma_table_info('pastes') WHERE name = 'device'",
        [],
        |row| row.get(0),
    )
}

/// Bring an existing `pastes` table up to the current layout.
fn migrate(conn: &mut Connection) -> Result<(), StoreError> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = 'pastes'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        None => conn.execute_batch(CREATE_TABLES)?,
        Some(sql) if !sql.to_ascii_uppercase().contains("AUTOINCREMENT") => {
            if !has_device_column(conn)? {
                conn.execute_batch("ALTER TABLE pastes ADD COLUMN device TEXT")?;
            }
            let tx = conn.transaction()?;
            tx.execute_batch(REBUILD_LEGACY)?;
            tx.commit()?;
            warn!("rebuilt pastes table with AUTOINCREMENT ids");
        }
        Some(_) => {
            if !has_device_column(conn)? {
                conn.execute_batch(
                    "ALTER TABLE pastes ADD COLUMN device TEXT NOT NULL DEFAULT ''",
                )?;
                info!("added device column to pastes table");
            }
        }
    }
    Ok(())
}

/// Write-through storage owned by a [`crate::PasteStore`].
pub struct PasteRepository {
    conn: Connection,
}

impl PasteRepository {
    /// Open or create a database file, migrating older layouts.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut conn = Connection::open(path)?;
        conn.execute_batch(PRAGMAS)?;
        migrate(&mut conn)?;
        info!(path = %path.display(), "paste database opened");
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let mut conn = Connection::open_in_memory()?;
        migrate(&mut conn)?;
        Ok(Self { conn })
    }

    /// Largest id SQLite has ever assigned, deleted rows included. 0 when
    /// nothing was ever inserted.
    pub fn last_assigned_id(&self) -> Result<PasteId, StoreError> {
        let seq: Option<i64> = self
            .conn
            .query_row(
                "SELECT seq FROM sqlite_sequence WHERE name = 'pastes'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(seq.unwrap_or(0))
    }

    /// Newest `limit` pastes, newest first. Rows beyond `limit` are deleted.
    pub fn load_recent(&mut self, limit: usize) -> Result<Vec<Paste>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let pruned = self.conn.execute(
            "DELETE FROM pastes WHERE id NOT IN
                (SELECT id FROM pastes ORDER BY id DESC LIMIT ?1)",
            params![limit],
        )?;
        if pruned > 0 {
            info!(pruned, "pruned pastes beyond capacity");
        }

        let mut stmt = self.conn.prepare(
            "SELECT id, created_at, network, user, device, content
             FROM pastes ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, created_at, network, user, device, text)| {
                let created_at =
                    parse_timestamp(&created_at).map_err(|e| StoreError::CorruptRow {
                        id,
                        message: format!("created_at: {e}"),
                    })?;
                Ok(Paste {
                    id,
                    user,
                    text,
                    created_at,
                    network,
                    device,
                })
            })
            .collect()
    }

    /// Insert a paste and delete `evict` in one transaction.
    ///
    /// The transaction is rolled back with [`StoreError::IdRegression`] if
    /// SQLite assigns an id below `min_id`.
    pub fn insert(
        &mut self,
        new: &NewPaste,
        created_at: DateTime<Utc>,
        evict: &[PasteId],
        min_id: PasteId,
    ) -> Result<PasteId, StoreError> {
        let tx = self.conn.transaction()?;
        let _ = tx.execute(
            "INSERT INTO pastes (created_at, network, user, device, content)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                created_at.to_rfc3339(),
                new.network,
                new.user,
                new.device,
                new.text
            ],
        )?;
        let id = tx.last_insert_rowid();
        if id < min_id {
            return Err(StoreError::IdRegression {
                assigned: id,
                expected: min_id,
            });
        }
        for old in evict {
            let _ = tx.execute("DELETE FROM pastes WHERE id = ?1", params![old])?;
        }
        tx.commit()?;
        Ok(id)
    }

    /// Delete a paste. Returns whether a row was removed.
    pub fn delete(&mut self, id: PasteId) -> Result<bool, StoreError> {
        let changed = self
            .conn
            .execute("DELETE FROM pastes WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Number of stored rows.
    pub fn count(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM pastes", [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or_default())
    }
}
