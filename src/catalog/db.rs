//! Schema DDL, connection setup, and atomic upserts.
//!
//! WAL-mode + busy-timeout pragmas are lifted from the dual-write logger's
//! SQLite sink in the teacher repo (see `DESIGN.md`); the schema and upsert
//! semantics are ported from the original `database.py`.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, params};

use crate::catalog::models::{
    Action, ActionKind, ActionLogEntry, Classification, Decision, DirectoryAggregate, FileRecord,
    InstalledApplication, UserDecision,
};
use crate::core::errors::{DmError, Result};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS files (
    id              INTEGER PRIMARY KEY,
    path            TEXT NOT NULL UNIQUE,
    leaf            TEXT NOT NULL,
    extension       TEXT NOT NULL,
    size_bytes      INTEGER NOT NULL,
    created_at      TEXT NOT NULL,
    modified_at     TEXT NOT NULL,
    accessed_at     TEXT NOT NULL,
    owner           TEXT NOT NULL,
    read_only       INTEGER NOT NULL,
    is_directory    INTEGER NOT NULL,
    parent_path     TEXT NOT NULL,
    scan_batch_id   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS classifications (
    id              INTEGER PRIMARY KEY,
    file_id         INTEGER NOT NULL UNIQUE REFERENCES files(id),
    action          TEXT NOT NULL,
    confidence      REAL NOT NULL,
    reason          TEXT NOT NULL,
    category        TEXT NOT NULL,
    overridden      INTEGER NOT NULL,
    override_reason TEXT,
    classified_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_decisions (
    id                  INTEGER PRIMARY KEY,
    file_id             INTEGER NOT NULL UNIQUE REFERENCES files(id),
    decision            TEXT NOT NULL,
    replacement_action  TEXT,
    decided_at          TEXT NOT NULL,
    executed            INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS action_log (
    id              INTEGER PRIMARY KEY,
    file_id         INTEGER REFERENCES files(id),
    kind            TEXT NOT NULL,
    source_path     TEXT NOT NULL,
    dest_path       TEXT,
    checksum_before TEXT,
    checksum_after  TEXT,
    batch_id        TEXT NOT NULL,
    executed_at     TEXT NOT NULL,
    undone          INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS installed_applications (
    id              INTEGER PRIMARY KEY,
    registry_key    TEXT NOT NULL UNIQUE,
    display_name    TEXT NOT NULL,
    publisher       TEXT NOT NULL,
    install_location TEXT
);

CREATE TABLE IF NOT EXISTS directory_aggregates (
    id              INTEGER PRIMARY KEY,
    path            TEXT NOT NULL UNIQUE,
    total_bytes     INTEGER NOT NULL,
    file_count      INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_action_log_batch ON action_log(batch_id);
CREATE INDEX IF NOT EXISTS idx_files_scan_batch ON files(scan_batch_id);
";

/// The Catalog: owns the one embedded database file for this run.
pub struct Catalog {
    pub(crate) conn: Connection,
}

impl Catalog {
    /// Open (creating parent directories and the schema if needed) the
    /// catalog database at `path`. Idempotent: safe to call against an
    /// already-initialized file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| DmError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        Self::configure(&conn)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// In-memory catalog, used in tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(&conn)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    fn configure(conn: &Connection) -> Result<()> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(())
    }

    /// Run `f` inside a transaction: commit on `Ok`, roll back on `Err` or panic.
    pub fn with_transaction<T>(
        &mut self,
        f: impl FnOnce(&rusqlite::Transaction) -> Result<T>,
    ) -> Result<T> {
        let tx = self.conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Insert or update a file row, keyed on `path`. Returns the row id.
    pub fn upsert_file(&mut self, file: &FileRecord) -> Result<i64> {
        self.with_transaction(|tx| upsert_file_tx(tx, file))
    }

    /// Bulk upsert: all rows commit, or none do.
    pub fn upsert_files(&mut self, files: &[FileRecord]) -> Result<Vec<i64>> {
        self.with_transaction(|tx| {
            files.iter().map(|f| upsert_file_tx(tx, f)).collect()
        })
    }

    /// Insert or update a classification, keyed on `file_id`.
    pub fn upsert_classification(&mut self, c: &Classification) -> Result<i64> {
        self.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO classifications
                    (file_id, action, confidence, reason, category, overridden, override_reason, classified_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(file_id) DO UPDATE SET
                    action = excluded.action,
                    confidence = excluded.confidence,
                    reason = excluded.reason,
                    category = excluded.category,
                    overridden = excluded.overridden,
                    override_reason = excluded.override_reason,
                    classified_at = excluded.classified_at",
                params![
                    c.file_id,
                    c.action.as_str(),
                    c.confidence,
                    c.reason,
                    c.category,
                    c.overridden,
                    c.override_reason,
                    c.classified_at,
                ],
            )?;
            Ok(tx.query_row(
                "SELECT id FROM classifications WHERE file_id = ?1",
                params![c.file_id],
                |row| row.get(0),
            )?)
        })
    }

    /// Insert or update a user decision, keyed on `file_id`.
    ///
    /// Errors if no classification exists for `file_id` yet — a `UserDecision`
    /// without a prior `Classification` is ill-formed (`SPEC_FULL.md` §3).
    pub fn record_user_decision(&mut self, decision: &UserDecision) -> Result<i64> {
        self.with_transaction(|tx| {
            let has_classification: bool = tx
                .query_row(
                    "SELECT 1 FROM classifications WHERE file_id = ?1",
                    params![decision.file_id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if !has_classification {
                return Err(DmError::InvalidConfig {
                    details: format!(
                        "user decision for file_id={} has no prior classification",
                        decision.file_id
                    ),
                });
            }
            tx.execute(
                "INSERT INTO user_decisions (file_id, decision, replacement_action, decided_at, executed)
                 VALUES (?1, ?2, ?3, ?4, 0)
                 ON CONFLICT(file_id) DO UPDATE SET
                    decision = excluded.decision,
                    replacement_action = excluded.replacement_action,
                    decided_at = excluded.decided_at,
                    executed = 0",
                params![
                    decision.file_id,
                    decision.decision.as_str(),
                    decision.replacement_action.map(Action::as_str),
                    decision.decided_at,
                ],
            )?;
            Ok(tx.query_row(
                "SELECT id FROM user_decisions WHERE file_id = ?1",
                params![decision.file_id],
                |row| row.get(0),
            )?)
        })
    }

    /// Mark a user decision as dispatched by the Execution Engine, so it
    /// drops out of [`Catalog::approved_action_plan`] on the next call.
    /// Re-recording the decision (a fresh human review) resets this.
    pub fn mark_decision_executed(&mut self, file_id: i64) -> Result<()> {
        self.with_transaction(|tx| {
            tx.execute(
                "UPDATE user_decisions SET executed = 1 WHERE file_id = ?1",
                params![file_id],
            )?;
            Ok(())
        })
    }

    /// Append an action-log entry. Entries are never updated except via
    /// [`Self::mark_undone`].
    pub fn append_action_log(&mut self, entry: &ActionLogEntry) -> Result<i64> {
        self.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO action_log
                    (file_id, kind, source_path, dest_path, checksum_before, checksum_after, batch_id, executed_at, undone)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    entry.file_id,
                    entry.kind.as_str(),
                    entry.source_path,
                    entry.dest_path,
                    entry.checksum_before,
                    entry.checksum_after,
                    entry.batch_id,
                    entry.executed_at,
                    entry.undone,
                ],
            )?;
            Ok(tx.last_insert_rowid())
        })
    }

    /// Mark a log entry undone. The row is never deleted.
    pub fn mark_undone(&mut self, log_id: i64) -> Result<()> {
        self.with_transaction(|tx| {
            tx.execute(
                "UPDATE action_log SET undone = 1 WHERE id = ?1",
                params![log_id],
            )?;
            Ok(())
        })
    }

    /// All action-log entries for `batch_id` where `undone = 0`, newest-first
    /// (descending id) — the order the Undo Manager reverses in.
    pub fn action_log_for_batch(&self, batch_id: &str) -> Result<Vec<ActionLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, file_id, kind, source_path, dest_path, checksum_before, checksum_after,
                    batch_id, executed_at, undone
             FROM action_log
             WHERE batch_id = ?1 AND undone = 0
             ORDER BY id DESC",
        )?;
        let rows = stmt
            .query_map(params![batch_id], row_to_action_log_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Files with no classification row yet, in stable id order.
    pub fn unclassified_files(&self, limit: usize) -> Result<Vec<FileRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT f.id, f.path, f.leaf, f.extension, f.size_bytes, f.created_at, f.modified_at,
                    f.accessed_at, f.owner, f.read_only, f.is_directory, f.parent_path, f.scan_batch_id
             FROM files f
             LEFT JOIN classifications c ON c.file_id = f.id
             WHERE c.id IS NULL
             ORDER BY f.id ASC
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![i64::try_from(limit).unwrap_or(i64::MAX)], row_to_file_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn file_by_path(&self, path: &str) -> Result<Option<FileRecord>> {
        self.conn
            .query_row(
                "SELECT id, path, leaf, extension, size_bytes, created_at, modified_at,
                        accessed_at, owner, read_only, is_directory, parent_path, scan_batch_id
                 FROM files WHERE path = ?1",
                params![path],
                row_to_file_record,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn upsert_installed_application(&mut self, app: &InstalledApplication) -> Result<i64> {
        self.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO installed_applications (registry_key, display_name, publisher, install_location)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(registry_key) DO UPDATE SET
                    display_name = excluded.display_name,
                    publisher = excluded.publisher,
                    install_location = excluded.install_location",
                params![app.registry_key, app.display_name, app.publisher, app.install_location],
            )?;
            Ok(tx.last_insert_rowid())
        })
    }

    pub fn upsert_directory_aggregate(&mut self, agg: &DirectoryAggregate) -> Result<i64> {
        self.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO directory_aggregates (path, total_bytes, file_count)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(path) DO UPDATE SET
                    total_bytes = excluded.total_bytes,
                    file_count = excluded.file_count",
                params![agg.path, agg.total_bytes, agg.file_count],
            )?;
            Ok(tx.last_insert_rowid())
        })
    }
}

fn upsert_file_tx(tx: &rusqlite::Transaction, file: &FileRecord) -> Result<i64> {
    tx.execute(
        "INSERT INTO files
            (path, leaf, extension, size_bytes, created_at, modified_at, accessed_at, owner,
             read_only, is_directory, parent_path, scan_batch_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(path) DO UPDATE SET
            leaf = excluded.leaf,
            extension = excluded.extension,
            size_bytes = excluded.size_bytes,
            created_at = excluded.created_at,
            modified_at = excluded.modified_at,
            accessed_at = excluded.accessed_at,
            owner = excluded.owner,
            read_only = excluded.read_only,
            is_directory = excluded.is_directory,
            parent_path = excluded.parent_path,
            scan_batch_id = excluded.scan_batch_id",
        params![
            file.path,
            file.leaf,
            file.extension,
            file.size_bytes,
            file.created_at,
            file.modified_at,
            file.accessed_at,
            file.owner,
            file.read_only,
            file.is_directory,
            file.parent_path,
            file.scan_batch_id,
        ],
    )?;
    Ok(tx.query_row(
        "SELECT id FROM files WHERE path = ?1",
        params![file.path],
        |row| row.get(0),
    )?)
}

pub(crate) fn row_to_file_record(row: &rusqlite::Row) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: Some(row.get(0)?),
        path: row.get(1)?,
        leaf: row.get(2)?,
        extension: row.get(3)?,
        size_bytes: row.get(4)?,
        created_at: row.get(5)?,
        modified_at: row.get(6)?,
        accessed_at: row.get(7)?,
        owner: row.get(8)?,
        read_only: row.get(9)?,
        is_directory: row.get(10)?,
        parent_path: row.get(11)?,
        scan_batch_id: row.get(12)?,
    })
}

fn row_to_action_log_entry(row: &rusqlite::Row) -> rusqlite::Result<ActionLogEntry> {
    let kind: String = row.get(2)?;
    let batch_id: String = row.get(7)?;
    Ok(ActionLogEntry {
        id: Some(row.get(0)?),
        file_id: row.get(1)?,
        kind: ActionKind::parse(&kind).unwrap_or(ActionKind::Moved),
        source_path: row.get(3)?,
        dest_path: row.get(4)?,
        checksum_before: row.get(5)?,
        checksum_after: row.get(6)?,
        batch_id,
        executed_at: row.get(8)?,
        undone: row.get(9)?,
    })
}

/// Default on-disk path for the catalog database under a data directory.
#[must_use]
pub fn default_catalog_path(data_dir: &Path) -> PathBuf {
    data_dir.join("catalog.sqlite3")
}
