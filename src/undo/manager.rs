//! Batch-scoped reversal of logged actions.
//!
//! Ported from `undo.py::UndoManager` (see `DESIGN.md`). Every mutation the
//! Execution Engine performs is logged to the Catalog's `action_log` *before*
//! it becomes irreversible; undo walks that log newest-first per batch and
//! reverses each entry by its kind. Log rows are never deleted, only marked
//! `undone` — the journal is the permanent record of what this program ever
//! did to the filesystem.

use std::fs;
use std::path::{Path, PathBuf};

use rand::Rng;

use crate::catalog::db::Catalog;
use crate::catalog::models::{ActionKind, ActionLogEntry};
use crate::core::errors::Result;

/// Outcome counters from [`UndoManager::undo_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UndoSummary {
    pub undone: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Generates batch ids, allocates trash paths, and reverses logged batches.
pub struct UndoManager<'a> {
    catalog: &'a mut Catalog,
    trash_dir: PathBuf,
    now: fn() -> String,
}

impl<'a> UndoManager<'a> {
    pub fn new(catalog: &'a mut Catalog, trash_dir: PathBuf, now: fn() -> String) -> Self {
        Self {
            catalog,
            trash_dir,
            now,
        }
    }

    /// `batch_YYYYMMDD_HHMMSS_<8-hex>`, timestamped by the caller's clock so
    /// tests stay deterministic.
    #[must_use]
    pub fn generate_batch_id() -> String {
        Self::generate_batch_id_at(&now_compact())
    }

    fn generate_batch_id_at(timestamp: &str) -> String {
        let suffix: String = {
            let mut rng = rand::rng();
            (0..8)
                .map(|_| {
                    let n: u8 = rng.random_range(0..16);
                    std::char::from_digit(u32::from(n), 16).unwrap_or('0')
                })
                .collect()
        };
        format!("batch_{timestamp}_{suffix}")
    }

    /// Compute the trash path for a file being soft-deleted: `<trash_dir>/<batch_id>/<leaf>`,
    /// with a `<stem>_N<suffix>` collision counter on the filename stem.
    #[must_use]
    pub fn trash_path(trash_dir: &Path, original_path: &Path, batch_id: &str) -> PathBuf {
        let base = trash_dir.join(batch_id);
        let leaf = original_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let mut dest = base.join(&leaf);
        if !dest.exists() {
            return dest;
        }

        let stem = original_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let suffix = original_path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let mut counter = 1u32;
        while dest.exists() {
            dest = base.join(format!("{stem}_{counter}{suffix}"));
            counter += 1;
        }
        dest
    }

    /// Reverse every non-undone log entry of `batch_id`, newest-first.
    pub fn undo_batch(&mut self, batch_id: &str, dry_run: bool) -> Result<UndoSummary> {
        let entries = self.catalog.action_log_for_batch(batch_id)?;
        let mut summary = UndoSummary::default();

        for entry in entries {
            match undo_one(&entry, dry_run) {
                Ok(true) => {
                    if !dry_run {
                        if let Some(id) = entry.id {
                            self.catalog.mark_undone(id)?;
                        }
                    }
                    summary.undone += 1;
                }
                Ok(false) => summary.skipped += 1,
                Err(_) => summary.failed += 1,
            }
        }

        Ok(summary)
    }
}

/// Reverse a single entry. Returns `Ok(true)` if undone/would-be-undone,
/// `Ok(false)` if skipped (the side the undo needs is missing), `Err` on an
/// unexpected filesystem failure.
fn undo_one(entry: &ActionLogEntry, dry_run: bool) -> Result<bool> {
    match entry.kind {
        ActionKind::Moved => undo_move(entry, dry_run),
        ActionKind::Deleted => undo_delete(entry, dry_run),
        ActionKind::Archived => undo_archive(entry, dry_run),
        ActionKind::Symlinked => undo_symlink(entry, dry_run),
    }
}

fn undo_move(entry: &ActionLogEntry, dry_run: bool) -> Result<bool> {
    let source = Path::new(&entry.source_path);
    let Some(dest_str) = &entry.dest_path else {
        return Ok(false);
    };
    let dest = Path::new(dest_str);
    if !dest.exists() {
        return Ok(false);
    }
    if dry_run {
        return Ok(true);
    }
    if let Some(parent) = source.parent() {
        fs::create_dir_all(parent).map_err(|e| crate::core::errors::DmError::io(parent, e))?;
    }
    fs::rename(dest, source).map_err(|e| crate::core::errors::DmError::io(dest, e))?;
    Ok(true)
}

fn undo_delete(entry: &ActionLogEntry, dry_run: bool) -> Result<bool> {
    // Restoring from trash is mechanically identical to reversing a move.
    undo_move(entry, dry_run)
}

fn undo_archive(entry: &ActionLogEntry, dry_run: bool) -> Result<bool> {
    let Some(dest_str) = &entry.dest_path else {
        return Ok(false);
    };
    let dest = Path::new(dest_str);
    if !dest.exists() {
        return Ok(false);
    }
    if dry_run {
        return Ok(true);
    }
    fs::remove_file(dest).map_err(|e| crate::core::errors::DmError::io(dest, e))?;
    Ok(true)
}

fn undo_symlink(entry: &ActionLogEntry, dry_run: bool) -> Result<bool> {
    let source = Path::new(&entry.source_path);
    let Some(dest_str) = &entry.dest_path else {
        return Ok(false);
    };
    let dest = Path::new(dest_str);
    if dry_run {
        return Ok(true);
    }

    if source.exists() {
        crate::junction::driver::remove_junction(source)?;
    }
    if dest.exists() {
        if let Some(parent) = source.parent() {
            fs::create_dir_all(parent).map_err(|e| crate::core::errors::DmError::io(parent, e))?;
        }
        fs::rename(dest, source).map_err(|e| crate::core::errors::DmError::io(dest, e))?;
    }
    Ok(true)
}

fn now_compact() -> String {
    // `%Y%m%d_%H%M%S` — callers that need a real wall-clock stamp go through
    // `chrono::Utc::now()`; this indirection exists purely so tests can pin it.
    chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string()
}
