//! The Execution Engine: carries out the approved action plan.
//!
//! Ported from `executor.py::ExecutionEngine` (see `DESIGN.md`). Dispatches
//! each [`crate::catalog::queries::ApprovedPlanEntry`] by its final action,
//! logs every mutation to the Catalog's action log before it is irreversible,
//! and never permanently deletes — `DELETE_*` moves to `trash_dir` so the
//! Undo Manager can restore it.

use std::fs;
use std::path::{Path, PathBuf};

use crate::catalog::db::Catalog;
use crate::catalog::models::{Action, ActionKind, ActionLogEntry};
use crate::catalog::queries::ApprovedPlanEntry;
use crate::core::config::OrganizationRoots;
use crate::core::errors::Result;
use crate::execution::archive;
use crate::execution::checksum::checksum_file;
use crate::execution::destination::{categorize, compute_dest_path};
use crate::junction::driver::{AppMigrator, MigrationOutcome};
use crate::undo::manager::UndoManager;

/// Execution summary returned from [`ExecutionEngine::execute_plan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub batch_id: Option<String>,
    pub moved: u64,
    pub deleted: u64,
    pub archived: u64,
    pub symlinked: u64,
    pub skipped: u64,
    pub errors: u64,
}

/// Carries out the approved plan against the filesystem and the Catalog.
pub struct ExecutionEngine<'a> {
    catalog: &'a mut Catalog,
    organization: OrganizationRoots,
    trash_dir: PathBuf,
    now: fn() -> String,
}

impl<'a> ExecutionEngine<'a> {
    /// Build an engine. `now` supplies the current-time string used to stamp
    /// action-log entries and pick the archive's `YYYY-MM` directory — an
    /// injection point so callers, and tests, never depend on wall-clock time.
    pub fn new(
        catalog: &'a mut Catalog,
        organization: OrganizationRoots,
        trash_dir: PathBuf,
        now: fn() -> String,
    ) -> Self {
        Self {
            catalog,
            organization,
            trash_dir,
            now,
        }
    }

    /// Execute every entry in [`Catalog::approved_action_plan`], in the order
    /// the query already returns (delete-actions-first). `dry_run` logs what
    /// would happen without touching the filesystem or the action log.
    pub fn execute_plan(&mut self, dry_run: bool) -> Result<ExecutionSummary> {
        let plan = self.catalog.approved_action_plan()?;
        if plan.is_empty() {
            return Ok(ExecutionSummary::default());
        }

        let batch_id = UndoManager::generate_batch_id();
        let mut summary = ExecutionSummary {
            batch_id: Some(batch_id.clone()),
            ..ExecutionSummary::default()
        };

        for entry in &plan {
            let outcome = self.execute_one(entry, &batch_id, dry_run);
            match outcome {
                Ok(dispatched) => {
                    match dispatched {
                        Dispatched::Moved => summary.moved += 1,
                        Dispatched::Symlinked => summary.symlinked += 1,
                        Dispatched::Deleted => summary.deleted += 1,
                        Dispatched::Archived => summary.archived += 1,
                        Dispatched::Skipped => summary.skipped += 1,
                    }
                    // Dispatched (including a missing-source skip) — this
                    // decision is spent and drops out of the next plan.
                    // Errors stay pending so a transient failure can retry.
                    // Dry runs never touch Catalog state.
                    if !dry_run {
                        if let Some(file_id) = entry.file.id {
                            self.catalog.mark_decision_executed(file_id)?;
                        }
                    }
                }
                Err(_) => summary.errors += 1,
            }
        }

        Ok(summary)
    }

    fn execute_one(
        &mut self,
        entry: &ApprovedPlanEntry,
        batch_id: &str,
        dry_run: bool,
    ) -> Result<Dispatched> {
        let source = Path::new(&entry.file.path);
        match entry.final_action {
            Action::MoveData | Action::MoveApp => {
                if entry.final_action == Action::MoveApp && source.is_dir() {
                    return self.execute_app_migration(entry, batch_id, dry_run);
                }
                self.execute_move(entry, batch_id, dry_run)
            }
            Action::DeleteJunk | Action::DeleteUnused => self.execute_delete(entry, batch_id, dry_run),
            Action::Archive => self.execute_archive(entry, batch_id, dry_run),
            Action::Keep => Ok(Dispatched::Skipped),
        }
    }

    fn execute_move(
        &mut self,
        entry: &ApprovedPlanEntry,
        batch_id: &str,
        dry_run: bool,
    ) -> Result<Dispatched> {
        let source = Path::new(&entry.file.path);
        let category = categorize(&entry.file.path, &entry.file.extension);
        let dest = compute_dest_path(&entry.file.path, category.root(&self.organization));

        if dry_run {
            return Ok(Dispatched::Moved);
        }
        if !source.exists() {
            return Ok(Dispatched::Skipped);
        }

        let checksum_before = if source.is_file() {
            Some(checksum_file(source)?)
        } else {
            None
        };

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| crate::core::errors::DmError::io(parent, e))?;
        }
        fs::rename(source, &dest).map_err(|e| crate::core::errors::DmError::io(source, e))?;

        let checksum_after = if dest.is_file() {
            Some(checksum_file(&dest)?)
        } else {
            None
        };

        if let (Some(before), Some(after)) = (&checksum_before, &checksum_after) {
            if before != after {
                // Roll back this single move; never leave a corrupted copy in place.
                let _ = fs::rename(&dest, source);
                return Err(crate::core::errors::DmError::IntegrityFailure {
                    path: source.to_path_buf(),
                    details: format!("checksum mismatch after move: {before} != {after}"),
                });
            }
        }

        self.catalog.append_action_log(&ActionLogEntry {
            id: None,
            file_id: entry.file.id,
            kind: ActionKind::Moved,
            source_path: entry.file.path.clone(),
            dest_path: Some(dest.to_string_lossy().to_string()),
            checksum_before,
            checksum_after,
            batch_id: batch_id.to_string(),
            executed_at: (self.now)(),
            undone: false,
        })?;

        Ok(Dispatched::Moved)
    }

    fn execute_delete(
        &mut self,
        entry: &ApprovedPlanEntry,
        batch_id: &str,
        dry_run: bool,
    ) -> Result<Dispatched> {
        let source = Path::new(&entry.file.path);
        let trash_dest = UndoManager::trash_path(&self.trash_dir, source, batch_id);

        if dry_run {
            return Ok(Dispatched::Deleted);
        }
        if !source.exists() {
            return Ok(Dispatched::Skipped);
        }

        let checksum_before = if source.is_file() {
            Some(checksum_file(source)?)
        } else {
            None
        };

        if let Some(parent) = trash_dest.parent() {
            fs::create_dir_all(parent).map_err(|e| crate::core::errors::DmError::io(parent, e))?;
        }
        fs::rename(source, &trash_dest).map_err(|e| crate::core::errors::DmError::io(source, e))?;

        self.catalog.append_action_log(&ActionLogEntry {
            id: None,
            file_id: entry.file.id,
            kind: ActionKind::Deleted,
            source_path: entry.file.path.clone(),
            dest_path: Some(trash_dest.to_string_lossy().to_string()),
            checksum_before,
            checksum_after: None,
            batch_id: batch_id.to_string(),
            executed_at: (self.now)(),
            undone: false,
        })?;

        Ok(Dispatched::Deleted)
    }

    fn execute_archive(
        &mut self,
        entry: &ApprovedPlanEntry,
        batch_id: &str,
        dry_run: bool,
    ) -> Result<Dispatched> {
        let source = Path::new(&entry.file.path);
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| entry.file.leaf.clone());

        if dry_run {
            return Ok(Dispatched::Archived);
        }
        if !source.exists() {
            return Ok(Dispatched::Skipped);
        }

        let checksum_before = if source.is_file() {
            Some(checksum_file(source)?)
        } else {
            None
        };

        let archive_dir = archive::archive_month_dir(&self.organization.archive, year_of(&(self.now)()), month_of(&(self.now)()));
        fs::create_dir_all(&archive_dir).map_err(|e| crate::core::errors::DmError::io(&archive_dir, e))?;
        let archive_path = archive::pick_archive_path(&archive_dir, &stem);
        archive::create_archive(source, &archive_path)?;

        self.catalog.append_action_log(&ActionLogEntry {
            id: None,
            file_id: entry.file.id,
            kind: ActionKind::Archived,
            source_path: entry.file.path.clone(),
            dest_path: Some(archive_path.to_string_lossy().to_string()),
            checksum_before,
            checksum_after: None,
            batch_id: batch_id.to_string(),
            executed_at: (self.now)(),
            undone: false,
        })?;

        Ok(Dispatched::Archived)
    }

    fn execute_app_migration(
        &mut self,
        entry: &ApprovedPlanEntry,
        batch_id: &str,
        dry_run: bool,
    ) -> Result<Dispatched> {
        let source = Path::new(&entry.file.path);
        let migrator = AppMigrator::new(self.organization.apps.clone());
        let outcome = migrator.migrate_app(source, dry_run)?;

        match outcome {
            MigrationOutcome::Migrated { target } => {
                self.catalog.append_action_log(&ActionLogEntry {
                    id: None,
                    file_id: entry.file.id,
                    kind: ActionKind::Symlinked,
                    source_path: entry.file.path.clone(),
                    dest_path: Some(target.to_string_lossy().to_string()),
                    checksum_before: None,
                    checksum_after: None,
                    batch_id: batch_id.to_string(),
                    executed_at: (self.now)(),
                    undone: false,
                })?;
                Ok(Dispatched::Symlinked)
            }
            MigrationOutcome::DryRun { .. } => Ok(Dispatched::Symlinked),
            MigrationOutcome::Skipped { .. } => Ok(Dispatched::Skipped),
        }
    }
}

enum Dispatched {
    Moved,
    Deleted,
    Archived,
    Symlinked,
    Skipped,
}

fn year_of(timestamp: &str) -> i32 {
    timestamp
        .get(0..4)
        .and_then(|s| s.parse::<i32>().ok())
        .unwrap_or(1970)
}

fn month_of(timestamp: &str) -> u32 {
    timestamp
        .get(5..7)
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::models::{Classification, Decision, FileRecord, UserDecision};

    fn now_stub() -> String {
        "2026-07-28T00:00:00.000Z".to_string()
    }

    fn sample_file(cat: &mut Catalog, path: &str, size: u64) -> i64 {
        cat.upsert_file(&FileRecord {
            id: None,
            path: path.to_string(),
            leaf: Path::new(path).file_name().unwrap().to_string_lossy().to_string(),
            extension: Path::new(path)
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default(),
            size_bytes: size,
            created_at: "t".to_string(),
            modified_at: "t".to_string(),
            accessed_at: "t".to_string(),
            owner: String::new(),
            read_only: false,
            is_directory: false,
            parent_path: String::new(),
            scan_batch_id: "s1".to_string(),
        })
        .unwrap()
    }

    fn approve(cat: &mut Catalog, file_id: i64, action: Action) {
        cat.upsert_classification(&Classification {
            id: None,
            file_id,
            action,
            confidence: 0.95,
            reason: "r".to_string(),
            category: "c".to_string(),
            overridden: false,
            override_reason: None,
            classified_at: "t".to_string(),
        })
        .unwrap();
        cat.record_user_decision(&UserDecision {
            id: None,
            file_id,
            decision: Decision::Approve,
            replacement_action: None,
            decided_at: "t".to_string(),
            executed: false,
        })
        .unwrap();
    }

    #[test]
    fn empty_plan_returns_default_summary_with_no_batch_id() {
        let mut cat = Catalog::open_in_memory().unwrap();
        let roots = OrganizationRoots::default();
        let mut engine = ExecutionEngine::new(&mut cat, roots, PathBuf::from("/tmp/trash"), now_stub);
        let summary = engine.execute_plan(false).unwrap();
        assert!(summary.batch_id.is_none());
        assert_eq!(summary.moved, 0);
    }

    #[test]
    fn delete_moves_file_to_trash_not_permanently() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("junk.tmp");
        std::fs::write(&src, b"x").unwrap();

        let mut cat = Catalog::open_in_memory().unwrap();
        let id = sample_file(&mut cat, src.to_str().unwrap(), 1);
        approve(&mut cat, id, Action::DeleteJunk);

        let trash = dir.path().join("trash");
        let roots = OrganizationRoots::default();
        let mut engine = ExecutionEngine::new(&mut cat, roots, trash.clone(), now_stub);
        let summary = engine.execute_plan(false).unwrap();

        assert_eq!(summary.deleted, 1);
        assert!(!src.exists());
        assert!(trash.exists());
        let trashed: Vec<_> = std::fs::read_dir(&trash).unwrap().collect();
        assert_eq!(trashed.len(), 1);
    }

    #[test]
    fn dry_run_leaves_filesystem_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("junk.tmp");
        std::fs::write(&src, b"x").unwrap();

        let mut cat = Catalog::open_in_memory().unwrap();
        let id = sample_file(&mut cat, src.to_str().unwrap(), 1);
        approve(&mut cat, id, Action::DeleteJunk);

        let trash = dir.path().join("trash");
        let roots = OrganizationRoots::default();
        let mut engine = ExecutionEngine::new(&mut cat, roots, trash.clone(), now_stub);
        let summary = engine.execute_plan(true).unwrap();

        assert_eq!(summary.deleted, 1);
        assert!(src.exists(), "dry run must not touch the filesystem");
        assert!(!trash.exists());
    }

    #[test]
    fn missing_source_is_skipped_not_an_error() {
        let mut cat = Catalog::open_in_memory().unwrap();
        let id = sample_file(&mut cat, "/nonexistent/gone.tmp", 1);
        approve(&mut cat, id, Action::DeleteJunk);

        let dir = tempfile::tempdir().unwrap();
        let roots = OrganizationRoots::default();
        let mut engine = ExecutionEngine::new(&mut cat, roots, dir.path().join("trash"), now_stub);
        let summary = engine.execute_plan(false).unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.errors, 0);
    }

    #[test]
    fn archive_preserves_source() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("report.pdf");
        std::fs::write(&src, b"contents").unwrap();

        let mut cat = Catalog::open_in_memory().unwrap();
        let id = sample_file(&mut cat, src.to_str().unwrap(), 8);
        approve(&mut cat, id, Action::Archive);

        let mut roots = OrganizationRoots::default();
        roots.archive = dir.path().join("archive");
        let mut engine = ExecutionEngine::new(&mut cat, roots, dir.path().join("trash"), now_stub);
        let summary = engine.execute_plan(false).unwrap();

        assert_eq!(summary.archived, 1);
        assert!(src.exists());
    }

    #[test]
    fn deletes_are_ordered_before_moves_per_approved_plan() {
        let dir = tempfile::tempdir().unwrap();
        let move_src = dir.path().join("a.dat");
        let del_src = dir.path().join("junk.tmp");
        std::fs::write(&move_src, b"1").unwrap();
        std::fs::write(&del_src, b"2").unwrap();

        let mut cat = Catalog::open_in_memory().unwrap();
        let move_id = sample_file(&mut cat, move_src.to_str().unwrap(), 1);
        approve(&mut cat, move_id, Action::MoveData);
        let del_id = sample_file(&mut cat, del_src.to_str().unwrap(), 1);
        approve(&mut cat, del_id, Action::DeleteJunk);

        let mut roots = OrganizationRoots::default();
        roots.documents = dir.path().join("organized");
        let mut engine = ExecutionEngine::new(&mut cat, roots, dir.path().join("trash"), now_stub);
        let summary = engine.execute_plan(false).unwrap();

        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.moved, 1);
    }

    // Property 8 (SPEC_FULL §8): re-running execute_plan against the same
    // approved plan, with no new decisions recorded, is a no-op.
    #[test]
    fn second_execute_plan_on_same_approved_plan_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("junk.tmp");
        std::fs::write(&src, b"x").unwrap();

        let mut cat = Catalog::open_in_memory().unwrap();
        let id = sample_file(&mut cat, src.to_str().unwrap(), 1);
        approve(&mut cat, id, Action::DeleteJunk);

        let trash = dir.path().join("trash");
        let roots = OrganizationRoots::default();
        let mut engine = ExecutionEngine::new(&mut cat, roots, trash, now_stub);

        let first = engine.execute_plan(false).unwrap();
        assert_eq!(first.deleted, 1);
        assert!(first.batch_id.is_some());

        let second = engine.execute_plan(false).unwrap();
        assert!(second.batch_id.is_none());
        assert_eq!(second.moved, 0);
        assert_eq!(second.deleted, 0);
        assert_eq!(second.archived, 0);
        assert_eq!(second.symlinked, 0);
        assert_eq!(second.skipped, 0);
        assert_eq!(second.errors, 0);
    }

    // A skipped (missing-source) dispatch also spends the decision so the
    // plan doesn't retry a permanently-gone file forever.
    #[test]
    fn missing_source_skip_also_drops_out_of_next_plan() {
        let mut cat = Catalog::open_in_memory().unwrap();
        let id = sample_file(&mut cat, "/nonexistent/gone.tmp", 1);
        approve(&mut cat, id, Action::DeleteJunk);

        let dir = tempfile::tempdir().unwrap();
        let roots = OrganizationRoots::default();
        let mut engine = ExecutionEngine::new(&mut cat, roots, dir.path().join("trash"), now_stub);

        let first = engine.execute_plan(false).unwrap();
        assert_eq!(first.skipped, 1);

        let second = engine.execute_plan(false).unwrap();
        assert!(second.batch_id.is_none());
    }

    // Dry runs must not spend decisions — a preview run should never change
    // what a real run afterwards would do.
    #[test]
    fn dry_run_does_not_consume_the_plan() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("junk.tmp");
        std::fs::write(&src, b"x").unwrap();

        let mut cat = Catalog::open_in_memory().unwrap();
        let id = sample_file(&mut cat, src.to_str().unwrap(), 1);
        approve(&mut cat, id, Action::DeleteJunk);

        let trash = dir.path().join("trash");
        let roots = OrganizationRoots::default();
        let mut engine = ExecutionEngine::new(&mut cat, roots, trash, now_stub);

        let preview = engine.execute_plan(true).unwrap();
        assert_eq!(preview.deleted, 1);

        let real = engine.execute_plan(false).unwrap();
        assert_eq!(real.deleted, 1);
        assert!(!src.exists());
    }
}
