//! Aggregate query views consumed by the review UI and the Execution Engine.
//!
//! Normalized into explicit record types per query (`SPEC_FULL.md` §9 design
//! note) rather than returned as opaque row maps.

#![allow(missing_docs)]

use rusqlite::params;

use crate::catalog::db::{Catalog, row_to_file_record};
use crate::catalog::models::{Action, Classification, Decision, FileRecord};
use crate::core::errors::Result;

/// One row of the execution plan: the file plus the action finally approved.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovedPlanEntry {
    pub file: FileRecord,
    pub final_action: Action,
}

/// Classification counts grouped by final action.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryByAction {
    pub action: Action,
    pub count: u64,
}

/// A file ranked by size, for the "top-N largest" view.
#[derive(Debug, Clone, PartialEq)]
pub struct TopFile {
    pub path: String,
    pub size_bytes: u64,
}

/// Per-extension byte/file totals.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionTotal {
    pub extension: String,
    pub total_bytes: u64,
    pub file_count: u64,
}

/// Review progress counters for the review UI's status bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReviewProgress {
    pub classified: u64,
    pub approved: u64,
    pub rejected: u64,
    pub changed: u64,
    pub protected: u64,
    pub pending: u64,
}

/// One row of the pending-review queue: a classified file with no recorded
/// [`crate::catalog::models::UserDecision`] yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReviewEntry {
    pub file: FileRecord,
    pub classification: Classification,
}

impl Catalog {
    /// The execution plan: files with classifications with user-decisions
    /// where decision ∈ {APPROVE, CHANGE}. `CHANGE` uses the user's
    /// replacement action; otherwise the classification's (post-safety)
    /// action is final. `PROTECT` is excluded (forced `KEEP`, not executed).
    pub fn approved_action_plan(&self) -> Result<Vec<ApprovedPlanEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT f.id, f.path, f.leaf, f.extension, f.size_bytes, f.created_at, f.modified_at,
                    f.accessed_at, f.owner, f.read_only, f.is_directory, f.parent_path, f.scan_batch_id,
                    c.action, d.decision, d.replacement_action
             FROM files f
             JOIN classifications c ON c.file_id = f.id
             JOIN user_decisions d ON d.file_id = f.id
             WHERE d.decision IN ('APPROVE', 'CHANGE') AND d.executed = 0
             ORDER BY f.id ASC",
        )?;
        let mut rows = stmt
            .query_map([], |row| {
                let file = row_to_file_record(row)?;
                let classification_action: String = row.get(13)?;
                let decision: String = row.get(14)?;
                let replacement: Option<String> = row.get(15)?;
                Ok((file, classification_action, decision, replacement))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut plan: Vec<ApprovedPlanEntry> = rows
            .drain(..)
            .filter_map(|(file, classification_action, decision, replacement)| {
                let decision = Decision::parse(&decision)?;
                let final_action = if decision == Decision::Change {
                    replacement.as_deref().and_then(Action::parse)?
                } else {
                    Action::parse(&classification_action)?
                };
                Some(ApprovedPlanEntry { file, final_action })
            })
            .collect();

        plan.sort_by_key(|entry| entry.file.id);
        Ok(plan)
    }

    /// Classification counts grouped by final action.
    pub fn summary_by_action(&self) -> Result<Vec<SummaryByAction>> {
        let mut stmt = self
            .conn
            .prepare("SELECT action, COUNT(*) FROM classifications GROUP BY action ORDER BY action")?;
        let rows = stmt
            .query_map([], |row| {
                let action: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((action, count))
            })?
            .filter_map(|r| r.ok())
            .filter_map(|(action, count)| {
                Action::parse(&action).map(|action| SummaryByAction {
                    action,
                    count: u64::try_from(count).unwrap_or(0),
                })
            })
            .collect();
        Ok(rows)
    }

    /// Top-N largest files currently in the catalog.
    pub fn top_largest(&self, n: usize) -> Result<Vec<TopFile>> {
        let mut stmt = self
            .conn
            .prepare("SELECT path, size_bytes FROM files ORDER BY size_bytes DESC LIMIT ?1")?;
        let rows = stmt
            .query_map(params![i64::try_from(n).unwrap_or(i64::MAX)], |row| {
                Ok(TopFile {
                    path: row.get(0)?,
                    size_bytes: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Per-extension totals across all files.
    pub fn per_extension_totals(&self) -> Result<Vec<ExtensionTotal>> {
        let mut stmt = self.conn.prepare(
            "SELECT extension, SUM(size_bytes), COUNT(*) FROM files GROUP BY extension
             ORDER BY SUM(size_bytes) DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let total_bytes: i64 = row.get(1)?;
                let file_count: i64 = row.get(2)?;
                Ok(ExtensionTotal {
                    extension: row.get(0)?,
                    total_bytes: u64::try_from(total_bytes).unwrap_or(0),
                    file_count: u64::try_from(file_count).unwrap_or(0),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Review progress counters.
    pub fn review_progress(&self) -> Result<ReviewProgress> {
        let classified: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM classifications", [], |r| r.get(0))?;
        let mut progress = ReviewProgress {
            classified: u64::try_from(classified).unwrap_or(0),
            ..ReviewProgress::default()
        };

        let mut stmt = self
            .conn
            .prepare("SELECT decision, COUNT(*) FROM user_decisions GROUP BY decision")?;
        let rows = stmt
            .query_map([], |row| {
                let decision: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((decision, u64::try_from(count).unwrap_or(0)))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let mut decided_total = 0u64;
        for (decision, count) in rows {
            decided_total += count;
            match Decision::parse(&decision) {
                Some(Decision::Approve) => progress.approved = count,
                Some(Decision::Reject) => progress.rejected = count,
                Some(Decision::Change) => progress.changed = count,
                Some(Decision::Protect) => progress.protected = count,
                None => {}
            }
        }
        progress.pending = progress.classified.saturating_sub(decided_total);
        Ok(progress)
    }

    /// Files that have been classified but have no recorded decision yet,
    /// delete-actions-first, for the `review` subcommand's queue view.
    pub fn pending_review(&self, limit: usize) -> Result<Vec<PendingReviewEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT f.id, f.path, f.leaf, f.extension, f.size_bytes, f.created_at, f.modified_at,
                    f.accessed_at, f.owner, f.read_only, f.is_directory, f.parent_path, f.scan_batch_id,
                    c.id, c.action, c.confidence, c.reason, c.category, c.overridden,
                    c.override_reason, c.classified_at
             FROM files f
             JOIN classifications c ON c.file_id = f.id
             LEFT JOIN user_decisions d ON d.file_id = f.id
             WHERE d.id IS NULL
             ORDER BY (CASE WHEN c.action LIKE 'DELETE\_%' ESCAPE '\' THEN 0 ELSE 1 END), f.id ASC
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![i64::try_from(limit).unwrap_or(i64::MAX)], |row| {
                let file = row_to_file_record(row)?;
                let action: String = row.get(14)?;
                let overridden: bool = row.get(18)?;
                Ok((
                    file,
                    action,
                    row.get::<_, f64>(15)?,
                    row.get::<_, String>(16)?,
                    row.get::<_, String>(17)?,
                    overridden,
                    row.get::<_, Option<String>>(19)?,
                    row.get::<_, String>(20)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let entries = rows
            .into_iter()
            .filter_map(
                |(file, action, confidence, reason, category, overridden, override_reason, classified_at)| {
                    let file_id = file.id?;
                    Some(PendingReviewEntry {
                        classification: Classification {
                            id: None,
                            file_id,
                            action: Action::parse(&action)?,
                            confidence,
                            reason,
                            category,
                            overridden,
                            override_reason,
                            classified_at,
                        },
                        file,
                    })
                },
            )
            .collect();
        Ok(entries)
    }
}
