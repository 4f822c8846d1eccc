//! The six entities the Catalog persists, plus the closed alphabets they're
//! built from.
//!
//! Ported from the original `database.py` schema (see `DESIGN.md`). Every
//! enum here round-trips through `rusqlite` as `TEXT` (via `ToSql`/`FromSql`
//! impls in [`crate::catalog::db`]) and through `serde_json` as its wire
//! token, so the on-disk, on-wire, and in-memory representations all agree
//! with `SPEC_FULL.md` §6's closed alphabets.

use serde::{Deserialize, Serialize};

/// The six actions a classification or final decision may take.
///
/// Any value the LLM emits outside this set is coerced to [`Action::Keep`]
/// by [`crate::orchestrator::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Keep,
    MoveApp,
    MoveData,
    DeleteJunk,
    DeleteUnused,
    Archive,
}

impl Action {
    /// The on-wire/on-disk token, e.g. `"DELETE_JUNK"`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Keep => "KEEP",
            Self::MoveApp => "MOVE_APP",
            Self::MoveData => "MOVE_DATA",
            Self::DeleteJunk => "DELETE_JUNK",
            Self::DeleteUnused => "DELETE_UNUSED",
            Self::Archive => "ARCHIVE",
        }
    }

    /// Parse a token, matching case-insensitively. Returns `None` for any
    /// token outside the closed alphabet — callers coerce to `Keep`.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "KEEP" => Some(Self::Keep),
            "MOVE_APP" => Some(Self::MoveApp),
            "MOVE_DATA" => Some(Self::MoveData),
            "DELETE_JUNK" => Some(Self::DeleteJunk),
            "DELETE_UNUSED" => Some(Self::DeleteUnused),
            "ARCHIVE" => Some(Self::Archive),
            _ => None,
        }
    }

    /// Whether this action deletes (soft-deletes) the source.
    #[must_use]
    pub const fn is_delete(self) -> bool {
        matches!(self, Self::DeleteJunk | Self::DeleteUnused)
    }
}

/// The four decisions a human reviewer may record against a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Approve,
    Reject,
    Change,
    Protect,
}

impl Decision {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "APPROVE",
            Self::Reject => "REJECT",
            Self::Change => "CHANGE",
            Self::Protect => "PROTECT",
        }
    }

    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "APPROVE" => Some(Self::Approve),
            "REJECT" => Some(Self::Reject),
            "CHANGE" => Some(Self::Change),
            "PROTECT" => Some(Self::Protect),
            _ => None,
        }
    }

    /// Whether a replacement action is required for this decision (`CHANGE`/`PROTECT`).
    #[must_use]
    pub const fn requires_replacement_action(self) -> bool {
        matches!(self, Self::Change | Self::Protect)
    }
}

/// The four kinds of append-only action-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Moved,
    Deleted,
    Archived,
    Symlinked,
}

impl ActionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Moved => "MOVED",
            Self::Deleted => "DELETED",
            Self::Archived => "ARCHIVED",
            Self::Symlinked => "SYMLINKED",
        }
    }

    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "MOVED" => Some(Self::Moved),
            "DELETED" => Some(Self::Deleted),
            "ARCHIVED" => Some(Self::Archived),
            "SYMLINKED" => Some(Self::Symlinked),
            _ => None,
        }
    }
}

/// A unit of triage: one filesystem entry as of its last scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Row id, `None` until inserted.
    pub id: Option<i64>,
    /// Absolute native path — unique key.
    pub path: String,
    pub leaf: String,
    /// Lowercased extension including the leading dot, or empty.
    pub extension: String,
    /// 0 for directories.
    pub size_bytes: u64,
    pub created_at: String,
    pub modified_at: String,
    pub accessed_at: String,
    /// Owner principal, or empty if unknown.
    pub owner: String,
    pub read_only: bool,
    pub is_directory: bool,
    pub parent_path: String,
    pub scan_batch_id: String,
}

/// One classification per [`FileRecord`] (unique on `file_id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub id: Option<i64>,
    pub file_id: i64,
    pub action: Action,
    pub confidence: f64,
    pub reason: String,
    pub category: String,
    pub overridden: bool,
    pub override_reason: Option<String>,
    pub classified_at: String,
}

/// One human review decision per [`FileRecord`] (unique on `file_id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDecision {
    pub id: Option<i64>,
    pub file_id: i64,
    pub decision: Decision,
    pub replacement_action: Option<Action>,
    pub decided_at: String,
    /// Set once the Execution Engine has dispatched this decision (whether it
    /// mutated, skipped a missing source, or was forced to `KEEP` by
    /// `PROTECT`). A fresh [`Catalog::record_user_decision`] call always
    /// resets this to `false`, so re-deciding a file makes it eligible for
    /// the approved-action plan again. Entries left `false` after an error
    /// stay in the plan for retry on the next `execute_plan` call.
    pub executed: bool,
}

/// An append-only journal entry. Never deleted, only marked `undone`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub id: Option<i64>,
    /// Weak reference — the `FileRecord` row may be gone by the time this is read.
    pub file_id: Option<i64>,
    pub kind: ActionKind,
    pub source_path: String,
    /// Required for all kinds except a pure deletion of an already-missing file.
    pub dest_path: Option<String>,
    pub checksum_before: Option<String>,
    pub checksum_after: Option<String>,
    pub batch_id: String,
    pub executed_at: String,
    pub undone: bool,
}

/// A publisher/registry-discovered application. Hint-only, not on the hot path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledApplication {
    pub id: Option<i64>,
    /// Unique key.
    pub registry_key: String,
    pub display_name: String,
    pub publisher: String,
    pub install_location: Option<String>,
}

/// Per-directory rollup, rebuilt per scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryAggregate {
    pub id: Option<i64>,
    /// Unique key.
    pub path: String,
    pub total_bytes: u64,
    pub file_count: u64,
}
