//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use drivemind_triage::prelude::*;
//! ```

// Core
pub use crate::core::config::{Config, LlmConfig, OrchestratorConfig, OrganizationRoots, PathsConfig};
pub use crate::core::errors::{DmError, Result};

// Catalog
pub use crate::catalog::db::Catalog;
pub use crate::catalog::models::{
    Action, ActionKind, ActionLogEntry, Classification, Decision, DirectoryAggregate, FileRecord,
    InstalledApplication, UserDecision,
};
pub use crate::catalog::{
    ApprovedPlanEntry, ExtensionTotal, PendingReviewEntry, ReviewProgress, SummaryByAction, TopFile,
};

// Safety Engine
pub use crate::safety::{
    NetworkViolation, SafetyConfig, SafetyEngine, Verdict, check_outbound_connections,
};

// Classification Orchestrator
pub use crate::orchestrator::llm::{OllamaClient, PreflightResult};
pub use crate::orchestrator::parse::{RawClassification, parse_response};
pub use crate::orchestrator::{ClassificationSummary, Orchestrator, now_iso8601};

// Execution Engine
pub use crate::execution::{ExecutionEngine, ExecutionSummary};

// Undo Manager / Junction Driver
pub use crate::junction::{AppMigrator, MigrationOutcome};
pub use crate::undo::{UndoManager, UndoSummary};

// Logging
pub use crate::logger::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
