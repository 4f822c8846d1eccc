//! `drivemind_triage` (`dmt`) — an offline, privacy-preserving Windows
//! file-triage engine.
//!
//! A local LLM proposes what to do with each file on disk — keep it, move it
//! off the system drive, delete it, or archive it — but never decides alone:
//! every proposal passes through a hardcoded, AI-proof Safety Engine before
//! it reaches a human reviewer, and nothing the engine does is irreversible
//! until its log entry is. Five stages:
//!
//! 1. **Catalog** — the embedded SQLite store of record for files,
//!    classifications, decisions, and the undo-able action log.
//! 2. **Classification Orchestrator** — batches unclassified files to a
//!    loopback-only local LLM and reconciles its response.
//! 3. **Safety Engine** — a pure, four-layer pipeline with absolute override
//!    authority over any AI verdict.
//! 4. **Execution Engine** — carries out the human-approved plan.
//! 5. **Undo Manager** / **Junction Driver** — batch-scoped reversal and the
//!    Windows Directory Junction primitive for application migrations.

pub mod catalog;
pub mod core;
pub mod execution;
pub mod junction;
pub mod logger;
pub mod orchestrator;
pub mod safety;
pub mod undo;

pub mod prelude;
