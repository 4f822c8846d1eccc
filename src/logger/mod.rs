//! Activity logging: JSONL append-only log fed by a dedicated logger thread.

pub mod dual;
pub mod jsonl;

pub use dual::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
pub use jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};
