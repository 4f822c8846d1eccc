//! Activity logger: a dedicated thread owns the [`JsonlWriter`]; every other
//! thread sends [`ActivityEvent`]s over a bounded channel.
//!
//! Ported from the teacher's `logger::dual` coordinator (see `DESIGN.md`).
//! The teacher also dual-writes to SQLite; here the Catalog already *is* the
//! structured store of record (`SPEC_FULL.md` §3), so this sink is JSONL-only
//! — but the bounded-channel / dedicated-thread / non-blocking-send shape is
//! kept exactly, since it is what keeps the classification and execution
//! loops from ever blocking on log I/O.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{DmError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

const CHANNEL_CAPACITY: usize = 1024;

/// Events the engine logs through the activity logger.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    ScanCompleted {
        batch_id: String,
        file_count: u64,
        duration_ms: u64,
    },
    ClassificationBatchCompleted {
        classified: u64,
        overridden: u64,
        errors: u64,
    },
    ClassificationAborted {
        consecutive_zero_progress_batches: u32,
    },
    SafetyOverride {
        path: String,
        reason: String,
    },
    DecisionRecorded {
        path: String,
        decision: String,
    },
    ActionExecuted {
        path: String,
        action: String,
        batch_id: String,
    },
    ActionFailed {
        path: String,
        action: String,
        error_code: String,
        error_message: String,
    },
    ActionSkipped {
        path: String,
        action: String,
        reason: String,
    },
    ExecutionBatchCompleted {
        batch_id: String,
        moved: u64,
        deleted: u64,
        archived: u64,
        symlinked: u64,
        skipped: u64,
        errors: u64,
    },
    UndoCompleted {
        batch_id: String,
        undone: u64,
        skipped: u64,
        failed: u64,
    },
    ConfigLoaded {
        config_hash: String,
    },
    Error {
        code: String,
        message: String,
    },
    /// Sentinel to request graceful shutdown of the logger thread.
    Shutdown,
}

/// Thread-safe, cheaply-cloneable handle for sending activity events.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Send an event to the logger thread. Non-blocking: a full channel drops
    /// the event and increments the dropped-events counter rather than
    /// stalling the caller.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Request graceful shutdown and let the logger thread drain its queue.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

/// Spawn the logger thread and return a handle plus its join handle.
pub fn spawn_logger(config: JsonlConfig) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    spawn_logger_with_capacity(config, CHANNEL_CAPACITY)
}

/// As [`spawn_logger`], with an explicit channel capacity (used in tests).
pub fn spawn_logger_with_capacity(
    config: JsonlConfig,
    capacity: usize,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_clone = Arc::clone(&dropped);

    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: dropped,
    };

    let join = thread::Builder::new()
        .name("dmt-logger".to_string())
        .spawn(move || logger_thread_main(rx, config, dropped_clone))
        .map_err(|e| DmError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

fn logger_thread_main(rx: Receiver<ActivityEvent>, jsonl_config: JsonlConfig, dropped: Arc<AtomicU64>) {
    let mut jsonl = JsonlWriter::open(jsonl_config);

    while let Ok(event) = rx.recv() {
        let d = dropped.swap(0, Ordering::Relaxed);
        if d > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{d} log events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        if matches!(event, ActivityEvent::Shutdown) {
            break;
        }

        jsonl.write_entry(&event_to_log_entry(&event));
    }

    jsonl.flush();
    jsonl.fsync();
}

#[allow(clippy::too_many_lines)]
fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::ScanCompleted {
            batch_id,
            file_count,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::ScanCompleted, Severity::Info);
            e.batch_id = Some(batch_id.clone());
            e.count = Some(*file_count);
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(true);
            e
        }
        ActivityEvent::ClassificationBatchCompleted {
            classified,
            overridden,
            errors,
        } => {
            let mut e = LogEntry::new(EventType::ClassificationBatchCompleted, Severity::Info);
            e.count = Some(*classified);
            e.details = Some(format!("overridden={overridden} errors={errors}"));
            e.ok = Some(*errors == 0);
            e
        }
        ActivityEvent::ClassificationAborted {
            consecutive_zero_progress_batches,
        } => {
            let mut e = LogEntry::new(EventType::ClassificationAborted, Severity::Warning);
            e.details = Some(format!(
                "{consecutive_zero_progress_batches} consecutive zero-progress batches"
            ));
            e.ok = Some(false);
            e
        }
        ActivityEvent::SafetyOverride { path, reason } => {
            let mut e = LogEntry::new(EventType::SafetyOverride, Severity::Info);
            e.path = Some(path.clone());
            e.details = Some(reason.clone());
            e
        }
        ActivityEvent::DecisionRecorded { path, decision } => {
            let mut e = LogEntry::new(EventType::DecisionRecorded, Severity::Info);
            e.path = Some(path.clone());
            e.action = Some(decision.clone());
            e
        }
        ActivityEvent::ActionExecuted {
            path,
            action,
            batch_id,
        } => {
            let mut e = LogEntry::new(EventType::ActionExecuted, Severity::Info);
            e.path = Some(path.clone());
            e.action = Some(action.clone());
            e.batch_id = Some(batch_id.clone());
            e.ok = Some(true);
            e
        }
        ActivityEvent::ActionFailed {
            path,
            action,
            error_code,
            error_message,
        } => {
            let mut e = LogEntry::new(EventType::ActionFailed, Severity::Critical);
            e.path = Some(path.clone());
            e.action = Some(action.clone());
            e.error_code = Some(error_code.clone());
            e.error_message = Some(error_message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::ActionSkipped { path, action, reason } => {
            let mut e = LogEntry::new(EventType::ActionSkipped, Severity::Warning);
            e.path = Some(path.clone());
            e.action = Some(action.clone());
            e.details = Some(reason.clone());
            e
        }
        ActivityEvent::ExecutionBatchCompleted {
            batch_id,
            moved,
            deleted,
            archived,
            symlinked,
            skipped,
            errors,
        } => {
            let mut e = LogEntry::new(EventType::ActionExecuted, Severity::Info);
            e.batch_id = Some(batch_id.clone());
            e.count = Some(moved + deleted + archived + symlinked);
            e.details = Some(format!("skipped={skipped} errors={errors}"));
            e.ok = Some(*errors == 0);
            e
        }
        ActivityEvent::UndoCompleted {
            batch_id,
            undone,
            skipped,
            failed,
        } => {
            let mut e = LogEntry::new(EventType::UndoCompleted, Severity::Info);
            e.batch_id = Some(batch_id.clone());
            e.count = Some(*undone);
            e.details = Some(format!("skipped={skipped} failed={failed}"));
            e.ok = Some(*failed == 0);
            e
        }
        ActivityEvent::ConfigLoaded { config_hash } => {
            let mut e = LogEntry::new(EventType::ConfigLoaded, Severity::Info);
            e.details = Some(format!("config_hash={config_hash}"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::Shutdown => LogEntry::new(EventType::Error, Severity::Info),
    }
}
