//! Top-level CLI definition and dispatch.
//!
//! This wires the pipeline stages (`SPEC_FULL.md` §6) into subcommands for
//! manual operation and scripting. The review UI and the real filesystem
//! ingester are external collaborators (`spec.md` §1); `scan` here is a
//! lightweight metadata walker that stands in for the real ingester so the
//! rest of the pipeline can be exercised end to end from the command line.

use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use thiserror::Error;

use drivemind_triage::catalog::db::Catalog;
use drivemind_triage::catalog::models::{Action, Decision, FileRecord, UserDecision};
use drivemind_triage::core::config::Config;
use drivemind_triage::execution::engine::ExecutionEngine;
use drivemind_triage::logger::{ActivityEvent, ActivityLoggerHandle, JsonlConfig, spawn_logger};
use drivemind_triage::orchestrator::{Orchestrator, now_iso8601};
use drivemind_triage::safety::check_outbound_connections;
use drivemind_triage::undo::manager::UndoManager;

/// DriveMind Triage — local-LLM file classification gated by a hardcoded
/// safety engine, with full undo.
#[derive(Debug, Parser)]
#[command(
    name = "dmt",
    author,
    version,
    about = "DriveMind Triage - offline, privacy-preserving file triage",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Walk a directory tree and record file metadata in the Catalog.
    Scan(ScanArgs),
    /// Classify every unclassified file against the local LLM.
    Classify,
    /// List files awaiting human review.
    Review(ReviewArgs),
    /// Record a human review decision for a file.
    Decide(DecideArgs),
    /// Print the plan of approved actions.
    Plan,
    /// Carry out the approved plan.
    Execute(ExecuteArgs),
    /// Reverse a batch the Execution Engine previously carried out.
    Undo(UndoArgs),
    /// Summarize catalog, classification, and review state.
    Status,
    /// Peripheral health check: LLM reachability plus outbound network audit.
    Doctor,
}

#[derive(Debug, Clone, Args)]
struct ScanArgs {
    /// Root directory to walk.
    root: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct ReviewArgs {
    /// Maximum number of pending entries to print.
    #[arg(long, default_value_t = 50)]
    limit: usize,
}

#[derive(Debug, Clone, Args)]
struct DecideArgs {
    /// Absolute path of the file being decided on.
    path: String,
    /// APPROVE, REJECT, CHANGE, or PROTECT.
    decision: String,
    /// Replacement action, required for CHANGE/PROTECT.
    #[arg(long)]
    action: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct ExecuteArgs {
    /// Print what would happen without touching the filesystem.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Clone, Args)]
struct UndoArgs {
    /// Batch identifier to reverse, e.g. `batch_20260101_120000_a1b2c3d4`.
    batch_id: String,
    /// Print what would be reversed without touching the filesystem.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure (config, catalog, LLM, filesystem).
    #[error("{0}")]
    Runtime(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    let (logger, join) = open_logger(cli);
    if let Some(handle) = &logger {
        if let Ok(config) = Config::load(cli.config.as_deref()) {
            if let Ok(hash) = config.stable_hash() {
                handle.send(ActivityEvent::ConfigLoaded { config_hash: hash });
            }
        }
    }

    let result = match &cli.command {
        Command::Scan(args) => run_scan(cli, args, logger.as_ref()),
        Command::Classify => run_classify(cli, logger.as_ref()),
        Command::Review(args) => run_review(cli, args),
        Command::Decide(args) => run_decide(cli, args, logger.as_ref()),
        Command::Plan => run_plan(cli),
        Command::Execute(args) => run_execute(cli, args, logger.as_ref()),
        Command::Undo(args) => run_undo(cli, args, logger.as_ref()),
        Command::Status => run_status(cli),
        Command::Doctor => run_doctor(cli),
    };

    if let Some(handle) = logger {
        handle.shutdown();
    }
    if let Some(join) = join {
        let _ = join.join();
    }

    result
}

/// Best-effort logger spawn: a failure to spin up the logger thread must
/// never prevent the CLI from doing its actual job.
fn open_logger(cli: &Cli) -> (Option<ActivityLoggerHandle>, Option<std::thread::JoinHandle<()>>) {
    let Ok(config) = Config::load(cli.config.as_deref()) else {
        return (None, None);
    };
    let jsonl_config = JsonlConfig {
        path: config.paths.log_dir.join("activity.jsonl"),
        ..JsonlConfig::default()
    };
    match spawn_logger(jsonl_config) {
        Ok((handle, join)) => (Some(handle), Some(join)),
        Err(_) => (None, None),
    }
}

fn open_catalog(cli: &Cli) -> Result<(Config, Catalog), CliError> {
    let config = Config::load(cli.config.as_deref()).map_err(|e| CliError::Runtime(e.to_string()))?;
    let catalog =
        Catalog::open(&config.paths.catalog_db).map_err(|e| CliError::Runtime(e.to_string()))?;
    Ok((config, catalog))
}

// ---------------------------------------------------------------------------
// scan
// ---------------------------------------------------------------------------

fn run_scan(cli: &Cli, args: &ScanArgs, logger: Option<&ActivityLoggerHandle>) -> Result<(), CliError> {
    let started = std::time::Instant::now();
    let (_config, mut catalog) = open_catalog(cli)?;

    if !args.root.is_dir() {
        return Err(CliError::User(format!(
            "{} is not a directory",
            args.root.display()
        )));
    }

    let batch_id = format!("scan_{}", now_iso8601().replace(['-', ':', '.'], ""));
    let mut records = Vec::new();
    walk_dir(&args.root, &batch_id, &mut records).map_err(|e| CliError::Runtime(e.to_string()))?;

    let count = records.len();
    catalog
        .upsert_files(&records)
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    if let Some(handle) = logger {
        handle.send(ActivityEvent::ScanCompleted {
            batch_id: batch_id.clone(),
            file_count: count as u64,
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }

    emit(cli, json!({"command": "scan", "batch_id": batch_id, "files": count}), || {
        println!("scanned {count} files into batch {batch_id}");
    })
}

fn walk_dir(dir: &Path, batch_id: &str, out: &mut Vec<FileRecord>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            walk_dir(&path, batch_id, out)?;
        } else {
            out.push(file_record(&path, &metadata, batch_id));
        }
    }
    Ok(())
}

fn file_record(path: &Path, metadata: &fs::Metadata, batch_id: &str) -> FileRecord {
    let extension = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_ascii_lowercase()))
        .unwrap_or_default();
    let leaf = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent_path = path
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    FileRecord {
        id: None,
        path: path.to_string_lossy().into_owned(),
        leaf,
        extension,
        size_bytes: metadata.len(),
        created_at: to_rfc3339(metadata.created()),
        modified_at: to_rfc3339(metadata.modified()),
        accessed_at: to_rfc3339(metadata.accessed()),
        owner: String::new(),
        read_only: metadata.permissions().readonly(),
        is_directory: false,
        parent_path,
        scan_batch_id: batch_id.to_string(),
    }
}

fn to_rfc3339(time: io::Result<std::time::SystemTime>) -> String {
    time.ok()
        .map(|t| DateTime::<Utc>::from(t).to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// classify
// ---------------------------------------------------------------------------

fn run_classify(cli: &Cli, logger: Option<&ActivityLoggerHandle>) -> Result<(), CliError> {
    let (config, mut catalog) = open_catalog(cli)?;
    let mut orchestrator = Orchestrator::new(&mut catalog, &config, now_iso8601)
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    let preflight = orchestrator.preflight();
    if !preflight.llm_reachable {
        return Err(CliError::Runtime(format!(
            "local LLM at {} is not reachable",
            config.llm.host
        )));
    }

    let summary = orchestrator
        .classify_all()
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    if let Some(handle) = logger {
        if summary.aborted {
            handle.send(ActivityEvent::ClassificationAborted {
                consecutive_zero_progress_batches: config.orchestrator.max_consecutive_zero_progress_batches,
            });
        }
        handle.send(ActivityEvent::ClassificationBatchCompleted {
            classified: summary.classified,
            overridden: summary.overridden,
            errors: summary.errors,
        });
    }

    emit(
        cli,
        json!({
            "command": "classify",
            "classified": summary.classified,
            "overridden": summary.overridden,
            "errors": summary.errors,
            "batches": summary.batches,
            "aborted": summary.aborted,
        }),
        || {
            println!(
                "classified={} overridden={} errors={} batches={} aborted={}",
                summary.classified, summary.overridden, summary.errors, summary.batches, summary.aborted
            );
        },
    )
}

// ---------------------------------------------------------------------------
// review / decide / plan
// ---------------------------------------------------------------------------

fn run_review(cli: &Cli, args: &ReviewArgs) -> Result<(), CliError> {
    let (_config, catalog) = open_catalog(cli)?;
    let pending = catalog
        .pending_review(args.limit)
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    let payload = json!({
        "command": "review",
        "pending": pending.iter().map(|p| json!({
            "path": p.file.path,
            "action": p.classification.action.as_str(),
            "confidence": p.classification.confidence,
            "reason": p.classification.reason,
            "category": p.classification.category,
            "overridden": p.classification.overridden,
        })).collect::<Vec<_>>(),
    });

    emit(cli, payload, || {
        if pending.is_empty() {
            println!("nothing pending review");
        }
        for p in &pending {
            println!(
                "{}  {:<14} conf={:.2}  {}",
                p.file.path,
                p.classification.action.as_str(),
                p.classification.confidence,
                p.classification.reason
            );
        }
    })
}

fn run_decide(
    cli: &Cli,
    args: &DecideArgs,
    logger: Option<&ActivityLoggerHandle>,
) -> Result<(), CliError> {
    let (_config, mut catalog) = open_catalog(cli)?;

    let Some(file) = catalog
        .file_by_path(&args.path)
        .map_err(|e| CliError::Runtime(e.to_string()))?
    else {
        return Err(CliError::User(format!("no cataloged file at {}", args.path)));
    };
    let Some(file_id) = file.id else {
        return Err(CliError::Runtime(format!("file at {} has no row id", args.path)));
    };

    let decision = Decision::parse(&args.decision)
        .ok_or_else(|| CliError::User(format!("unrecognized decision {:?}", args.decision)))?;

    let replacement_action = match &args.action {
        Some(token) => Some(
            Action::parse(token)
                .ok_or_else(|| CliError::User(format!("unrecognized action {token:?}")))?,
        ),
        None => None,
    };
    if decision.requires_replacement_action() && replacement_action.is_none() {
        return Err(CliError::User(format!(
            "{} requires --action",
            decision.as_str()
        )));
    }

    let record = UserDecision {
        id: None,
        file_id,
        decision,
        replacement_action,
        decided_at: now_iso8601(),
        executed: false,
    };
    catalog
        .record_user_decision(&record)
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    if let Some(handle) = logger {
        handle.send(ActivityEvent::DecisionRecorded {
            path: args.path.clone(),
            decision: decision.as_str().to_string(),
        });
    }

    emit(
        cli,
        json!({"command": "decide", "path": args.path, "decision": decision.as_str()}),
        || println!("recorded {} for {}", decision.as_str(), args.path),
    )
}

fn run_plan(cli: &Cli) -> Result<(), CliError> {
    let (_config, catalog) = open_catalog(cli)?;
    let plan = catalog
        .approved_action_plan()
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    let payload = json!({
        "command": "plan",
        "entries": plan.iter().map(|e| json!({
            "path": e.file.path,
            "action": e.final_action.as_str(),
            "size_bytes": e.file.size_bytes,
        })).collect::<Vec<_>>(),
    });

    emit(cli, payload, || {
        for e in &plan {
            println!("{:<14} {}", e.final_action.as_str(), e.file.path);
        }
    })
}

// ---------------------------------------------------------------------------
// execute / undo
// ---------------------------------------------------------------------------

fn run_execute(
    cli: &Cli,
    args: &ExecuteArgs,
    logger: Option<&ActivityLoggerHandle>,
) -> Result<(), CliError> {
    let (config, mut catalog) = open_catalog(cli)?;
    let mut engine = ExecutionEngine::new(
        &mut catalog,
        config.organization.clone(),
        config.paths.trash_dir.clone(),
        now_iso8601,
    );
    let summary = engine
        .execute_plan(args.dry_run)
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    if !args.dry_run {
        if let (Some(handle), Some(batch_id)) = (logger, &summary.batch_id) {
            handle.send(ActivityEvent::ExecutionBatchCompleted {
                batch_id: batch_id.clone(),
                moved: summary.moved,
                deleted: summary.deleted,
                archived: summary.archived,
                symlinked: summary.symlinked,
                skipped: summary.skipped,
                errors: summary.errors,
            });
        }
    }

    emit(
        cli,
        json!({
            "command": "execute",
            "dry_run": args.dry_run,
            "batch_id": summary.batch_id,
            "moved": summary.moved,
            "deleted": summary.deleted,
            "archived": summary.archived,
            "symlinked": summary.symlinked,
            "skipped": summary.skipped,
            "errors": summary.errors,
        }),
        || {
            println!(
                "batch={} moved={} deleted={} archived={} symlinked={} skipped={} errors={}",
                summary.batch_id.as_deref().unwrap_or("-"),
                summary.moved,
                summary.deleted,
                summary.archived,
                summary.symlinked,
                summary.skipped,
                summary.errors
            );
        },
    )
}

fn run_undo(
    cli: &Cli,
    args: &UndoArgs,
    logger: Option<&ActivityLoggerHandle>,
) -> Result<(), CliError> {
    let (config, mut catalog) = open_catalog(cli)?;
    let mut manager = UndoManager::new(&mut catalog, config.paths.trash_dir.clone(), now_iso8601);
    let summary = manager
        .undo_batch(&args.batch_id, args.dry_run)
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    if !args.dry_run {
        if let Some(handle) = logger {
            handle.send(ActivityEvent::UndoCompleted {
                batch_id: args.batch_id.clone(),
                undone: summary.undone,
                skipped: summary.skipped,
                failed: summary.failed,
            });
        }
    }

    emit(
        cli,
        json!({
            "command": "undo",
            "batch_id": args.batch_id,
            "dry_run": args.dry_run,
            "undone": summary.undone,
            "skipped": summary.skipped,
            "failed": summary.failed,
        }),
        || {
            println!(
                "undone={} skipped={} failed={}",
                summary.undone, summary.skipped, summary.failed
            );
        },
    )
}

// ---------------------------------------------------------------------------
// status / doctor
// ---------------------------------------------------------------------------

fn run_status(cli: &Cli) -> Result<(), CliError> {
    let (_config, catalog) = open_catalog(cli)?;
    let progress = catalog
        .review_progress()
        .map_err(|e| CliError::Runtime(e.to_string()))?;
    let by_action = catalog
        .summary_by_action()
        .map_err(|e| CliError::Runtime(e.to_string()))?;
    let top = catalog
        .top_largest(10)
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    let payload = json!({
        "command": "status",
        "review_progress": {
            "classified": progress.classified,
            "approved": progress.approved,
            "rejected": progress.rejected,
            "changed": progress.changed,
            "protected": progress.protected,
            "pending": progress.pending,
        },
        "by_action": by_action.iter().map(|s| json!({"action": s.action.as_str(), "count": s.count})).collect::<Vec<_>>(),
        "top_largest": top.iter().map(|t| json!({"path": t.path, "size_bytes": t.size_bytes})).collect::<Vec<_>>(),
    });

    emit(cli, payload, || {
        println!(
            "classified={} approved={} rejected={} changed={} protected={} pending={}",
            progress.classified,
            progress.approved,
            progress.rejected,
            progress.changed,
            progress.protected,
            progress.pending
        );
        for s in &by_action {
            println!("  {:<14} {}", s.action.as_str(), s.count);
        }
    })
}

fn run_doctor(cli: &Cli) -> Result<(), CliError> {
    let (config, _catalog) = open_catalog(cli)?;
    let orchestrator_config = config.llm.clone();
    let client = drivemind_triage::orchestrator::llm::OllamaClient::new(&orchestrator_config)
        .map_err(|e| CliError::Runtime(e.to_string()))?;
    let preflight = client.preflight();

    let llm_port = parse_port(&config.llm.host).unwrap_or(11434);
    let violations =
        check_outbound_connections(llm_port).map_err(|e| CliError::Runtime(e.to_string()))?;

    let payload = json!({
        "command": "doctor",
        "llm_reachable": preflight.llm_reachable,
        "model_loaded": preflight.model_loaded,
        "network_violations": violations.iter().map(|v| json!({
            "remote_addr": v.remote_addr.to_string(),
            "remote_port": v.remote_port,
        })).collect::<Vec<_>>(),
    });

    emit(cli, payload, || {
        println!(
            "llm_reachable={} model_loaded={}",
            preflight.llm_reachable, preflight.model_loaded
        );
        if violations.is_empty() {
            println!("no unexpected outbound connections");
        } else {
            for v in &violations {
                println!("unexpected outbound connection to {}:{}", v.remote_addr, v.remote_port);
            }
        }
    })
}

fn parse_port(host: &str) -> Option<u16> {
    host.rsplit_once(':')?.1.parse().ok()
}

// ---------------------------------------------------------------------------
// output helpers
// ---------------------------------------------------------------------------

fn emit(cli: &Cli, payload: Value, human: impl FnOnce()) -> Result<(), CliError> {
    match output_mode(cli) {
        OutputMode::Human => {
            human();
            Ok(())
        }
        OutputMode::Json => write_json_line(&payload),
    }
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    if cli.json {
        return OutputMode::Json;
    }
    let env_mode = std::env::var("DMT_OUTPUT_FORMAT").ok();
    match env_mode.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ if io::stdout().is_terminal() => OutputMode::Human,
        _ => OutputMode::Json,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_error_exit_codes_are_stable() {
        assert_eq!(CliError::User("x".into()).exit_code(), 1);
        assert_eq!(CliError::Runtime("x".into()).exit_code(), 2);
    }

    #[test]
    fn parse_port_extracts_trailing_port() {
        assert_eq!(parse_port("http://127.0.0.1:11434"), Some(11434));
        assert_eq!(parse_port("http://127.0.0.1"), None);
    }
}
