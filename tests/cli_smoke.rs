//! CLI smoke tests: drive the `dmt` binary as a real subprocess end-to-end
//! for the subcommands that don't require a live local LLM.

mod common;

use std::fs;

fn write_config(dir: &std::path::Path) -> std::path::PathBuf {
    let config_path = dir.join("config.toml");
    let body = format!(
        r#"
[paths]
catalog_db = "{catalog}"
trash_dir = "{trash}"
log_dir = "{log}"

[llm]
host = "http://127.0.0.1:1"
model = "test-model"
request_timeout_secs = 1
availability_timeout_secs = 1
temperature = 0.1
num_predict = 128

[orchestrator]
batch_size = 50
max_consecutive_zero_progress_batches = 3

[organization]
apps = "{apps}"
documents = "{documents}"
media_photos = "{photos}"
media_videos = "{videos}"
media_music = "{music}"
projects = "{projects}"
archive = "{archive}"
"#,
        catalog = dir.join("catalog.sqlite3").display(),
        trash = dir.join("trash").display(),
        log = dir.join("logs").display(),
        apps = dir.join("organized/apps").display(),
        documents = dir.join("organized/documents").display(),
        photos = dir.join("organized/photos").display(),
        videos = dir.join("organized/videos").display(),
        music = dir.join("organized/music").display(),
        projects = dir.join("organized/projects").display(),
        archive = dir.join("organized/archive").display(),
    );
    fs::write(&config_path, body).expect("write test config");
    config_path
}

#[test]
fn help_command_prints_usage() {
    let result = common::run_cli_case("help_command_prints_usage", &["--help"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert!(
        result.stdout.contains("dmt"),
        "missing usage banner; log: {}",
        result.log_path.display()
    );
}

#[test]
fn version_command_prints_version() {
    let result = common::run_cli_case("version_command_prints_version", &["--version"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert!(
        result.stdout.to_lowercase().contains("dmt"),
        "missing version banner; log: {}",
        result.log_path.display()
    );
}

#[test]
fn scan_then_status_reports_zero_classified() {
    let env = common::TestEnvironment::new();
    env.create_file("a.txt", b"hello", std::time::Duration::from_secs(0));
    env.create_file("sub/b.log", b"world", std::time::Duration::from_secs(0));
    let config_path = write_config(env.root());

    let scan = common::run_cli_case(
        "scan_then_status_scan",
        &[
            "--config",
            config_path.to_str().unwrap(),
            "scan",
            env.root().to_str().unwrap(),
        ],
    );
    assert!(scan.status.success(), "scan failed; log: {}", scan.log_path.display());
    let scan_json: serde_json::Value = serde_json::from_str(scan.stdout.trim()).expect("scan output is JSON");
    assert_eq!(scan_json["files"], 2);

    let status = common::run_cli_case(
        "scan_then_status_status",
        &["--config", config_path.to_str().unwrap(), "status"],
    );
    assert!(status.status.success(), "log: {}", status.log_path.display());
    let status_json: serde_json::Value =
        serde_json::from_str(status.stdout.trim()).expect("status output is JSON");
    assert_eq!(status_json["review_progress"]["classified"], 0);
    assert_eq!(status_json["review_progress"]["pending"], 0);
}

#[test]
fn doctor_reports_unreachable_llm_without_erroring() {
    let env = common::TestEnvironment::new();
    let config_path = write_config(env.root());

    let result = common::run_cli_case(
        "doctor_reports_unreachable_llm",
        &["--config", config_path.to_str().unwrap(), "doctor"],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    let json: serde_json::Value = serde_json::from_str(result.stdout.trim()).expect("doctor output is JSON");
    assert_eq!(json["llm_reachable"], false);
    assert_eq!(json["model_loaded"], false);
}

#[test]
fn decide_on_unknown_path_is_a_user_error() {
    let env = common::TestEnvironment::new();
    let config_path = write_config(env.root());

    let result = common::run_cli_case(
        "decide_on_unknown_path_is_a_user_error",
        &[
            "--config",
            config_path.to_str().unwrap(),
            "decide",
            "/nonexistent/path.txt",
            "APPROVE",
        ],
    );
    assert!(!result.status.success());
    assert_eq!(result.status.code(), Some(1));
}

#[test]
fn plan_on_empty_catalog_is_empty() {
    let env = common::TestEnvironment::new();
    let config_path = write_config(env.root());

    let result = common::run_cli_case(
        "plan_on_empty_catalog_is_empty",
        &["--config", config_path.to_str().unwrap(), "plan"],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    let json: serde_json::Value = serde_json::from_str(result.stdout.trim()).expect("plan output is JSON");
    assert!(json["entries"].as_array().unwrap().is_empty());
}
