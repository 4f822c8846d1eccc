//! Configuration system: TOML file + env var overrides + smart defaults.
//!
//! Everything a site operator may legitimately want to change — catalog
//! location, trash/archive roots, LLM host/model/batch size — lives here.
//! The things the AI must never be able to change (protected paths/owners,
//! Document Guardian extensions, sensitive-filename patterns, confidence
//! thresholds) are NOT part of this struct: they live as compile-time
//! constants in [`crate::safety::config`] and are only ever overridden by
//! tests via an explicit injected value, never by a config file on disk.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{DmError, Result};

/// Full configuration model for the triage engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub llm: LlmConfig,
    pub orchestrator: OrchestratorConfig,
    pub organization: OrganizationRoots,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            llm: LlmConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            organization: OrganizationRoots::default(),
        }
    }
}

/// On-disk locations the engine reads from and writes to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub catalog_db: PathBuf,
    pub trash_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[DM-CONFIG] WARNING: HOME not set, falling back to /var/lib/drivemind-triage"
                );
                PathBuf::from("/var/lib/drivemind-triage")
            },
            PathBuf::from,
        );
        let (cfg, data) = if home_dir == Path::new("/var/lib/drivemind-triage") {
            (
                PathBuf::from("/etc/drivemind-triage/config.toml"),
                home_dir,
            )
        } else {
            (
                home_dir.join(".config/drivemind-triage/config.toml"),
                home_dir.join(".local/share/drivemind-triage"),
            )
        };
        Self {
            config_file: cfg,
            catalog_db: data.join("catalog.sqlite3"),
            trash_dir: data.join("trash"),
            log_dir: data.join("logs"),
        }
    }
}

/// Local LLM endpoint settings. Host is validated loopback-only at load time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub host: String,
    pub model: String,
    pub request_timeout_secs: u64,
    pub availability_timeout_secs: u64,
    pub temperature: f64,
    pub num_predict: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            host: "http://127.0.0.1:11434".to_string(),
            model: "llama3.1:8b".to_string(),
            request_timeout_secs: 120,
            availability_timeout_secs: 5,
            temperature: 0.1,
            num_predict: 4096,
        }
    }
}

/// Classification batching behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub batch_size: usize,
    pub max_consecutive_zero_progress_batches: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_consecutive_zero_progress_batches: 3,
        }
    }
}

/// Destination roots the Execution Engine organizes approved files into.
///
/// Generalizes the original implementation's hardcoded `D:\` structure into
/// an injectable config value so the engine is testable off Windows (see
/// `DESIGN.md`, Open Question 3). The field names match the category keys
/// produced by [`crate::execution::destination::categorize`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OrganizationRoots {
    pub apps: PathBuf,
    pub documents: PathBuf,
    pub media_photos: PathBuf,
    pub media_videos: PathBuf,
    pub media_music: PathBuf,
    pub projects: PathBuf,
    pub archive: PathBuf,
}

impl Default for OrganizationRoots {
    fn default() -> Self {
        Self {
            apps: PathBuf::from(r"D:\Apps"),
            documents: PathBuf::from(r"D:\Documents"),
            media_photos: PathBuf::from(r"D:\Media\Photos"),
            media_videos: PathBuf::from(r"D:\Media\Videos"),
            media_music: PathBuf::from(r"D:\Media\Music"),
            projects: PathBuf::from(r"D:\Projects"),
            archive: PathBuf::from(r"D:\Archive"),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Resolution order for config file path:
    /// 1. Explicit `path` argument (from `--config` CLI flag)
    /// 2. `DMT_CONFIG` environment variable
    /// 3. Default path (`~/.config/drivemind-triage/config.toml`)
    ///
    /// Missing config file is not an error when loading from default path;
    /// defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_config = if path.is_none() {
            env::var_os("DMT_CONFIG").map(PathBuf::from)
        } else {
            None
        };

        let path_buf = path.map_or_else(
            || env_config.clone().unwrap_or_else(Self::default_path),
            Path::to_path_buf,
        );
        let is_explicit_path = path.is_some() || env_config.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| DmError::Io {
                path: path_buf.clone(),
                source,
            })?;
            toml::from_str::<Self>(&raw)?
        } else if is_explicit_path {
            return Err(DmError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(raw) = env_var("DMT_LLM_HOST") {
            self.llm.host = raw;
        }
        if let Some(raw) = env_var("DMT_LLM_MODEL") {
            self.llm.model = raw;
        }
        set_env_usize(
            "DMT_ORCHESTRATOR_BATCH_SIZE",
            &mut self.orchestrator.batch_size,
        )?;
        set_env_u64(
            "DMT_LLM_REQUEST_TIMEOUT_SECS",
            &mut self.llm.request_timeout_secs,
        )?;
        Ok(())
    }

    /// Validate the loaded config, rejecting anything the safety model
    /// cannot tolerate — most importantly, a non-loopback LLM host.
    fn validate(&self) -> Result<()> {
        if !is_loopback_host(&self.llm.host) {
            return Err(DmError::ConfigurationRejection {
                details: format!(
                    "llm.host must resolve to 127.0.0.1 or localhost, got {:?}",
                    self.llm.host
                ),
            });
        }
        if self.orchestrator.batch_size == 0 {
            return Err(DmError::InvalidConfig {
                details: "orchestrator.batch_size must be >= 1".to_string(),
            });
        }
        if self.orchestrator.max_consecutive_zero_progress_batches == 0 {
            return Err(DmError::InvalidConfig {
                details: "orchestrator.max_consecutive_zero_progress_batches must be >= 1"
                    .to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.llm.temperature) {
            return Err(DmError::InvalidConfig {
                details: format!("llm.temperature must be in [0,1], got {}", self.llm.temperature),
            });
        }
        Ok(())
    }

    /// Deterministic hash of the effective config for logging/telemetry.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }
}

/// Whether an LLM host string resolves to the local loopback interface.
///
/// The wire contract (see `SPEC_FULL.md` §6) restricts the classifier to
/// `127.0.0.1:11434`/`localhost:11434` so no file metadata ever leaves the
/// machine. This check is deliberately conservative: anything that doesn't
/// parse as `http://127.0.0.1[:port]` or `http://localhost[:port]` is
/// rejected.
#[must_use]
pub fn is_loopback_host(host: &str) -> bool {
    let without_scheme = host
        .strip_prefix("http://")
        .or_else(|| host.strip_prefix("https://"))
        .unwrap_or(host);
    let host_part = without_scheme.split('/').next().unwrap_or("");
    let hostname = host_part.split(':').next().unwrap_or("");
    hostname == "127.0.0.1" || hostname == "localhost" || hostname == "::1"
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_env_u64(name: &str, slot: &mut u64) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<u64>().map_err(|error| DmError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_usize(name: &str, slot: &mut usize) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw
            .parse::<usize>()
            .map_err(|error| DmError::ConfigParse {
                context: "env",
                details: format!("{name}={raw:?}: {error}"),
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_passes_validation() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn loopback_host_accepted() {
        assert!(is_loopback_host("http://127.0.0.1:11434"));
        assert!(is_loopback_host("http://localhost:11434"));
        assert!(is_loopback_host("127.0.0.1:11434"));
    }

    #[test]
    fn non_loopback_host_rejected() {
        assert!(!is_loopback_host("http://example.com:11434"));
        assert!(!is_loopback_host("http://10.0.0.5:11434"));
    }

    #[test]
    fn validate_rejects_non_loopback_llm_host() {
        let mut cfg = Config::default();
        cfg.llm.host = "http://example.com:11434".to_string();
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.code(), "DM-1004");
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        let mut cfg = Config::default();
        cfg.orchestrator.batch_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_missing_explicit_path_errors() {
        let err = Config::load(Some(Path::new("/nonexistent/drivemind-triage.toml"))).unwrap_err();
        assert_eq!(err.code(), "DM-1002");
    }

    #[test]
    fn stable_hash_is_deterministic() {
        let cfg = Config::default();
        assert_eq!(cfg.stable_hash().unwrap(), cfg.stable_hash().unwrap());
    }
}
