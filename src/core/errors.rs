//! DM-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, DmError>;

/// Top-level error type for the triage engine.
///
/// Variants map onto the six semantic error kinds of the triage design:
/// transport, parse, integrity, missing-source, storage, and configuration
/// failures. Each carries a stable `DM-xxxx` code so callers (and the CLI's
/// `--json` output) can branch on failure kind without string matching.
#[derive(Debug, Error)]
pub enum DmError {
    #[error("[DM-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[DM-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[DM-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[DM-1004] configuration rejected: {details}")]
    ConfigurationRejection { details: String },

    #[error("[DM-2001] transport failure talking to {endpoint}: {details}")]
    TransportFailure { endpoint: String, details: String },

    #[error("[DM-2002] response parse failure in {context}: {details}")]
    ParseFailure {
        context: &'static str,
        details: String,
    },

    #[error("[DM-2003] integrity check failed for {path}: {details}")]
    IntegrityFailure { path: PathBuf, details: String },

    #[error("[DM-2004] source missing for {path}")]
    MissingSource { path: PathBuf },

    #[error("[DM-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[DM-2102] SQL failure in {context}: {details}")]
    Sql {
        context: &'static str,
        details: String,
    },

    #[error("[DM-3001] permission denied for {path}")]
    PermissionDenied { path: PathBuf },

    #[error("[DM-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[DM-3003] storage failure for {path}: {details}")]
    StorageFailure { path: PathBuf, details: String },

    #[error("[DM-3004] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[DM-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl DmError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "DM-1001",
            Self::MissingConfig { .. } => "DM-1002",
            Self::ConfigParse { .. } => "DM-1003",
            Self::ConfigurationRejection { .. } => "DM-1004",
            Self::TransportFailure { .. } => "DM-2001",
            Self::ParseFailure { .. } => "DM-2002",
            Self::IntegrityFailure { .. } => "DM-2003",
            Self::MissingSource { .. } => "DM-2004",
            Self::Serialization { .. } => "DM-2101",
            Self::Sql { .. } => "DM-2102",
            Self::PermissionDenied { .. } => "DM-3001",
            Self::Io { .. } => "DM-3002",
            Self::StorageFailure { .. } => "DM-3003",
            Self::ChannelClosed { .. } => "DM-3004",
            Self::Runtime { .. } => "DM-3900",
        }
    }

    /// Whether retrying the same operation might succeed.
    ///
    /// Transport and storage hiccups are retryable; configuration and
    /// integrity failures are not — they need a human to intervene.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::ChannelClosed { .. }
                | Self::TransportFailure { .. }
                | Self::Sql { .. }
                | Self::StorageFailure { .. }
                | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for DmError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for DmError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for DmError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<reqwest::Error> for DmError {
    fn from(value: reqwest::Error) -> Self {
        Self::TransportFailure {
            endpoint: value
                .url()
                .map(std::string::ToString::to_string)
                .unwrap_or_default(),
            details: value.to_string(),
        }
    }
}

impl From<zip::result::ZipError> for DmError {
    fn from(value: zip::result::ZipError) -> Self {
        Self::StorageFailure {
            path: PathBuf::new(),
            details: value.to_string(),
        }
    }
}
