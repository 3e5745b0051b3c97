//! RSW-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, RswError>;

/// Top-level error type for the retention sweeper.
#[derive(Debug, Error)]
pub enum RswError {
    #[error("[RSW-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[RSW-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[RSW-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[RSW-1101] invalid job '{job_id}': {details}")]
    InvalidJob { job_id: String, details: String },

    #[error("[RSW-1102] invalid glob pattern '{pattern}': {details}")]
    InvalidPattern { pattern: String, details: String },

    #[error("[RSW-2001] safety veto for {path}: {reason}")]
    SafetyVeto { path: PathBuf, reason: String },

    #[error("[RSW-2101] SQL failure in {context}: {details}")]
    Sql {
        context: &'static str,
        details: String,
    },

    #[error("[RSW-2102] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[RSW-3001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[RSW-3002] permission denied for {path}")]
    PermissionDenied { path: PathBuf },

    #[error("[RSW-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl RswError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "RSW-1001",
            Self::MissingConfig { .. } => "RSW-1002",
            Self::ConfigParse { .. } => "RSW-1003",
            Self::InvalidJob { .. } => "RSW-1101",
            Self::InvalidPattern { .. } => "RSW-1102",
            Self::SafetyVeto { .. } => "RSW-2001",
            Self::Sql { .. } => "RSW-2101",
            Self::Serialization { .. } => "RSW-2102",
            Self::Io { .. } => "RSW-3001",
            Self::PermissionDenied { .. } => "RSW-3002",
            Self::Runtime { .. } => "RSW-3900",
        }
    }

    /// Whether a later run might resolve the failure without operator action.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Sql { .. } | Self::Runtime { .. }
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

impl From<rusqlite::Error> for RswError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for RswError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for RswError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
