//! Error model shared by every snapvault crate.

use std::io;
use thiserror::Error;

/// Convenience alias used across the workspace.
pub type SnapvaultResult<T> = Result<T, SnapvaultError>;

#[derive(Debug, Error)]
pub enum SnapvaultError {
    #[error("invalid property name: {0}")]
    InvalidProperty(String),

    #[error("readonly property: {0}")]
    ReadonlyProperty(String),

    #[error("unknown value for property {property}: {value}")]
    InvalidPropertyValue { property: String, value: String },

    #[error("pool does not exist: {pool}: {reason}")]
    PoolNotFound { pool: String, reason: String },

    #[error("error importing pool {pool}: {reason}")]
    ImportFailed { pool: String, reason: String },

    #[error("error exporting pool {pool}: {reason}")]
    ExportFailed { pool: String, reason: String },

    #[error("attempt to create existing filesystem: {0}")]
    FilesystemExists(String),

    #[error("filesystem not found in pool {pool}: {name}")]
    FilesystemNotFound { pool: String, name: String },

    #[error("snapshot already exists: {0}")]
    SnapshotExists(String),

    #[error("no such snapshot: {0}")]
    SnapshotNotFound(String),

    #[error("filter date `{value}` does not match format `{format}`")]
    InvalidDateFormat { value: String, format: String },

    #[error("invalid date range: start {start} is after stop {stop}")]
    InvalidDateRange { start: String, stop: String },

    #[error("error parsing snapshot listing entry `{0}`")]
    CatalogParseError(String),

    #[error("command `{}` exited with code {status}{}", .argv.join(" "), render_stderr(.stderr))]
    CommandExecutionFailed {
        argv: Vec<String>,
        status: i32,
        stderr: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SnapvaultError {
    /// Short diagnostic used when a command failure is folded into a domain error.
    pub fn diagnostic(&self) -> String {
        match self {
            SnapvaultError::CommandExecutionFailed { stderr, status, .. } => {
                let trimmed = stderr.trim();
                if trimmed.is_empty() {
                    format!("exit code {status}")
                } else {
                    format!("{trimmed} (exit code {status})")
                }
            }
            other => other.to_string(),
        }
    }
}

fn render_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

impl From<toml::de::Error> for SnapvaultError {
    fn from(err: toml::de::Error) -> Self {
        SnapvaultError::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for SnapvaultError {
    fn from(err: toml::ser::Error) -> Self {
        SnapvaultError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for SnapvaultError {
    fn from(err: serde_yaml::Error) -> Self {
        SnapvaultError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for SnapvaultError {
    fn from(err: serde_json::Error) -> Self {
        SnapvaultError::Serialization(err.to_string())
    }
}
