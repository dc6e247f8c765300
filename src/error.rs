//! Error types for the merge engine and its storage collaborators.
//!
//! Only configuration problems and storage failures surface as `Err`.
//! Per-record problems are reported as [`crate::models::Diagnostic`] values.

use thiserror::Error;

/// Rejected merge or source configuration. Raised at construction time.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    OutOfRange { name: &'static str, value: f64 },

    #[error("unknown field name: {0}")]
    UnknownField(String),

    #[error("unknown source tier '{tier}' for source '{source_name}'")]
    UnknownTier { source_name: String, tier: String },

    #[error("field {field} cannot use the {policy} policy (it is a {kind} field)")]
    PolicyKind {
        field: &'static str,
        policy: &'static str,
        kind: &'static str,
    },

    #[error("field {field} is listed under both {first} and {second}")]
    PolicyOverlap {
        field: &'static str,
        first: &'static str,
        second: &'static str,
    },

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Failure while merging a group or handing results to storage.
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("cannot merge an empty equivalence group (key '{0}')")]
    EmptyGroup(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MergeError>;
