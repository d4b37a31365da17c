// src/error.rs

use crate::models::Bucket;
use serde::Serialize;
use thiserror::Error;

/// Fatal errors surfaced by the engine and its storage adapters.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid attempt record: {0}")]
    InvalidAttempt(String),

    #[error("Store lock poisoned: {0}")]
    StorePoisoned(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Non-fatal conditions attached to an assembled exam.
///
/// The host decides whether a result carrying warnings is usable.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssemblyWarning {
    #[error("{bucket} bucket holds {actual} of {expected} questions")]
    StructuralShortfall {
        bucket: Bucket,
        expected: usize,
        actual: usize,
    },

    #[error("No question available for mandatory theme '{tag}'")]
    ThemeGap { tag: String },

    #[error("{count} questions were drawn despite recent exposure")]
    ExposureRelaxed { count: usize },
}

impl AssemblyWarning {
    pub fn is_shortfall(&self) -> bool {
        matches!(self, AssemblyWarning::StructuralShortfall { .. })
    }
}
