//! Crate-wide error handling.
//!
//! Each module owns its error enum; this module aggregates them into a single
//! `DriftError` so callers can hold one error type across the whole pipeline.
//! Recoverable per-file and per-declaration conditions are *not* errors: they
//! surface as [`crate::diagnostics::Diagnostic`] values attached to results.

use thiserror::Error;

/// Main error type encompassing all fatal failures in the comparison core.
#[derive(Debug, Error)]
pub enum DriftError {
    #[error("Parse error: {0}")]
    Parse(#[from] crate::parser::ParseError),

    #[error("JSON access error: {0}")]
    Tree(#[from] crate::tree::TreeError),

    #[error("Settings error: {0}")]
    Settings(#[from] crate::settings::SettingsError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for drift detection operations
pub type DriftResult<T> = Result<T, DriftError>;
