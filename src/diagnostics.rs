//! Structured diagnostics returned alongside results.
//!
//! Parsing and comparison never fail on recoverable conditions; instead every
//! entry point returns its result together with a list of diagnostics. Nothing
//! in this crate accumulates diagnostics in shared mutable fields, so one
//! pipeline value can serve concurrent comparison runs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How severe a diagnostic is. Errors mean a record was skipped; warnings mean
/// a record was produced with degraded fidelity (e.g. an unresolved reference).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// A single diagnostic emitted while parsing, resolving, or comparing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Where the condition was observed: a file path, declaration name, or
    /// policy identifier.
    pub origin: String,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            origin: origin.into(),
            message: message.into(),
        }
    }

    pub fn error(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            origin: origin.into(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}: {}: {}", level, self.origin, self.message)
    }
}
