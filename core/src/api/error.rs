//! Public error type for compile operations.
//!
//! Evaluation failures are reported separately as
//! [`EvalError`](crate::eval::EvalError).

use thiserror::Error;

use crate::assembly::AssemblyError;
use crate::diagnostics::DiagnosticRecord;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The backend rejected the expression. Holds every error and warning it
    /// reported, errors first.
    #[error("compilation failed with {} error(s)", error_count(.diagnostics))]
    Compilation {
        source_text: String,
        diagnostics: Vec<DiagnosticRecord>,
    },

    /// The innermost frame declaring a free identifier declares it more than
    /// once.
    #[error("identifier '{name}' is ambiguous: {count} locations share the name in one scope")]
    AmbiguousIdentifier { name: String, count: usize },

    #[error("failed to load assembly '{name}': {reason}")]
    AssemblyLoad { name: String, reason: String },

    #[error("failed to construct compiler backend: {0}")]
    BackendConstruction(String),

    /// A broken invariant between the backend, cache and rewriter.
    #[error("internal error: {0}")]
    Internal(String),
}

fn error_count(diagnostics: &[DiagnosticRecord]) -> usize {
    diagnostics.iter().filter(|d| !d.is_warning).count()
}

impl Error {
    /// Diagnostics of a compilation failure; empty for other errors.
    pub fn diagnostics(&self) -> &[DiagnosticRecord] {
        match self {
            Error::Compilation { diagnostics, .. } => diagnostics,
            _ => &[],
        }
    }

    /// Source text a compilation failure refers to.
    pub fn source_text(&self) -> Option<&str> {
        match self {
            Error::Compilation { source_text, .. } => Some(source_text),
            _ => None,
        }
    }
}

impl From<AssemblyError> for Error {
    fn from(error: AssemblyError) -> Self {
        let name = match &error {
            AssemblyError::NotFound(name) | AssemblyError::Invalid { name, .. } => name.clone(),
        };
        Error::AssemblyLoad {
            name,
            reason: error.to_string(),
        }
    }
}
