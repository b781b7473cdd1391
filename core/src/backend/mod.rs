//! The compiler backend seam.
//!
//! A backend turns source text into a [`RawExpressionTree`] or a list of
//! diagnostics. It never sees an environment: free identifiers are typed
//! through the request's lookup function, which keeps the tree reusable
//! across every environment that agrees on those types.
//!
//! Backends are stateful and not reentrant. The [`BackendPool`] hands out
//! one instance per assembly set and serializes calls on it.
//!
//! [`BackendPool`]: crate::pool::BackendPool

use core::fmt;
use std::sync::Arc;

use crate::assembly::{Assembly, NamespaceSet};
use crate::syntax::{Language, Span};
use crate::tree::RawExpressionTree;
use crate::types::Type;

mod checker;
pub mod codes;
mod hosted;
mod registry;

pub use hosted::{HostedBackend, HostedBackendFactory};

/// Types a free identifier by name; `None` when the name is not visible.
pub type TypeLookup<'a> = &'a (dyn Fn(&str) -> Option<Type> + 'a);

/// One compile or diagnose call.
#[derive(Clone, Copy)]
pub struct BackendRequest<'a> {
    /// The expression text as the user wrote it.
    pub source: &'a str,
    pub namespaces: &'a NamespaceSet,
    pub lookup: TypeLookup<'a>,
    /// Type the result must implicitly convert to; inferred when `None`.
    pub target_type: Option<&'a Type>,
}

impl fmt::Debug for BackendRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRequest")
            .field("source", &self.source)
            .field("namespaces", &self.namespaces)
            .field("target_type", &self.target_type)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A diagnostic as reported by a backend. Spans are byte offsets into the
/// request's source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDiagnostic {
    pub span: Span,
    pub code: &'static str,
    pub message: String,
    pub severity: Severity,
}

impl BackendDiagnostic {
    pub fn error(code: &'static str, message: impl Into<String>, span: Span) -> Self {
        Self {
            span,
            code,
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn warning(code: &'static str, message: impl Into<String>, span: Span) -> Self {
        Self {
            span,
            code,
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// A compiler for one host expression language, loaded with a fixed set of
/// assemblies.
pub trait CompilerBackend: Send {
    fn language(&self) -> Language;

    /// Parses and type-checks `request.source`.
    fn compile(
        &mut self,
        request: &BackendRequest<'_>,
    ) -> Result<RawExpressionTree, Vec<BackendDiagnostic>>;

    /// Runs the same front end as [`compile`](Self::compile) and reports
    /// every error and warning without producing a tree.
    fn diagnose(&mut self, request: &BackendRequest<'_>) -> Vec<BackendDiagnostic>;

    /// Releases the backend's resources. Called once, by the pool, when the
    /// instance has been evicted and no lease references it.
    fn dispose(&mut self);
}

/// Constructs backends. Construction is assumed to be expensive.
pub trait BackendFactory: Send + Sync {
    fn language(&self) -> Language;

    fn create(&self, assemblies: &[Arc<Assembly>]) -> Result<Box<dyn CompilerBackend>, String>;
}
