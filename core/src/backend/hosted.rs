//! The in-process backend: the pest front ends plus the type checker.

use std::sync::Arc;

use tracing::{debug, trace};

use super::checker::Checker;
use super::registry::TypeRegistry;
use super::{BackendDiagnostic, BackendFactory, BackendRequest, CompilerBackend, codes};
use crate::assembly::Assembly;
use crate::syntax::{Language, Span};
use crate::tree::{Expr, ParamDecl, RawExpressionTree};

/// Builds [`HostedBackend`]s for one language.
#[derive(Debug, Clone, Copy)]
pub struct HostedBackendFactory {
    language: Language,
}

impl HostedBackendFactory {
    pub fn new(language: Language) -> Self {
        Self { language }
    }
}

impl BackendFactory for HostedBackendFactory {
    fn language(&self) -> Language {
        self.language
    }

    fn create(&self, assemblies: &[Arc<Assembly>]) -> Result<Box<dyn CompilerBackend>, String> {
        Ok(Box::new(HostedBackend::new(self.language, assemblies)))
    }
}

/// Output of one front-end run.
struct FrontEnd {
    result: Result<Expr, BackendDiagnostic>,
    free: Vec<ParamDecl>,
    local_count: u32,
    warnings: Vec<BackendDiagnostic>,
}

/// Compiles expressions of one language against a fixed set of assemblies.
///
/// The source is parsed as `(` + text + `\n)` so the text cannot end the
/// expression early and a trailing line comment cannot swallow the closing
/// parenthesis. Reported spans are shifted back onto the caller's text.
#[derive(Debug)]
pub struct HostedBackend {
    language: Language,
    registry: TypeRegistry,
    /// Reused buffer for the wrapped source.
    unit: String,
    compiled: u64,
    disposed: bool,
}

impl HostedBackend {
    pub fn new(language: Language, assemblies: &[Arc<Assembly>]) -> Self {
        debug!(
            %language,
            assemblies = assemblies.len(),
            "constructing hosted backend"
        );
        Self {
            language,
            registry: TypeRegistry::new(language, assemblies),
            unit: String::new(),
            compiled: 0,
            disposed: false,
        }
    }

    /// Number of successful compiles served.
    pub fn compiled(&self) -> u64 {
        self.compiled
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn front_end(&mut self, request: &BackendRequest<'_>) -> FrontEnd {
        self.unit.clear();
        self.unit.push('(');
        self.unit.push_str(request.source);
        self.unit.push_str("\n)");
        let source_len = request.source.len();

        let node = match self.language.parse(&self.unit) {
            Ok(node) => node,
            Err(e) => {
                return FrontEnd {
                    result: Err(BackendDiagnostic::error(
                        codes::SYNTAX,
                        e.message,
                        to_source_span(e.span, source_len),
                    )),
                    free: Vec::new(),
                    local_count: 0,
                    warnings: Vec::new(),
                };
            }
        };
        trace!(?node, "parsed");

        let mut checker = Checker::new(
            self.language,
            &self.registry,
            request.namespaces,
            request.lookup,
        );
        let result = checker
            .check(&node, request.target_type)
            .map_err(|mut d| {
                d.span = to_source_span(d.span, source_len);
                d
            });
        let (free, local_count, mut warnings) = checker.finish();
        for warning in &mut warnings {
            warning.span = to_source_span(warning.span, source_len);
        }
        FrontEnd {
            result,
            free,
            local_count,
            warnings,
        }
    }

    fn disposed_error() -> BackendDiagnostic {
        BackendDiagnostic::error(
            codes::INTERNAL,
            "the compiler backend has been disposed",
            Span::default(),
        )
    }
}

/// Maps a span in the wrapped unit back onto the caller's text.
fn to_source_span(span: Span, source_len: usize) -> Span {
    let map = |offset: usize| offset.saturating_sub(1).min(source_len);
    Span::new(map(span.start), map(span.end))
}

impl CompilerBackend for HostedBackend {
    fn language(&self) -> Language {
        self.language
    }

    fn compile(
        &mut self,
        request: &BackendRequest<'_>,
    ) -> Result<RawExpressionTree, Vec<BackendDiagnostic>> {
        if self.disposed {
            return Err(vec![Self::disposed_error()]);
        }
        let FrontEnd {
            result,
            free,
            local_count,
            warnings,
        } = self.front_end(request);
        match result {
            Ok(body) => {
                self.compiled += 1;
                debug!(
                    source = request.source,
                    free_identifiers = free.len(),
                    result_type = %body.ty,
                    "compiled expression"
                );
                Ok(RawExpressionTree::new(body, free, self.language, local_count))
            }
            Err(error) => {
                let mut diagnostics = vec![error];
                diagnostics.extend(warnings);
                Err(diagnostics)
            }
        }
    }

    fn diagnose(&mut self, request: &BackendRequest<'_>) -> Vec<BackendDiagnostic> {
        if self.disposed {
            return vec![Self::disposed_error()];
        }
        let front = self.front_end(request);
        let mut diagnostics = Vec::with_capacity(front.warnings.len() + 1);
        if let Err(error) = front.result {
            diagnostics.push(error);
        }
        diagnostics.extend(front.warnings);
        diagnostics.sort_by_key(|d| (d.span.start, d.span.end));
        diagnostics
    }

    fn dispose(&mut self) {
        if !self.disposed {
            debug!(language = %self.language, compiled = self.compiled, "disposing hosted backend");
            self.disposed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_mapping_clamps_to_source() {
        // "(" + "a +" + "\n)": the error at the closing paren maps to the end.
        assert_eq!(to_source_span(Span::new(5, 6), 3), Span::new(3, 3));
        assert_eq!(to_source_span(Span::new(1, 2), 3), Span::new(0, 1));
        assert_eq!(to_source_span(Span::new(0, 1), 3), Span::new(0, 0));
    }
}
