//! The expression compilation service.

use std::cell::RefCell;
use std::sync::Arc;

use tracing::{debug, trace};

use super::{CompileRequest, CompiledCallable, CompiledLocation, CompilerOptions, Error};
use crate::assembly::{AssemblyResolver, BuiltinResolver};
use crate::backend::{BackendFactory, BackendRequest, HostedBackendFactory, codes};
use crate::cache::{CacheKey, RawTreeCache};
use crate::diagnostics::{self, DiagnosticRecord};
use crate::environment::{self, Environment, Lookup};
use crate::pool::BackendPool;
use crate::rewriter::{rewrite_fast, rewrite_full};
use crate::syntax::{Language, Span};
use crate::tree::{BoundExpression, RawExpressionTree};
use crate::types::Type;

/// Compiles expression text against caller-supplied environments.
///
/// One compiler is meant to be shared by every activity of a process. It
/// owns the raw tree cache and the backend pool, so repeated compiles of the
/// same text reuse earlier work even when they target different
/// environments.
///
/// ```
/// use flowexpr_core::api::{CompileRequest, CompilerOptions, ExpressionCompiler};
/// use flowexpr_core::environment::{ActivityContext, Scope};
/// use flowexpr_core::syntax::Language;
/// use flowexpr_core::types::Type;
/// use flowexpr_core::values::Value;
///
/// let compiler = ExpressionCompiler::new(Language::CStyle, CompilerOptions::default());
/// let env = Scope::builder().variable("x", Type::Int).build();
/// let x = env.find("x").unwrap().clone();
///
/// let callable = compiler.compile(&CompileRequest::new("x * 2", env)).unwrap();
/// let ctx = ActivityContext::new().with(&x, Value::Int(21)).unwrap();
/// assert_eq!(callable.invoke(&ctx).unwrap(), Value::Int(42));
/// ```
pub struct ExpressionCompiler {
    options: CompilerOptions,
    language: Language,
    cache: RawTreeCache,
    pool: BackendPool,
}

impl ExpressionCompiler {
    /// A compiler using the hosted backend for `language` and the built-in
    /// assemblies.
    pub fn new(language: Language, options: CompilerOptions) -> Self {
        Self::with_services(
            options,
            Arc::new(HostedBackendFactory::new(language)),
            Arc::new(BuiltinResolver::new()),
        )
    }

    /// A compiler constructing backends with `factory` and loading
    /// referenced assemblies with `resolver`.
    pub fn with_services(
        options: CompilerOptions,
        factory: Arc<dyn BackendFactory>,
        resolver: Arc<dyn AssemblyResolver>,
    ) -> Self {
        let language = factory.language();
        Self {
            cache: RawTreeCache::new(options.cache_capacity),
            pool: BackendPool::new(options.pool_capacity, factory, resolver),
            language,
            options,
        }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn cache(&self) -> &RawTreeCache {
        &self.cache
    }

    pub fn pool(&self) -> &BackendPool {
        &self.pool
    }

    /// Compiles `request` into a callable bound to its environment.
    pub fn compile(&self, request: &CompileRequest) -> Result<CompiledCallable, Error> {
        let bound = self.bind(request)?;
        Ok(CompiledCallable::new(bound, self.options.eval.clone()))
    }

    /// Compiles `request` into an assignable location.
    ///
    /// The expression is compiled without a target conversion so that it
    /// still denotes storage; a requested target type must then equal the
    /// expression's own type.
    pub fn compile_location(&self, request: &CompileRequest) -> Result<CompiledLocation, Error> {
        let bound = self.bind(&request.untargeted())?;
        let source = request.source();
        if !bound.body.is_assignable() {
            return Err(location_error(
                source,
                codes::NOT_ASSIGNABLE,
                "expression does not denote an assignable location".to_string(),
            ));
        }
        if let Some(target) = request.target() {
            if target != &bound.result_type {
                return Err(location_error(
                    source,
                    codes::TYPE_MISMATCH,
                    format!(
                        "location has type '{}' but '{}' was requested",
                        bound.result_type, target
                    ),
                ));
            }
        }
        let callable = CompiledCallable::new(bound, self.options.eval.clone());
        Ok(CompiledLocation::new(callable))
    }

    /// Reports every error and warning for `request` without producing a
    /// callable. Never fails: problems loading assemblies or constructing a
    /// backend are reported as records too.
    pub fn validate(&self, request: &CompileRequest) -> Vec<DiagnosticRecord> {
        let key = self.key(request);
        let lease = match self.pool.acquire(&key.assemblies) {
            Ok(lease) => lease,
            Err(error) => return vec![failure_record(&error)],
        };
        let env = request.environment();
        let ambiguous: RefCell<Vec<(String, usize)>> = RefCell::new(Vec::new());
        let lookup = |name: &str| match environment::lookup(env, name, self.language) {
            Lookup::Found(location) => Some(location.ty().clone()),
            Lookup::Ambiguous(location, count) => {
                let mut names = ambiguous.borrow_mut();
                if !names.iter().any(|(seen, _)| seen == name) {
                    names.push((name.to_string(), count));
                }
                Some(location.ty().clone())
            }
            Lookup::Unresolved => None,
        };
        let backend_request = BackendRequest {
            source: &key.source,
            namespaces: &key.namespaces,
            lookup: &lookup,
            target_type: key.target_type.as_ref(),
        };
        let diagnostics = lease.diagnose(&backend_request);

        // Binding would reject these, so they lead the backend's records.
        let mut records: Vec<DiagnosticRecord> = ambiguous
            .into_inner()
            .into_iter()
            .map(|(name, count)| {
                let error = Error::AmbiguousIdentifier { name, count };
                let mut record = failure_record(&error);
                record.span = Span::new(0, key.source.len());
                record
            })
            .collect();
        records.extend(diagnostics::records(&diagnostics, &key.source));
        records
    }

    fn key(&self, request: &CompileRequest) -> CacheKey {
        CacheKey::new(
            request.source(),
            request.target().cloned(),
            self.options
                .assemblies
                .union(request.referenced_assemblies()),
            self.options
                .namespaces
                .union(request.imported_namespaces()),
        )
    }

    fn bind(&self, request: &CompileRequest) -> Result<BoundExpression, Error> {
        let key = self.key(request);
        let env = request.environment();

        if self.options.fast_path {
            if let Some(tree) = self.cache.get(&key) {
                if let Some(bound) = rewrite_fast(&tree, env)? {
                    trace!(source = %key.source, "rebound cached tree");
                    return Ok(bound);
                }
                debug!(source = %key.source, "cached tree does not fit the environment; recompiling");
            }
        }

        let tree = Arc::new(self.compile_raw(&key, env)?);
        self.cache.put(key, tree.clone());
        rewrite_full(&tree, env)
    }

    fn compile_raw(
        &self,
        key: &CacheKey,
        env: &dyn Environment,
    ) -> Result<RawExpressionTree, Error> {
        let lease = self.pool.acquire(&key.assemblies)?;
        let lookup = |name: &str| lookup_type(env, name, self.language);
        let request = BackendRequest {
            source: &key.source,
            namespaces: &key.namespaces,
            lookup: &lookup,
            target_type: key.target_type.as_ref(),
        };
        let tree = lease.compile(&request).map_err(|diagnostics| {
            debug!(source = %key.source, count = diagnostics.len(), "compilation failed");
            Error::Compilation {
                source_text: key.source.to_string(),
                diagnostics: diagnostics::records(&diagnostics, &key.source),
            }
        })?;
        debug!(
            source = %key.source,
            free_identifiers = tree.free_identifiers.len(),
            result = %tree.result_type,
            "compiled expression"
        );
        Ok(tree)
    }
}

impl core::fmt::Debug for ExpressionCompiler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExpressionCompiler")
            .field("language", &self.language)
            .field("options", &self.options)
            .field("cache", &self.cache)
            .field("pool", &self.pool)
            .finish()
    }
}

/// The type the backend checks a free identifier against. An ambiguous name
/// still types as its first declaration; binding reports the ambiguity.
fn lookup_type(env: &dyn Environment, name: &str, language: Language) -> Option<Type> {
    match environment::lookup(env, name, language) {
        Lookup::Found(location) | Lookup::Ambiguous(location, _) => Some(location.ty().clone()),
        Lookup::Unresolved => None,
    }
}

fn location_error(source: &str, code: &str, message: String) -> Error {
    let mut record = DiagnosticRecord::general(code, message);
    record.span = Span::new(0, source.len());
    Error::Compilation {
        source_text: source.to_string(),
        diagnostics: vec![record],
    }
}

fn failure_record(error: &Error) -> DiagnosticRecord {
    let code = match error {
        Error::AssemblyLoad { .. } => codes::ASSEMBLY_LOAD,
        Error::BackendConstruction(_) => codes::BACKEND_CONSTRUCTION,
        Error::AmbiguousIdentifier { .. } => codes::AMBIGUOUS_IDENTIFIER,
        _ => codes::INTERNAL,
    };
    DiagnosticRecord::general(code, error.to_string())
}
