//! End-to-end behavior of the compiler's cache, rewriter and backend pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use flowexpr_core::api::{CompileRequest, CompilerOptions, Error, ExpressionCompiler};
use flowexpr_core::assembly::{Assembly, AssemblySet, BuiltinResolver};
use flowexpr_core::backend::{
    BackendDiagnostic, BackendFactory, BackendRequest, CompilerBackend, HostedBackendFactory,
};
use flowexpr_core::cache::CacheKey;
use flowexpr_core::environment::{ActivityContext, Scope};
use flowexpr_core::syntax::Language;
use flowexpr_core::tree::{RawExpressionTree, RewritePath};
use flowexpr_core::types::{MAX_BUILTIN_ARITY, Type};
use flowexpr_core::values::Value;
use pretty_assertions::assert_eq;

#[derive(Default)]
struct Counts {
    compiles: AtomicUsize,
    disposals: AtomicUsize,
}

struct CountingBackend {
    inner: Box<dyn CompilerBackend>,
    counts: Arc<Counts>,
}

impl CompilerBackend for CountingBackend {
    fn language(&self) -> Language {
        self.inner.language()
    }

    fn compile(
        &mut self,
        request: &BackendRequest<'_>,
    ) -> Result<RawExpressionTree, Vec<BackendDiagnostic>> {
        self.counts.compiles.fetch_add(1, Ordering::SeqCst);
        self.inner.compile(request)
    }

    fn diagnose(&mut self, request: &BackendRequest<'_>) -> Vec<BackendDiagnostic> {
        self.inner.diagnose(request)
    }

    fn dispose(&mut self) {
        self.counts.disposals.fetch_add(1, Ordering::SeqCst);
        self.inner.dispose();
    }
}

struct CountingFactory {
    inner: HostedBackendFactory,
    counts: Arc<Counts>,
}

impl BackendFactory for CountingFactory {
    fn language(&self) -> Language {
        self.inner.language()
    }

    fn create(&self, assemblies: &[Arc<Assembly>]) -> Result<Box<dyn CompilerBackend>, String> {
        Ok(Box::new(CountingBackend {
            inner: self.inner.create(assemblies)?,
            counts: self.counts.clone(),
        }))
    }
}

fn compiler_with(options: CompilerOptions) -> (ExpressionCompiler, Arc<Counts>) {
    let counts = Arc::new(Counts::default());
    let factory = CountingFactory {
        inner: HostedBackendFactory::new(Language::CStyle),
        counts: counts.clone(),
    };
    let mut resolver = BuiltinResolver::new();
    for name in ["extra.a", "extra.b", "extra.c"] {
        resolver = resolver.with_assembly(Assembly::builder(name).build().unwrap());
    }
    let compiler =
        ExpressionCompiler::with_services(options, Arc::new(factory), Arc::new(resolver));
    (compiler, counts)
}

fn compiler() -> (ExpressionCompiler, Arc<Counts>) {
    compiler_with(CompilerOptions::default())
}

fn compiles(counts: &Counts) -> usize {
    counts.compiles.load(Ordering::SeqCst)
}

#[test]
fn test_cache_reuse_across_environments() {
    let (compiler, counts) = compiler();

    let first = Scope::builder().variable("x", Type::Int).build();
    let outer = Scope::builder()
        .variable("y", Type::String)
        .variable("x", Type::Int)
        .build();
    let second = Scope::child(&outer).variable("z", Type::Float).build();

    compiler.compile(&CompileRequest::new("x + 1", first)).unwrap();
    compiler.compile(&CompileRequest::new("x + 1", second)).unwrap();

    assert_eq!(compiles(&counts), 1);
    assert_eq!(compiler.cache().len(), 1);
    assert_eq!(compiler.cache().stats().hits, 1);
}

#[test]
fn test_fast_path_binds_at_a_different_depth() {
    let (compiler, counts) = compiler();
    let original = Scope::builder().variable("x", Type::Int).build();
    compiler
        .compile(&CompileRequest::new("x + 1", original))
        .unwrap();

    let outer = Scope::builder().variable("x", Type::Int).build();
    let inner = Scope::child(&Scope::child(&outer).build()).build();
    let x = outer.find("x").unwrap().clone();
    let callable = compiler.compile(&CompileRequest::new("x + 1", inner)).unwrap();

    let ctx = ActivityContext::new().with(&x, Value::Int(10)).unwrap();
    assert_eq!(callable.invoke(&ctx).unwrap(), Value::Int(11));
    assert_eq!(callable.rewrite_path(), RewritePath::Fast);
    assert_eq!(compiles(&counts), 1);
}

#[test]
fn test_fast_path_abort_recompiles_for_new_type() {
    let (compiler, counts) = compiler();
    let ints = Scope::builder().variable("x", Type::Int).build();
    compiler.compile(&CompileRequest::new("x + 1", ints)).unwrap();

    let strings = Scope::builder().variable("x", Type::String).build();
    let x = strings.find("x").unwrap().clone();
    let callable = compiler
        .compile(&CompileRequest::new("x + 1", strings.clone()))
        .unwrap();
    assert_eq!(compiles(&counts), 2);
    assert_eq!(callable.rewrite_path(), RewritePath::Full);
    assert_eq!(callable.result_type(), &Type::String);

    let ctx = ActivityContext::new().with(&x, Value::str("a")).unwrap();
    assert_eq!(callable.invoke(&ctx).unwrap(), Value::str("a1"));

    // An operator that does not apply to the new type fails cleanly.
    let err = compiler
        .compile(&CompileRequest::new("x * 2", strings))
        .unwrap_err();
    let Error::Compilation { diagnostics, .. } = &err else {
        panic!("expected a compilation error, got {:?}", err);
    };
    assert_eq!(diagnostics[0].code, "E008");
}

#[test]
fn test_ambiguous_identifier_fails_deterministically() {
    let (compiler, _) = compiler();
    let fine = Scope::builder().variable("x", Type::Int).build();
    compiler.compile(&CompileRequest::new("x + 1", fine)).unwrap();

    let ambiguous = Scope::builder()
        .variable("x", Type::Int)
        .variable("x", Type::Int)
        .build();
    for _ in 0..2 {
        let err = compiler
            .compile(&CompileRequest::new("x + 1", ambiguous.clone()))
            .unwrap_err();
        assert_eq!(
            err,
            Error::AmbiguousIdentifier {
                name: "x".to_string(),
                count: 2,
            }
        );
    }
}

#[test]
fn test_pool_evicts_least_recently_used_backend() {
    let (compiler, counts) = compiler_with(CompilerOptions {
        pool_capacity: 2,
        ..CompilerOptions::default()
    });
    let env = Scope::builder().variable("x", Type::Int).build();
    let with_extra = |name: &str| CompileRequest::new("x + 1", env.clone()).assembly(name);
    let extra_a: AssemblySet = ["extra.a"].into_iter().collect();
    let set_a = compiler.options().assemblies.union(&extra_a);
    compiler.compile(&with_extra("extra.a")).unwrap();
    let held = compiler.pool().acquire(&set_a).unwrap();

    compiler.compile(&with_extra("extra.b")).unwrap();
    compiler.compile(&with_extra("extra.c")).unwrap();

    assert_eq!(compiler.pool().len(), 2);
    assert!(held.is_evicted());
    assert_eq!(compiler.pool().stats().evicted, 1);
    assert_eq!(counts.disposals.load(Ordering::SeqCst), 0);

    let namespaces = compiler.options().namespaces.clone();
    let lookup = |name: &str| (name == "y").then_some(Type::Int);
    let request = BackendRequest {
        source: "y * 3",
        namespaces: &namespaces,
        lookup: &lookup,
        target_type: None,
    };
    let tree = held.compile(&request).unwrap();
    assert_eq!(tree.invoke(&[Value::Int(5)]).unwrap(), Value::Int(15));

    drop(held);
    assert_eq!(counts.disposals.load(Ordering::SeqCst), 1);
}

#[test]
fn test_validation_never_fails() {
    let (compiler, counts) = compiler();
    let env = Scope::builder().variable("x", Type::Int).build();

    let records = compiler.validate(&CompileRequest::new("x +", env.clone()));
    assert!(records.iter().any(|r| !r.is_warning));

    let records = compiler.validate(&CompileRequest::new("x + 1", env.clone()));
    assert!(records.iter().all(|r| r.is_warning));

    let records = compiler.validate(&CompileRequest::new("x == null", env.clone()));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].code, "W002");

    let records = compiler.validate(&CompileRequest::new("x", env).assembly("missing"));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].code, "A001");

    // Validation produces no tree.
    assert_eq!(compiles(&counts), 0);
    assert!(compiler.cache().is_empty());
}

#[test]
fn test_validation_reports_ambiguous_identifiers() {
    let (compiler, counts) = compiler();
    let env = Scope::builder()
        .variable("x", Type::Int)
        .variable("x", Type::Int)
        .variable("y", Type::Int)
        .build();
    let request = CompileRequest::new("x + x + y", env);

    let records = compiler.validate(&request);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].code, "E009");
    assert!(records[0].is_error());
    assert!(records[0].message.contains("'x'"), "{}", records[0].message);

    // Compiling the same request fails for the same reason.
    assert!(matches!(
        compiler.compile(&request),
        Err(Error::AmbiguousIdentifier { ref name, count: 2 }) if name == "x"
    ));
    assert_eq!(compiles(&counts), 1);
}

#[test]
fn test_long_operator_chains_are_syntax_errors() {
    let (compiler, counts) = compiler();
    let env = Scope::builder()
        .variable("x", Type::Int)
        .variable("b", Type::Bool)
        .build();

    let sum = vec!["x"; 5000].join(" + ");
    let records = compiler.validate(&CompileRequest::new(sum.as_str(), env.clone()));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].code, "P001");

    let negations = format!("{}b", "!".repeat(300));
    let records = compiler.validate(&CompileRequest::new(negations.as_str(), env.clone()));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].code, "P001");

    let err = compiler
        .compile(&CompileRequest::new(sum.as_str(), env.clone()))
        .unwrap_err();
    assert_eq!(err.diagnostics()[0].code, "P001");

    let deep = vec!["x"; 100].join(" + ");
    let err = compiler
        .compile(&CompileRequest::new(deep.as_str(), env.clone()))
        .unwrap_err();
    assert_eq!(err.diagnostics()[0].code, "P001");
    assert!(err.diagnostics()[0].message.contains("nesting depth"));
    assert_eq!(compiles(&counts), 2);

    let moderate = vec!["x"; 40].join(" + ");
    let x = env.find("x").unwrap().clone();
    let callable = compiler
        .compile(&CompileRequest::new(moderate.as_str(), env))
        .unwrap();
    let ctx = ActivityContext::new().with(&x, Value::Int(3)).unwrap();
    assert_eq!(callable.invoke(&ctx).unwrap(), Value::Int(120));
}

#[test]
fn test_concurrent_compiles_share_cache_and_pool() {
    let (compiler, counts) = compiler_with(CompilerOptions {
        pool_capacity: 2,
        ..CompilerOptions::default()
    });
    let env = Scope::builder().variable("x", Type::Int).build();
    let x = env.find("x").unwrap().clone();
    let extras = [None, Some("extra.a"), Some("extra.b"), Some("extra.c")];

    std::thread::scope(|s| {
        for t in 0..8 {
            let (compiler, env, x, extras) = (&compiler, &env, &x, &extras);
            s.spawn(move || {
                for i in 0..25 {
                    let mut request = CompileRequest::new("x * 2 + 1", env.clone());
                    if let Some(name) = extras[(t + i) % extras.len()] {
                        request = request.assembly(name);
                    }
                    let callable = compiler.compile(&request).unwrap();
                    let value = (t * 100 + i) as i64;
                    let ctx = ActivityContext::new().with(x, Value::Int(value)).unwrap();
                    assert_eq!(callable.invoke(&ctx).unwrap(), Value::Int(value * 2 + 1));
                    assert!(compiler.pool().len() <= 2);
                }
            });
        }
    });

    assert_eq!(compiler.cache().len(), extras.len());
    assert!(compiles(&counts) >= extras.len());
    assert_eq!(compiler.pool().len(), 2);
    let stats = compiler.pool().stats();
    assert_eq!(stats.live, compiler.pool().len() as u64);
    assert_eq!(stats.disposed, counts.disposals.load(Ordering::SeqCst) as u64);
    assert_eq!(stats.created, stats.disposed + 2);
}

#[test]
fn test_arity_beyond_builtin_callables() {
    let (compiler, _) = compiler();
    let count = MAX_BUILTIN_ARITY + 4;
    let names: Vec<String> = (0..count).map(|i| format!("v{}", i)).collect();
    let env = names
        .iter()
        .fold(Scope::builder(), |b, name| b.variable(name, Type::Int))
        .build();
    let source = names.join(" + ");

    let callable = compiler
        .compile(&CompileRequest::new(source.as_str(), env.clone()))
        .unwrap();
    let mut ctx = ActivityContext::new();
    for (i, name) in names.iter().enumerate() {
        ctx.set(env.find(name).unwrap(), Value::Int(i as i64)).unwrap();
    }
    let expected = (0..count as i64).sum::<i64>();
    assert_eq!(callable.invoke(&ctx).unwrap(), Value::Int(expected));
    assert_eq!(callable.locations().len(), count);

    let key = CacheKey::new(
        &source,
        None,
        compiler.options().assemblies.clone(),
        compiler.options().namespaces.clone(),
    );
    let tree = compiler.cache().get(&key).unwrap();
    assert!(callable.signature().is_synthesized());
    assert_eq!(callable.signature().arity(), count + 1);
    assert_eq!(callable.signature().result(), &Type::Int);
    assert_eq!(callable.signature(), &tree.signature);

    let small = compiler
        .compile(&CompileRequest::new("v0 + v1", env))
        .unwrap();
    assert!(!small.signature().is_synthesized());
    assert_eq!(small.signature().params(), &[Type::Object, Type::Int, Type::Int]);
}

#[test]
fn test_fast_path_disabled_always_compiles() {
    let (compiler, counts) = compiler_with(CompilerOptions {
        fast_path: false,
        ..CompilerOptions::default()
    });
    let env = Scope::builder().variable("x", Type::Int).build();
    for _ in 0..3 {
        let callable = compiler
            .compile(&CompileRequest::new("x + 1", env.clone()))
            .unwrap();
        assert_eq!(callable.rewrite_path(), RewritePath::Full);
    }
    assert_eq!(compiles(&counts), 3);
}
