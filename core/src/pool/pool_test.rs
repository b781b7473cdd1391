use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pretty_assertions::assert_eq;

use super::*;
use crate::assembly::{Assembly, BuiltinResolver, NamespaceSet};
use crate::backend::HostedBackendFactory;
use crate::syntax::Language;
use crate::types::Type;
use crate::values::Value;

/// Wraps the hosted backend and records disposals.
struct Tracked {
    inner: Box<dyn CompilerBackend>,
    disposed: Arc<AtomicUsize>,
}

impl CompilerBackend for Tracked {
    fn language(&self) -> Language {
        self.inner.language()
    }

    fn compile(
        &mut self,
        request: &BackendRequest<'_>,
    ) -> Result<RawExpressionTree, Vec<BackendDiagnostic>> {
        self.inner.compile(request)
    }

    fn diagnose(&mut self, request: &BackendRequest<'_>) -> Vec<BackendDiagnostic> {
        self.inner.diagnose(request)
    }

    fn dispose(&mut self) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
        self.inner.dispose();
    }
}

#[derive(Default)]
struct TrackingFactory {
    created: AtomicUsize,
    disposed: Arc<AtomicUsize>,
    fail: bool,
}

impl BackendFactory for TrackingFactory {
    fn language(&self) -> Language {
        Language::CStyle
    }

    fn create(
        &self,
        assemblies: &[Arc<Assembly>],
    ) -> Result<Box<dyn CompilerBackend>, String> {
        if self.fail {
            return Err("backend host unavailable".to_string());
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        let inner = HostedBackendFactory::new(Language::CStyle).create(assemblies)?;
        Ok(Box::new(Tracked {
            inner,
            disposed: self.disposed.clone(),
        }))
    }
}

fn resolver() -> Arc<dyn AssemblyResolver> {
    let mut resolver = BuiltinResolver::new();
    for name in ["a", "b", "c"] {
        resolver = resolver.with_assembly(Assembly::builder(name).build().unwrap());
    }
    Arc::new(resolver)
}

fn pool(capacity: usize) -> (BackendPool, Arc<TrackingFactory>) {
    let factory = Arc::new(TrackingFactory::default());
    let pool = BackendPool::new(capacity, factory.clone(), resolver());
    (pool, factory)
}

fn set(names: &[&str]) -> AssemblySet {
    names.iter().copied().collect()
}

fn compile_one_plus(lease: &BackendLease, x: i64) -> Value {
    let namespaces = NamespaceSet::new();
    let lookup = |name: &str| (name == "x").then_some(Type::Int);
    let request = BackendRequest {
        source: "x + 1",
        namespaces: &namespaces,
        lookup: &lookup,
        target_type: None,
    };
    let tree = lease.compile(&request).unwrap();
    tree.invoke(&[Value::Int(x)]).unwrap()
}

#[test]
fn test_reuses_backend_for_equal_sets() {
    let (pool, factory) = pool(4);
    drop(pool.acquire(&set(&["std", "a"])).unwrap());
    drop(pool.acquire(&set(&["a", "std"])).unwrap());
    assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    assert_eq!(pool.len(), 1);
}

#[test]
fn test_lease_counts_references() {
    let (pool, _) = pool(4);
    let first = pool.acquire(&set(&["a"])).unwrap();
    let second = pool.acquire(&set(&["a"])).unwrap();
    assert_eq!(first.ref_count(), 2);
    drop(second);
    assert_eq!(first.ref_count(), 1);
    assert_eq!(first.assemblies(), &set(&["a"]));
}

#[test]
fn test_evicts_least_recently_used() {
    crate::test_utils::init_test_logging();
    let (pool, factory) = pool(2);
    drop(pool.acquire(&set(&["a"])).unwrap());
    drop(pool.acquire(&set(&["b"])).unwrap());
    drop(pool.acquire(&set(&["a"])).unwrap());
    drop(pool.acquire(&set(&["c"])).unwrap());

    assert!(pool.contains(&set(&["a"])));
    assert!(!pool.contains(&set(&["b"])));
    assert!(pool.contains(&set(&["c"])));
    assert_eq!(factory.disposed.load(Ordering::SeqCst), 1);
    assert_eq!(
        pool.stats(),
        PoolStats {
            created: 3,
            evicted: 1,
            disposed: 1,
            live: 2,
        }
    );
}

#[test]
fn test_evicted_backend_outlives_its_lease() {
    let (pool, factory) = pool(1);
    let held = pool.acquire(&set(&["std", "a"])).unwrap();
    drop(pool.acquire(&set(&["std", "b"])).unwrap());

    assert!(held.is_evicted());
    assert_eq!(factory.disposed.load(Ordering::SeqCst), 0);
    assert_eq!(compile_one_plus(&held, 41), Value::Int(42));

    drop(held);
    assert_eq!(factory.disposed.load(Ordering::SeqCst), 1);
    assert_eq!(pool.stats().live, 1);
}

#[test]
fn test_failed_assembly_load_is_not_pooled() {
    let (pool, factory) = pool(2);
    let err = pool.acquire(&set(&["missing"])).unwrap_err();
    assert!(matches!(err, Error::AssemblyLoad { ref name, .. } if name == "missing"));
    assert!(pool.is_empty());
    assert_eq!(factory.created.load(Ordering::SeqCst), 0);
}

#[test]
fn test_failed_construction_is_not_pooled() {
    let factory = Arc::new(TrackingFactory {
        fail: true,
        ..TrackingFactory::default()
    });
    let pool = BackendPool::new(2, factory, resolver());
    let err = pool.acquire(&set(&["a"])).unwrap_err();
    assert_eq!(
        err,
        Error::BackendConstruction("backend host unavailable".to_string())
    );
    assert!(pool.is_empty());
}

#[test]
fn test_zero_capacity_disposes_on_release() {
    let (pool, factory) = pool(0);
    let lease = pool.acquire(&set(&["std"])).unwrap();
    assert_eq!(compile_one_plus(&lease, 1), Value::Int(2));
    drop(lease);
    assert!(pool.is_empty());
    assert_eq!(factory.disposed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_acquire_shares_one_entry() {
    let (pool, factory) = pool(4);
    let pool = Arc::new(pool);
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let pool = pool.clone();
            std::thread::spawn(move || {
                let lease = pool.acquire(&set(&["std"])).unwrap();
                compile_one_plus(&lease, i)
            })
        })
        .collect();
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap(), Value::Int(i as i64 + 1));
    }
    assert_eq!(pool.len(), 1);
    // Losers of a construction race are disposed unused.
    let created = factory.created.load(Ordering::SeqCst);
    assert_eq!(factory.disposed.load(Ordering::SeqCst), created - 1);
}
