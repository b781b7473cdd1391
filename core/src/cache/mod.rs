//! Process-wide cache of backend output.
//!
//! Entries are keyed by everything that determines what the backend
//! produces, and nothing about the environment: a cached tree is rebound to
//! each caller's environment by the rewriter's fast path.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::assembly::{AssemblySet, NamespaceSet};
use crate::tree::RawExpressionTree;
use crate::types::Type;

/// Identity of a compile, independent of the environment it targets.
///
/// Equal keys hash equally regardless of the order in which their sets were
/// built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source: Arc<str>,
    pub target_type: Option<Type>,
    pub assemblies: AssemblySet,
    pub namespaces: NamespaceSet,
}

impl CacheKey {
    pub fn new(
        source: &str,
        target_type: Option<Type>,
        assemblies: AssemblySet,
        namespaces: NamespaceSet,
    ) -> Self {
        Self {
            source: Arc::from(source),
            target_type,
            assemblies,
            namespaces,
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    tree: Arc<RawExpressionTree>,
    last_used: AtomicU64,
}

/// Hit and miss counts since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Bounded concurrent map from [`CacheKey`] to raw trees.
///
/// Recency is approximate: every access stamps the entry with a logical
/// tick, and a put that overflows the capacity evicts the entries with the
/// oldest stamps. Concurrent puts may briefly leave the map above capacity.
/// A capacity of zero disables caching.
#[derive(Debug)]
pub struct RawTreeCache {
    entries: DashMap<CacheKey, CacheEntry>,
    capacity: usize,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RawTreeCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<RawExpressionTree>> {
        match self.entries.get(key) {
            Some(entry) => {
                entry.last_used.store(self.tick(), Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(source = %key.source, "raw tree cache hit");
                Some(entry.tree.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(source = %key.source, "raw tree cache miss");
                None
            }
        }
    }

    /// Inserts or replaces the tree for `key`; the last writer wins.
    pub fn put(&self, key: CacheKey, tree: Arc<RawExpressionTree>) {
        if self.capacity == 0 {
            return;
        }
        let entry = CacheEntry {
            tree,
            last_used: AtomicU64::new(self.tick()),
        };
        self.entries.insert(key, entry);
        if self.entries.len() > self.capacity {
            self.evict();
        }
    }

    /// Evicts the least recently stamped entries down to capacity. An entry
    /// touched after the scan keeps its place.
    fn evict(&self) {
        let mut stamps: Vec<(CacheKey, u64)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().last_used.load(Ordering::Relaxed)))
            .collect();
        let excess = stamps.len().saturating_sub(self.capacity);
        if excess == 0 {
            return;
        }
        stamps.sort_unstable_by_key(|(_, stamp)| *stamp);
        let mut evicted = 0;
        for (key, stamp) in stamps.into_iter().take(excess) {
            let removed = self
                .entries
                .remove_if(&key, |_, e| e.last_used.load(Ordering::Relaxed) == stamp);
            if removed.is_some() {
                evicted += 1;
            }
        }
        debug!(evicted, len = self.entries.len(), "evicted raw trees");
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{Language, Span};
    use crate::tree::Expr;
    use crate::values::Value;
    use pretty_assertions::assert_eq;

    fn key(source: &str) -> CacheKey {
        CacheKey::new(
            source,
            None,
            ["std"].into_iter().collect(),
            ["Std"].into_iter().collect(),
        )
    }

    fn tree(value: i64) -> Arc<RawExpressionTree> {
        let body = Expr::constant(Value::Int(value), Type::Int, Span::default());
        Arc::new(RawExpressionTree::new(body, Vec::new(), Language::CStyle, 0))
    }

    #[test]
    fn test_key_ignores_set_order() {
        let a = CacheKey::new(
            "x",
            Some(Type::Int),
            ["std", "std.collections"].into_iter().collect(),
            ["B", "A"].into_iter().collect(),
        );
        let b = CacheKey::new(
            "x",
            Some(Type::Int),
            ["std.collections", "std"].into_iter().collect(),
            ["A", "B"].into_iter().collect(),
        );
        assert_eq!(a, b);

        let cache = RawTreeCache::new(4);
        cache.put(a, tree(1));
        assert!(cache.get(&b).is_some());
    }

    #[test]
    fn test_target_type_is_part_of_key() {
        let cache = RawTreeCache::new(4);
        cache.put(key("x"), tree(1));
        let mut typed = key("x");
        typed.target_type = Some(Type::Float);
        assert!(cache.get(&typed).is_none());
        assert_eq!(cache.stats(), CacheStats { hits: 0, misses: 1 });
    }

    #[test]
    fn test_last_writer_wins() {
        let cache = RawTreeCache::new(4);
        cache.put(key("x"), tree(1));
        cache.put(key("x"), tree(2));
        let found = cache.get(&key("x")).unwrap();
        assert_eq!(found.invoke(&[]).unwrap(), Value::Int(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = RawTreeCache::new(2);
        cache.put(key("a"), tree(1));
        cache.put(key("b"), tree(2));
        assert!(cache.get(&key("a")).is_some());
        cache.put(key("c"), tree(3));

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&key("a")));
        assert!(!cache.contains(&key("b")));
        assert!(cache.contains(&key("c")));
    }

    #[test]
    fn test_zero_capacity_disables_caching() {
        let cache = RawTreeCache::new(0);
        cache.put(key("a"), tree(1));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(RawTreeCache::new(64));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let k = key(&format!("e{}", (i + t) % 80));
                        if cache.get(&k).is_none() {
                            cache.put(k, tree(i));
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= 64 + 4);
        cache.clear();
        assert!(cache.is_empty());
    }
}
