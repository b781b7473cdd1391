//! Bounded pool of compiler backends, one per referenced-assembly set.
//!
//! Backends are expensive to construct, so they are reused across compiles
//! that reference the same assemblies. Callers hold a [`BackendLease`] while
//! they use one. When the pool is full, acquiring a backend for an unseen
//! set evicts the least recently used entry; an evicted backend stays usable
//! by outstanding leases and is disposed when the last one is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use hashbrown::HashMap;
use tracing::{debug, trace, warn};

use crate::api::Error;
use crate::assembly::{AssemblyResolver, AssemblySet};
use crate::backend::{
    BackendDiagnostic, BackendFactory, BackendRequest, CompilerBackend,
};
use crate::tree::RawExpressionTree;
use crate::values::lock;

#[cfg(test)]
mod pool_test;

#[derive(Debug, Default)]
struct Counters {
    created: AtomicU64,
    evicted: AtomicU64,
    disposed: AtomicU64,
}

/// Lifetime counts of pooled backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub created: u64,
    pub evicted: u64,
    pub disposed: u64,
    /// Constructed and not yet disposed, including evicted backends still
    /// held by a lease.
    pub live: u64,
}

#[derive(Debug)]
struct EntryState {
    refs: usize,
    last_used: u64,
    evicted: bool,
    disposed: bool,
}

/// One backend instance with its reference count and eviction state.
struct PooledBackend {
    key: AssemblySet,
    /// Held only for the duration of one compile or diagnose call.
    backend: Mutex<Box<dyn CompilerBackend>>,
    state: Mutex<EntryState>,
    counters: Arc<Counters>,
}

impl PooledBackend {
    fn new(key: AssemblySet, backend: Box<dyn CompilerBackend>, counters: Arc<Counters>) -> Self {
        Self {
            key,
            backend: Mutex::new(backend),
            state: Mutex::new(EntryState {
                refs: 0,
                last_used: 0,
                evicted: false,
                disposed: false,
            }),
            counters,
        }
    }

    fn reserve(&self, tick: u64) {
        let mut state = lock(&self.state);
        state.refs += 1;
        state.last_used = tick;
    }

    fn last_used(&self) -> u64 {
        lock(&self.state).last_used
    }

    fn mark_evicted(&self) {
        lock(&self.state).evicted = true;
    }

    fn release(&self) {
        let dispose = {
            let mut state = lock(&self.state);
            state.refs = state.refs.saturating_sub(1);
            Self::claim_disposal(&mut state)
        };
        if dispose {
            self.dispose();
        }
    }

    fn dispose_if_idle(&self) {
        let dispose = Self::claim_disposal(&mut lock(&self.state));
        if dispose {
            self.dispose();
        }
    }

    /// Whether the caller is the one to dispose the backend now.
    fn claim_disposal(state: &mut EntryState) -> bool {
        if state.evicted && state.refs == 0 && !state.disposed {
            state.disposed = true;
            true
        } else {
            false
        }
    }

    fn dispose(&self) {
        lock(&self.backend).dispose();
        self.counters.disposed.fetch_add(1, Ordering::Relaxed);
        debug!(assemblies = %self.key, "disposed backend");
    }
}

/// Exclusive-use handle on a pooled backend. Dropping it releases the
/// reservation.
pub struct BackendLease {
    entry: Arc<PooledBackend>,
}

impl BackendLease {
    pub fn compile(
        &self,
        request: &BackendRequest<'_>,
    ) -> Result<RawExpressionTree, Vec<BackendDiagnostic>> {
        lock(&self.entry.backend).compile(request)
    }

    pub fn diagnose(&self, request: &BackendRequest<'_>) -> Vec<BackendDiagnostic> {
        lock(&self.entry.backend).diagnose(request)
    }

    /// The assembly set the backend was loaded with.
    pub fn assemblies(&self) -> &AssemblySet {
        &self.entry.key
    }

    pub fn is_evicted(&self) -> bool {
        lock(&self.entry.state).evicted
    }

    /// Outstanding leases on this backend, this one included.
    pub fn ref_count(&self) -> usize {
        lock(&self.entry.state).refs
    }
}

impl Drop for BackendLease {
    fn drop(&mut self) {
        self.entry.release();
    }
}

impl core::fmt::Debug for BackendLease {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BackendLease")
            .field("assemblies", &self.entry.key)
            .finish_non_exhaustive()
    }
}

struct PoolState {
    entries: HashMap<AssemblySet, Arc<PooledBackend>>,
    clock: u64,
}

pub struct BackendPool {
    capacity: usize,
    factory: Arc<dyn BackendFactory>,
    resolver: Arc<dyn AssemblyResolver>,
    state: Mutex<PoolState>,
    counters: Arc<Counters>,
}

impl BackendPool {
    /// A pool holding at most `capacity` idle backends. With a capacity of
    /// zero every lease gets a fresh backend, disposed on release.
    pub fn new(
        capacity: usize,
        factory: Arc<dyn BackendFactory>,
        resolver: Arc<dyn AssemblyResolver>,
    ) -> Self {
        Self {
            capacity,
            factory,
            resolver,
            state: Mutex::new(PoolState {
                entries: HashMap::new(),
                clock: 0,
            }),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Leases the backend for `assemblies`, constructing it on first use.
    ///
    /// Construction happens outside the pool lock. If two callers race to
    /// construct the same set, the first insert wins and the other backend
    /// is disposed unused. Failed constructions are never pooled.
    pub fn acquire(&self, assemblies: &AssemblySet) -> Result<BackendLease, Error> {
        {
            let mut state = lock(&self.state);
            state.clock += 1;
            let tick = state.clock;
            if let Some(entry) = state.entries.get(assemblies) {
                entry.reserve(tick);
                trace!(%assemblies, "reusing pooled backend");
                return Ok(BackendLease {
                    entry: entry.clone(),
                });
            }
        }

        let backend = self.construct(assemblies)?;
        let fresh = Arc::new(PooledBackend::new(
            assemblies.clone(),
            backend,
            self.counters.clone(),
        ));
        if self.capacity == 0 {
            fresh.mark_evicted();
            fresh.reserve(0);
            return Ok(BackendLease { entry: fresh });
        }

        let (lease, evicted, unused) = {
            let mut state = lock(&self.state);
            state.clock += 1;
            let tick = state.clock;
            if let Some(existing) = state.entries.get(assemblies) {
                existing.reserve(tick);
                let lease = BackendLease {
                    entry: existing.clone(),
                };
                (lease, None, Some(fresh))
            } else {
                let evicted = if state.entries.len() >= self.capacity {
                    Self::evict_oldest(&mut state)
                } else {
                    None
                };
                fresh.reserve(tick);
                state.entries.insert(assemblies.clone(), fresh.clone());
                (BackendLease { entry: fresh }, evicted, None)
            }
        };

        if let Some(unused) = unused {
            trace!(%assemblies, "lost construction race; discarding backend");
            unused.mark_evicted();
            unused.dispose_if_idle();
        }
        if let Some(evicted) = evicted {
            self.counters.evicted.fetch_add(1, Ordering::Relaxed);
            debug!(assemblies = %evicted.key, "evicted backend");
            evicted.dispose_if_idle();
        }
        Ok(lease)
    }

    /// Removes the least recently used entry and marks it evicted. The
    /// caller disposes it once the pool lock is released.
    fn evict_oldest(state: &mut PoolState) -> Option<Arc<PooledBackend>> {
        let oldest = state
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used())
            .map(|(key, _)| key.clone())?;
        let entry = state.entries.remove(&oldest)?;
        entry.mark_evicted();
        Some(entry)
    }

    fn construct(&self, assemblies: &AssemblySet) -> Result<Box<dyn CompilerBackend>, Error> {
        let mut loaded = Vec::with_capacity(assemblies.len());
        for name in assemblies.iter() {
            let assembly = self.resolver.resolve(name).map_err(|e| {
                warn!(assembly = name, error = %e, "failed to load assembly");
                Error::from(e)
            })?;
            loaded.push(assembly);
        }
        let backend = self.factory.create(&loaded).map_err(|reason| {
            warn!(%assemblies, %reason, "failed to construct compiler backend");
            Error::BackendConstruction(reason)
        })?;
        self.counters.created.fetch_add(1, Ordering::Relaxed);
        debug!(%assemblies, language = %self.factory.language(), "constructed backend");
        Ok(backend)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of pooled (not evicted) backends.
    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, assemblies: &AssemblySet) -> bool {
        lock(&self.state).entries.contains_key(assemblies)
    }

    pub fn stats(&self) -> PoolStats {
        let created = self.counters.created.load(Ordering::Relaxed);
        let disposed = self.counters.disposed.load(Ordering::Relaxed);
        PoolStats {
            created,
            evicted: self.counters.evicted.load(Ordering::Relaxed),
            disposed,
            live: created.saturating_sub(disposed),
        }
    }
}

impl core::fmt::Debug for BackendPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BackendPool")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
