//! Symbol environments and the runtime activity context.
//!
//! An environment is a chain of frames. Each frame exposes the location
//! references (named, typed storage slots) declared at that level; resolution
//! walks outward from the innermost frame and stops at the first frame that
//! declares the name.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::syntax::Language;
use crate::types::Type;

mod context;

pub use context::ActivityContext;

static NEXT_LOCATION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a location reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocationId(u64);

impl LocationId {
    fn fresh() -> Self {
        LocationId(NEXT_LOCATION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A named, typed storage slot visible to expressions.
///
/// Two references with the same name and type are still distinct locations;
/// equality is by identity.
#[derive(Debug, Clone)]
pub struct LocationReference {
    id: LocationId,
    name: Arc<str>,
    ty: Type,
}

impl LocationReference {
    pub fn new(name: &str, ty: Type) -> Self {
        Self {
            id: LocationId::fresh(),
            name: Arc::from(name),
            ty,
        }
    }

    pub fn id(&self) -> LocationId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }
}

impl PartialEq for LocationReference {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for LocationReference {}

/// A frame in the symbol environment chain.
pub trait Environment: Send + Sync {
    /// Location references declared directly in this frame.
    fn location_references(&self) -> &[LocationReference];

    fn parent(&self) -> Option<&dyn Environment>;
}

/// Result of resolving a name against an environment chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<'a> {
    Unresolved,
    Found(&'a LocationReference),
    /// The innermost frame declaring the name declares it more than once;
    /// carries the first declaration and the number of declarations.
    Ambiguous(&'a LocationReference, usize),
}

/// Resolves `name` by walking outward from `env`, comparing names the way
/// `language` does.
pub fn lookup<'a>(env: &'a dyn Environment, name: &str, language: Language) -> Lookup<'a> {
    let mut frame = Some(env);
    while let Some(current) = frame {
        let mut matches = current
            .location_references()
            .iter()
            .filter(|loc| language.names_equal(loc.name(), name));
        if let Some(first) = matches.next() {
            let extra = matches.count();
            return if extra == 0 {
                Lookup::Found(first)
            } else {
                Lookup::Ambiguous(first, extra + 1)
            };
        }
        frame = current.parent();
    }
    Lookup::Unresolved
}

/// The standard environment frame.
///
/// ```
/// use flowexpr_core::environment::Scope;
/// use flowexpr_core::types::Type;
///
/// let outer = Scope::builder().variable("x", Type::Int).build();
/// let inner = Scope::child(&outer).variable("y", Type::String).build();
/// assert!(inner.find("x").is_some());
/// ```
#[derive(Debug, Default)]
pub struct Scope {
    locations: Vec<LocationReference>,
    parent: Option<Arc<Scope>>,
}

impl Scope {
    pub fn builder() -> ScopeBuilder {
        ScopeBuilder {
            locations: Vec::new(),
            parent: None,
        }
    }

    /// Starts a frame nested inside `parent`.
    pub fn child(parent: &Arc<Scope>) -> ScopeBuilder {
        ScopeBuilder {
            locations: Vec::new(),
            parent: Some(parent.clone()),
        }
    }

    /// First location named exactly `name`, innermost frame first.
    pub fn find(&self, name: &str) -> Option<&LocationReference> {
        match lookup(self, name, Language::CStyle) {
            Lookup::Found(loc) => Some(loc),
            Lookup::Unresolved | Lookup::Ambiguous(..) => None,
        }
    }
}

impl Environment for Scope {
    fn location_references(&self) -> &[LocationReference] {
        &self.locations
    }

    fn parent(&self) -> Option<&dyn Environment> {
        self.parent.as_deref().map(|p| p as &dyn Environment)
    }
}

pub struct ScopeBuilder {
    locations: Vec<LocationReference>,
    parent: Option<Arc<Scope>>,
}

impl ScopeBuilder {
    /// Declares a new location. Names are not deduplicated.
    pub fn variable(mut self, name: &str, ty: Type) -> Self {
        self.locations.push(LocationReference::new(name, ty));
        self
    }

    /// Adds an existing location, shared with another frame or environment.
    pub fn location(mut self, location: LocationReference) -> Self {
        self.locations.push(location);
        self
    }

    pub fn build(self) -> Arc<Scope> {
        Arc::new(Scope {
            locations: self.locations,
            parent: self.parent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_frame_shadows_outer() {
        let outer = Scope::builder().variable("x", Type::Int).build();
        let inner = Scope::child(&outer).variable("x", Type::String).build();
        let Lookup::Found(loc) = lookup(&*inner, "x", Language::CStyle) else {
            panic!("expected x to resolve");
        };
        assert_eq!(loc.ty(), &Type::String);
    }

    #[test]
    fn test_ambiguity_is_per_frame() {
        let outer = Scope::builder().variable("x", Type::Int).build();
        let inner = Scope::child(&outer)
            .variable("x", Type::Int)
            .variable("x", Type::Int)
            .build();
        assert!(matches!(lookup(&*inner, "x", Language::CStyle), Lookup::Ambiguous(_, 2)));
        assert!(inner.find("x").is_none());
    }

    #[test]
    fn test_basic_names_are_case_insensitive() {
        let scope = Scope::builder().variable("Total", Type::Int).build();
        assert!(matches!(lookup(&*scope, "TOTAL", Language::Basic), Lookup::Found(_)));
        assert_eq!(lookup(&*scope, "TOTAL", Language::CStyle), Lookup::Unresolved);
    }

    #[test]
    fn test_locations_are_distinct_by_identity() {
        let a = LocationReference::new("x", Type::Int);
        let b = LocationReference::new("x", Type::Int);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }
}
