//! Assemblies: named modules of type definitions referenced by a compile.
//!
//! A compile request names the assemblies it references and the namespaces
//! it imports. Both are kept as ordered sets so that two requests listing the
//! same names in a different order produce equal, equally-hashed keys.

use core::fmt;
use std::collections::BTreeSet;
use std::sync::Arc;

use hashbrown::HashMap;
use thiserror::Error;

use crate::eval::EvalError;
use crate::types::{TypeDef, TypeDefBuilder, TypeDefKind};
use crate::values::Value;

mod collections;
mod std_lib;

pub const STD: &str = "std";
pub const STD_COLLECTIONS: &str = "std.collections";

macro_rules! name_set {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(BTreeSet<String>);

        impl $name {
            pub fn new() -> Self {
                Self::default()
            }

            pub fn insert(&mut self, name: impl Into<String>) -> bool {
                self.0.insert(name.into())
            }

            pub fn contains(&self, name: &str) -> bool {
                self.0.contains(name)
            }

            pub fn iter(&self) -> impl Iterator<Item = &str> {
                self.0.iter().map(String::as_str)
            }

            pub fn len(&self) -> usize {
                self.0.len()
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            pub fn union(&self, other: &Self) -> Self {
                Self(self.0.union(&other.0).cloned().collect())
            }
        }

        impl<S: Into<String>> FromIterator<S> for $name {
            fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
                Self(iter.into_iter().map(Into::into).collect())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{{")?;
                for (i, name) in self.0.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", name)?;
                }
                write!(f, "}}")
            }
        }
    };
}

name_set!(
    /// Names of the assemblies a compile references.
    AssemblySet
);
name_set!(
    /// Namespaces imported into an expression's scope.
    NamespaceSet
);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    #[error("assembly '{0}' could not be found")]
    NotFound(String),

    #[error("assembly '{name}' is invalid: {reason}")]
    Invalid { name: String, reason: String },
}

/// A loaded assembly.
#[derive(Debug)]
pub struct Assembly {
    pub name: String,
    pub types: Vec<Arc<TypeDef>>,
}

impl Assembly {
    pub fn builder(name: &str) -> AssemblyBuilder {
        AssemblyBuilder {
            name: name.to_string(),
            types: Vec::new(),
        }
    }

    /// Every namespace declared by this assembly, including parent
    /// namespaces (`A.B` declares `A` too).
    pub fn namespaces(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for def in &self.types {
            let mut prefix = String::new();
            for part in def.namespace.split('.').filter(|p| !p.is_empty()) {
                if !prefix.is_empty() {
                    prefix.push('.');
                }
                prefix.push_str(part);
                out.insert(prefix.clone());
            }
        }
        out
    }
}

pub struct AssemblyBuilder {
    name: String,
    types: Vec<Arc<TypeDef>>,
}

impl AssemblyBuilder {
    pub fn with_type(mut self, def: TypeDefBuilder) -> Self {
        self.types.push(def.build(&self.name));
        self
    }

    pub fn build(self) -> Result<Arc<Assembly>, AssemblyError> {
        for (i, def) in self.types.iter().enumerate() {
            let duplicate = self.types[..i]
                .iter()
                .any(|other| other.namespace == def.namespace && other.name == def.name);
            if duplicate {
                return Err(AssemblyError::Invalid {
                    name: self.name,
                    reason: format!("type {} is declared twice", def.full_name()),
                });
            }
            if def.kind == TypeDefKind::Struct && def.generic_arity > 0 {
                return Err(AssemblyError::Invalid {
                    name: self.name,
                    reason: format!("generic struct {} is not supported", def.full_name()),
                });
            }
        }
        Ok(Arc::new(Assembly {
            name: self.name,
            types: self.types,
        }))
    }
}

/// Turns a referenced assembly name into a loaded assembly.
pub trait AssemblyResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Arc<Assembly>, AssemblyError>;
}

/// Resolves the built-in assemblies plus any assemblies the host registers.
pub struct BuiltinResolver {
    assemblies: HashMap<String, Result<Arc<Assembly>, AssemblyError>>,
}

impl BuiltinResolver {
    pub fn new() -> Self {
        let mut assemblies = HashMap::new();
        assemblies.insert(STD.to_string(), std_lib::assembly());
        assemblies.insert(STD_COLLECTIONS.to_string(), collections::assembly());
        Self { assemblies }
    }

    pub fn with_assembly(mut self, assembly: Arc<Assembly>) -> Self {
        self.assemblies.insert(assembly.name.clone(), Ok(assembly));
        self
    }
}

impl Default for BuiltinResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl AssemblyResolver for BuiltinResolver {
    fn resolve(&self, name: &str) -> Result<Arc<Assembly>, AssemblyError> {
        self.assemblies
            .get(name)
            .cloned()
            .unwrap_or_else(|| Err(AssemblyError::NotFound(name.to_string())))
    }
}

/// Positional argument of a native member.
pub(crate) fn arg(args: &[Value], index: usize) -> Result<&Value, EvalError> {
    args.get(index).ok_or(EvalError::ArgumentCount {
        expected: index + 1,
        got: args.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    #[test]
    fn test_sets_are_order_independent() {
        let a: AssemblySet = ["std.collections", "std"].into_iter().collect();
        let b: AssemblySet = ["std", "std.collections"].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "{std, std.collections}");
    }

    #[test]
    fn test_builtin_resolver() {
        let resolver = BuiltinResolver::new();
        assert!(resolver.resolve(STD).is_ok());
        assert!(resolver.resolve(STD_COLLECTIONS).is_ok());
        assert_eq!(
            resolver.resolve("missing").unwrap_err(),
            AssemblyError::NotFound("missing".to_string())
        );
    }

    #[test]
    fn test_namespaces_include_parents() {
        let assembly = BuiltinResolver::new().resolve(STD_COLLECTIONS).unwrap();
        let namespaces = assembly.namespaces();
        assert!(namespaces.contains("Std"));
        assert!(namespaces.contains("Std.Collections"));
    }

    #[test]
    fn test_duplicate_types_are_rejected() {
        let result = Assembly::builder("dup")
            .with_type(TypeDef::structure("A", "P").field("X", Type::Int))
            .with_type(TypeDef::class("A", "P"))
            .build();
        assert!(matches!(result, Err(AssemblyError::Invalid { .. })));
    }
}
