//! The host type system.
//!
//! Types are small, cheaply clonable values. Primitive types are plain enum
//! variants; arrays and named types share their payload through `Arc` so a
//! `Type` can be cloned into every node of an expression tree without
//! copying definitions around.

use core::fmt;
use std::sync::Arc;

pub mod callable;
pub mod def;

pub use callable::{CallableSignature, MAX_BUILTIN_ARITY, SynthesizedCallable};
pub use def::{
    CtorDef, CtorInit, FieldDef, FieldStorage, IndexerDef, MethodDef, NativeCtor, NativeFn,
    Primitive, TypeDef, TypeDefBuilder, TypeDefKind,
};

/// A type as seen by the type checker and the evaluator.
#[derive(Clone, Debug)]
pub enum Type {
    /// Result of a member that produces no value.
    Void,
    Bool,
    Int,
    Float,
    String,
    /// The universal reference type; every value converts to it.
    Object,
    /// Type of the `null` / `Nothing` literal.
    Null,
    /// Array of `element` with `rank` dimensions (rank >= 1).
    Array { element: Arc<Type>, rank: u8 },
    /// A struct, class or static type declared by an assembly, with its
    /// generic arguments (empty for non-generic definitions).
    Named { def: Arc<TypeDef>, args: Arc<[Type]> },
    /// Generic parameter placeholder inside member signatures of generic
    /// definitions; substituted with the receiver's arguments.
    Generic(u8),
}

impl Type {
    pub fn array(element: Type, rank: u8) -> Self {
        Type::Array {
            element: Arc::new(element),
            rank: rank.max(1),
        }
    }

    pub fn named(def: Arc<TypeDef>) -> Self {
        Type::Named {
            def,
            args: Arc::from([]),
        }
    }

    pub fn generic_instance(def: Arc<TypeDef>, args: Vec<Type>) -> Self {
        Type::Named {
            def,
            args: Arc::from(args),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    /// Value types are copied on assignment and member access.
    pub fn is_value_type(&self) -> bool {
        match self {
            Type::Bool | Type::Int | Type::Float => true,
            Type::Named { def, .. } => def.kind == TypeDefKind::Struct,
            _ => false,
        }
    }

    /// True for structs declared by an assembly (the only value types with
    /// members that can be assigned through a containing location).
    pub fn is_struct(&self) -> bool {
        matches!(self, Type::Named { def, .. } if def.kind == TypeDefKind::Struct)
    }

    pub fn is_reference_type(&self) -> bool {
        match self {
            Type::String | Type::Object | Type::Null | Type::Array { .. } => true,
            Type::Named { def, .. } => def.kind == TypeDefKind::Class,
            _ => false,
        }
    }

    pub fn definition(&self) -> Option<&Arc<TypeDef>> {
        match self {
            Type::Named { def, .. } => Some(def),
            _ => None,
        }
    }

    pub fn type_args(&self) -> &[Type] {
        match self {
            Type::Named { args, .. } => args,
            _ => &[],
        }
    }

    /// The primitive kind whose members apply to this type, if any.
    pub fn primitive(&self) -> Option<Primitive> {
        match self {
            Type::Bool => Some(Primitive::Bool),
            Type::Int => Some(Primitive::Int),
            Type::Float => Some(Primitive::Float),
            Type::String => Some(Primitive::String),
            Type::Object => Some(Primitive::Object),
            Type::Array { .. } => Some(Primitive::Array),
            _ => None,
        }
    }

    /// Replace generic placeholders with `args`.
    pub fn substitute(&self, args: &[Type]) -> Type {
        match self {
            Type::Generic(i) => args.get(*i as usize).cloned().unwrap_or(Type::Object),
            Type::Array { element, rank } => Type::array(element.substitute(args), *rank),
            Type::Named { def, args: inner } if !inner.is_empty() => Type::Named {
                def: def.clone(),
                args: inner.iter().map(|t| t.substitute(args)).collect(),
            },
            other => other.clone(),
        }
    }

    /// Implicit conversion: identity, `Int -> Float`, anything -> `Object`,
    /// `null` -> any reference type.
    pub fn is_assignable_from(&self, from: &Type) -> bool {
        if self == from {
            return true;
        }
        match (self, from) {
            (_, Type::Void) | (Type::Void, _) => false,
            (Type::Float, Type::Int) => true,
            (Type::Object, _) => true,
            (target, Type::Null) => target.is_reference_type(),
            _ => false,
        }
    }

    /// Explicit (cast) conversion. Conversions from `Object` and between
    /// reference types are checked at run time.
    pub fn is_castable_from(&self, from: &Type) -> bool {
        if self.is_assignable_from(from) {
            return true;
        }
        match (self, from) {
            (Type::Int, Type::Float) => true,
            (_, Type::Object) => !matches!(self, Type::Void),
            _ => false,
        }
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Type::Void, Type::Void)
            | (Type::Bool, Type::Bool)
            | (Type::Int, Type::Int)
            | (Type::Float, Type::Float)
            | (Type::String, Type::String)
            | (Type::Object, Type::Object)
            | (Type::Null, Type::Null) => true,
            (
                Type::Array {
                    element: a,
                    rank: ra,
                },
                Type::Array {
                    element: b,
                    rank: rb,
                },
            ) => ra == rb && a == b,
            (Type::Named { def: a, args: aa }, Type::Named { def: b, args: ba }) => {
                a.same_definition(b) && aa == ba
            }
            (Type::Generic(a), Type::Generic(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Type {}

impl core::hash::Hash for Type {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Type::Array { element, rank } => {
                element.hash(state);
                rank.hash(state);
            }
            Type::Named { def, args } => {
                def.assembly.hash(state);
                def.namespace.hash(state);
                def.name.hash(state);
                args.hash(state);
            }
            Type::Generic(i) => i.hash(state),
            _ => {}
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::String => write!(f, "string"),
            Type::Object => write!(f, "object"),
            Type::Null => write!(f, "null"),
            Type::Array { element, rank } => {
                write!(f, "{}[", element)?;
                for _ in 1..*rank {
                    write!(f, ",")?;
                }
                write!(f, "]")
            }
            Type::Named { def, args } => {
                write!(f, "{}", def.full_name())?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", arg)?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            Type::Generic(i) => write!(f, "T{}", i),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> Arc<TypeDef> {
        TypeDef::structure("Geometry", "Point")
            .field("X", Type::Int)
            .field("Y", Type::Int)
            .build("geometry")
    }

    #[test]
    fn test_named_types_compare_by_definition_identity() {
        // Two separately built definitions with the same name are the same type.
        assert_eq!(Type::named(point()), Type::named(point()));
        assert_ne!(Type::named(point()), Type::Object);
    }

    #[test]
    fn test_implicit_conversions() {
        assert!(Type::Float.is_assignable_from(&Type::Int));
        assert!(!Type::Int.is_assignable_from(&Type::Float));
        assert!(Type::Object.is_assignable_from(&Type::named(point())));
        assert!(Type::String.is_assignable_from(&Type::Null));
        assert!(!Type::named(point()).is_assignable_from(&Type::Null));
        assert!(!Type::Object.is_assignable_from(&Type::Void));
    }

    #[test]
    fn test_explicit_conversions() {
        assert!(Type::Int.is_castable_from(&Type::Float));
        assert!(Type::named(point()).is_castable_from(&Type::Object));
        assert!(!Type::Int.is_castable_from(&Type::String));
    }

    #[test]
    fn test_display() {
        assert_eq!(Type::array(Type::Int, 2).to_string(), "int[,]");
        assert_eq!(Type::named(point()).to_string(), "Geometry.Point");
    }

    #[test]
    fn test_substitute_generic_parameters() {
        let ty = Type::array(Type::Generic(0), 1);
        assert_eq!(ty.substitute(&[Type::String]), Type::array(Type::String, 1));
    }
}
