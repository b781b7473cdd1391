//! Type definitions declared by assemblies.
//!
//! A [`TypeDef`] describes the shape of a struct, class or static type and
//! carries the native implementations of its members. Definitions are
//! immutable once built and shared through `Arc`.

use std::sync::Arc;

use super::Type;
use crate::eval::EvalError;
use crate::values::Value;

/// Native member implementation. Instance members receive the receiver as
/// the first argument.
pub type NativeFn = fn(&[Value]) -> Result<Value, EvalError>;

/// Native constructor. Receives the fully instantiated type being built.
pub type NativeCtor = fn(&Type, &[Value]) -> Result<Value, EvalError>;

/// Built-in types whose members are declared by a definition in an assembly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Bool,
    Int,
    Float,
    String,
    Object,
    Array,
}

impl Primitive {
    pub fn to_type(self) -> Option<Type> {
        match self {
            Primitive::Bool => Some(Type::Bool),
            Primitive::Int => Some(Type::Int),
            Primitive::Float => Some(Type::Float),
            Primitive::String => Some(Type::String),
            Primitive::Object => Some(Type::Object),
            // Arrays need an element type; the definition only holds members.
            Primitive::Array => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeDefKind {
    Struct,
    Class,
    /// Holds static members only; cannot be instantiated.
    Static,
    /// Declares the members of a built-in type.
    Primitive(Primitive),
}

#[derive(Debug)]
pub struct TypeDef {
    pub assembly: String,
    pub namespace: String,
    pub name: String,
    pub kind: TypeDefKind,
    pub generic_arity: u8,
    pub fields: Vec<FieldDef>,
    pub constructors: Vec<CtorDef>,
    pub methods: Vec<MethodDef>,
    pub indexer: Option<IndexerDef>,
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub ty: Type,
    pub is_static: bool,
    pub readonly: bool,
    pub storage: FieldStorage,
}

#[derive(Debug, Clone, Copy)]
pub enum FieldStorage {
    /// Stored in the instance at this slot index.
    Slot(usize),
    /// Computed by a native getter.
    Computed(NativeFn),
}

#[derive(Debug, Clone)]
pub struct MethodDef {
    pub name: String,
    pub params: Vec<Type>,
    pub ret: Type,
    pub is_static: bool,
    pub native: NativeFn,
}

#[derive(Debug, Clone)]
pub struct CtorDef {
    pub params: Vec<Type>,
    pub init: CtorInit,
}

#[derive(Debug, Clone, Copy)]
pub enum CtorInit {
    /// Assigns the arguments to the leading slot fields, in declaration order.
    Fields,
    Native(NativeCtor),
}

#[derive(Debug, Clone)]
pub struct IndexerDef {
    pub params: Vec<Type>,
    pub ty: Type,
    pub get: NativeFn,
    /// Receives `[receiver, indices.., value]`.
    pub set: Option<NativeFn>,
}

impl TypeDef {
    pub fn structure(namespace: &str, name: &str) -> TypeDefBuilder {
        TypeDefBuilder::new(namespace, name, TypeDefKind::Struct)
    }

    pub fn class(namespace: &str, name: &str) -> TypeDefBuilder {
        TypeDefBuilder::new(namespace, name, TypeDefKind::Class)
    }

    pub fn static_class(namespace: &str, name: &str) -> TypeDefBuilder {
        TypeDefBuilder::new(namespace, name, TypeDefKind::Static)
    }

    pub fn primitive(namespace: &str, name: &str, primitive: Primitive) -> TypeDefBuilder {
        TypeDefBuilder::new(namespace, name, TypeDefKind::Primitive(primitive))
    }

    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    pub fn same_definition(&self, other: &TypeDef) -> bool {
        core::ptr::eq(self, other)
            || (self.assembly == other.assembly
                && self.namespace == other.namespace
                && self.name == other.name)
    }

    /// Number of stored fields an instance carries.
    pub fn slot_count(&self) -> usize {
        self.fields
            .iter()
            .filter(|f| matches!(f.storage, FieldStorage::Slot(_)))
            .count()
    }

    pub fn is_instantiable(&self) -> bool {
        matches!(self.kind, TypeDefKind::Struct | TypeDefKind::Class)
    }
}

/// Builder for [`TypeDef`]; the owning assembly name is supplied by `build`.
pub struct TypeDefBuilder {
    namespace: String,
    name: String,
    kind: TypeDefKind,
    generic_arity: u8,
    fields: Vec<FieldDef>,
    constructors: Vec<CtorDef>,
    methods: Vec<MethodDef>,
    indexer: Option<IndexerDef>,
    next_slot: usize,
}

impl TypeDefBuilder {
    fn new(namespace: &str, name: &str, kind: TypeDefKind) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            kind,
            generic_arity: 0,
            fields: Vec::new(),
            constructors: Vec::new(),
            methods: Vec::new(),
            indexer: None,
            next_slot: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn generic(mut self, arity: u8) -> Self {
        self.generic_arity = arity;
        self
    }

    /// A stored, writable instance field.
    pub fn field(self, name: &str, ty: Type) -> Self {
        self.slot_field(name, ty, false)
    }

    /// A stored instance field that can only be set by constructors.
    pub fn readonly_field(self, name: &str, ty: Type) -> Self {
        self.slot_field(name, ty, true)
    }

    fn slot_field(mut self, name: &str, ty: Type, readonly: bool) -> Self {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.fields.push(FieldDef {
            name: name.to_string(),
            ty,
            is_static: false,
            readonly,
            storage: FieldStorage::Slot(slot),
        });
        self
    }

    /// A read-only instance property computed from the receiver.
    pub fn computed(mut self, name: &str, ty: Type, getter: NativeFn) -> Self {
        self.fields.push(FieldDef {
            name: name.to_string(),
            ty,
            is_static: false,
            readonly: true,
            storage: FieldStorage::Computed(getter),
        });
        self
    }

    /// A read-only static property.
    pub fn static_field(mut self, name: &str, ty: Type, getter: NativeFn) -> Self {
        self.fields.push(FieldDef {
            name: name.to_string(),
            ty,
            is_static: true,
            readonly: true,
            storage: FieldStorage::Computed(getter),
        });
        self
    }

    pub fn method(mut self, name: &str, params: &[Type], ret: Type, native: NativeFn) -> Self {
        self.methods.push(MethodDef {
            name: name.to_string(),
            params: params.to_vec(),
            ret,
            is_static: false,
            native,
        });
        self
    }

    pub fn static_method(
        mut self,
        name: &str,
        params: &[Type],
        ret: Type,
        native: NativeFn,
    ) -> Self {
        self.methods.push(MethodDef {
            name: name.to_string(),
            params: params.to_vec(),
            ret,
            is_static: true,
            native,
        });
        self
    }

    /// A constructor assigning its arguments to the leading stored fields.
    pub fn constructor(mut self, params: &[Type]) -> Self {
        self.constructors.push(CtorDef {
            params: params.to_vec(),
            init: CtorInit::Fields,
        });
        self
    }

    pub fn native_constructor(mut self, params: &[Type], native: NativeCtor) -> Self {
        self.constructors.push(CtorDef {
            params: params.to_vec(),
            init: CtorInit::Native(native),
        });
        self
    }

    pub fn indexer(mut self, params: &[Type], ty: Type, get: NativeFn, set: Option<NativeFn>) -> Self {
        self.indexer = Some(IndexerDef {
            params: params.to_vec(),
            ty,
            get,
            set,
        });
        self
    }

    pub fn build(self, assembly: &str) -> Arc<TypeDef> {
        Arc::new(TypeDef {
            assembly: assembly.to_string(),
            namespace: self.namespace,
            name: self.name,
            kind: self.kind,
            generic_arity: self.generic_arity,
            fields: self.fields,
            constructors: self.constructors,
            methods: self.methods,
            indexer: self.indexer,
        })
    }
}
