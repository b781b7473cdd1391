//! Runtime values.
//!
//! Scalars and structs have value semantics: cloning a [`Value`] copies them.
//! Arrays, class instances, lists and maps are shared handles; cloning one
//! aliases the same storage, and equality on them is reference identity.

use core::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::eval::EvalError;
use crate::types::{FieldStorage, Type};

mod array;
mod collections;

pub use array::ArrayRef;
pub use collections::{ListRef, MapKey, MapRef};

#[cfg(test)]
mod value_test;

/// Locks a value's storage. A poisoned lock only means a native member
/// panicked mid-update; the data itself is still a valid `Vec`.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Array(ArrayRef),
    Struct(StructValue),
    Object(ObjectRef),
    List(ListRef),
    Map(MapRef),
}

/// Instance of a struct type. Copied on assignment.
#[derive(Debug, Clone)]
pub struct StructValue {
    pub ty: Type,
    pub fields: Vec<Value>,
}

/// Instance of a class type. Shared on assignment.
#[derive(Debug, Clone)]
pub struct ObjectRef {
    pub ty: Type,
    pub fields: Arc<Mutex<Vec<Value>>>,
}

impl ObjectRef {
    pub fn new(ty: Type, fields: Vec<Value>) -> Self {
        Self {
            ty,
            fields: Arc::new(Mutex::new(fields)),
        }
    }

    pub fn get(&self, slot: usize) -> Result<Value, EvalError> {
        lock(&self.fields)
            .get(slot)
            .cloned()
            .ok_or_else(|| EvalError::Internal(format!("no field slot {} on {}", slot, self.ty)))
    }

    pub fn set(&self, slot: usize, value: Value) -> Result<(), EvalError> {
        let mut fields = lock(&self.fields);
        let len = fields.len();
        let field = fields.get_mut(slot).ok_or_else(|| {
            EvalError::Internal(format!("no field slot {} of {} on {}", slot, len, self.ty))
        })?;
        *field = value;
        Ok(())
    }
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    /// The zero value of `ty`: `false`, `0`, `0.0`, a struct with default
    /// fields, or null for reference types.
    pub fn default_for(ty: &Type) -> Value {
        match ty {
            Type::Bool => Value::Bool(false),
            Type::Int => Value::Int(0),
            Type::Float => Value::Float(0.0),
            Type::Named { def, args } if ty.is_struct() => Value::Struct(StructValue {
                ty: ty.clone(),
                fields: def
                    .fields
                    .iter()
                    .filter(|f| matches!(f.storage, FieldStorage::Slot(_)))
                    .map(|f| Value::default_for(&f.ty.substitute(args)))
                    .collect(),
            }),
            _ => Value::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The dynamic type of this value. `Null` reports [`Type::Null`].
    pub fn runtime_type(&self) -> Type {
        match self {
            Value::Null => Type::Null,
            Value::Bool(_) => Type::Bool,
            Value::Int(_) => Type::Int,
            Value::Float(_) => Type::Float,
            Value::Str(_) => Type::String,
            Value::Array(a) => a.ty.clone(),
            Value::Struct(s) => s.ty.clone(),
            Value::Object(o) => o.ty.clone(),
            Value::List(l) => l.ty.clone(),
            Value::Map(m) => m.ty.clone(),
        }
    }

    /// Whether this value can be stored, unconverted, in a slot of type `ty`.
    pub fn conforms_to(&self, ty: &Type) -> bool {
        match (self, ty) {
            (_, Type::Object) => true,
            (Value::Null, ty) => ty.is_reference_type(),
            (value, ty) => &value.runtime_type() == ty,
        }
    }

    pub fn as_bool(&self) -> Result<bool, EvalError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(other.unexpected("bool")),
        }
    }

    pub fn as_int(&self) -> Result<i64, EvalError> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(other.unexpected("int")),
        }
    }

    /// Numeric view; integers widen.
    pub fn as_float(&self) -> Result<f64, EvalError> {
        match self {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            other => Err(other.unexpected("float")),
        }
    }

    pub fn as_str(&self) -> Result<&str, EvalError> {
        match self {
            Value::Str(s) => Ok(s),
            Value::Null => Err(EvalError::NullReference("string".to_string())),
            other => Err(other.unexpected("string")),
        }
    }

    fn unexpected(&self, expected: &str) -> EvalError {
        if self.is_null() {
            return EvalError::NullReference(expected.to_string());
        }
        EvalError::TypeMismatch {
            expected: expected.to_string(),
            found: self.runtime_type().to_string(),
        }
    }

    /// Equality as the expression languages define it: numbers compare by
    /// value across int and float, strings and structs by content, and
    /// reference types by identity.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Struct(a), Value::Struct(b)) => {
                a.ty == b.ty
                    && a.fields.len() == b.fields.len()
                    && a.fields.iter().zip(b.fields.iter()).all(|(x, y)| x.loose_eq(y))
            }
            _ => self == other,
        }
    }

    /// Text used by string concatenation; null concatenates as empty.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Str(s) => s.to_string(),
            other => other.to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Struct(a), Value::Struct(b)) => a.ty == b.ty && a.fields == b.fields,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(&a.items, &b.items),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(&a.fields, &b.fields),
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(&a.items, &b.items),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(&a.entries, &b.entries),
            _ => false,
        }
    }
}

fn write_fields(f: &mut fmt::Formatter<'_>, ty: &Type, fields: &[Value]) -> fmt::Result {
    write!(f, "{} {{", ty)?;
    let names = ty
        .definition()
        .into_iter()
        .flat_map(|def| def.fields.iter())
        .filter(|field| matches!(field.storage, FieldStorage::Slot(_)))
        .map(|field| field.name.as_str());
    for (i, (name, value)) in names.zip(fields.iter()).enumerate() {
        let sep = if i == 0 { " " } else { ", " };
        write!(f, "{}{} = {}", sep, name, value)?;
    }
    write!(f, " }}")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Array(a) => {
                let items = lock(&a.items);
                write_list(f, items.iter())
            }
            Value::Struct(s) => write_fields(f, &s.ty, &s.fields),
            Value::Object(o) => {
                let fields = lock(&o.fields);
                write_fields(f, &o.ty, &fields)
            }
            Value::List(l) => {
                let items = lock(&l.items);
                write_list(f, items.iter())
            }
            Value::Map(m) => {
                let entries = lock(&m.entries);
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

fn write_list<'a>(f: &mut fmt::Formatter<'_>, items: impl Iterator<Item = &'a Value>) -> fmt::Result {
    write!(f, "[")?;
    for (i, item) in items.enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    write!(f, "]")
}
