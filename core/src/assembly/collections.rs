//! The `std.collections` assembly: `List<T>` and `Map<K, V>` in namespace
//! `Std.Collections`.

use std::sync::Arc;

use super::{Assembly, AssemblyError, STD_COLLECTIONS, arg};
use crate::eval::EvalError;
use crate::types::{Type, TypeDef, TypeDefBuilder};
use crate::values::{ListRef, MapRef, Value, lock};

const NS: &str = "Std.Collections";

pub(super) fn assembly() -> Result<Arc<Assembly>, AssemblyError> {
    Assembly::builder(STD_COLLECTIONS)
        .with_type(list())
        .with_type(map())
        .build()
}

fn list_receiver(args: &[Value]) -> Result<&ListRef, EvalError> {
    match arg(args, 0)? {
        Value::List(l) => Ok(l),
        Value::Null => Err(EvalError::NullReference("List".to_string())),
        other => Err(EvalError::TypeMismatch {
            expected: "List".to_string(),
            found: other.runtime_type().to_string(),
        }),
    }
}

fn map_receiver(args: &[Value]) -> Result<&MapRef, EvalError> {
    match arg(args, 0)? {
        Value::Map(m) => Ok(m),
        Value::Null => Err(EvalError::NullReference("Map".to_string())),
        other => Err(EvalError::TypeMismatch {
            expected: "Map".to_string(),
            found: other.runtime_type().to_string(),
        }),
    }
}

fn list() -> TypeDefBuilder {
    let t = Type::Generic(0);
    TypeDef::class(NS, "List")
        .generic(1)
        .native_constructor(&[], |ty, _| Ok(Value::List(ListRef::new(ty.clone(), Vec::new()))))
        .native_constructor(&[Type::Int], |ty, args| {
            let capacity = usize::try_from(arg(args, 0)?.as_int()?)
                .map_err(|_| EvalError::Native("capacity must not be negative".to_string()))?;
            Ok(Value::List(ListRef::new(ty.clone(), Vec::with_capacity(capacity))))
        })
        .computed("Count", Type::Int, |args| {
            Ok(Value::Int(list_receiver(args)?.len() as i64))
        })
        .method("Add", &[t.clone()], Type::Void, |args| {
            list_receiver(args)?.push(arg(args, 1)?.clone());
            Ok(Value::Null)
        })
        .method("Contains", &[t.clone()], Type::Bool, |args| {
            let needle = arg(args, 1)?;
            let items = lock(&list_receiver(args)?.items).clone();
            Ok(Value::Bool(items.iter().any(|item| item.loose_eq(needle))))
        })
        .method("IndexOf", &[t.clone()], Type::Int, |args| {
            let needle = arg(args, 1)?;
            let items = lock(&list_receiver(args)?.items).clone();
            let index = items.iter().position(|item| item.loose_eq(needle));
            Ok(Value::Int(index.map(|i| i as i64).unwrap_or(-1)))
        })
        .method("Clear", &[], Type::Void, |args| {
            lock(&list_receiver(args)?.items).clear();
            Ok(Value::Null)
        })
        .indexer(
            &[Type::Int],
            t,
            |args| list_receiver(args)?.get(arg(args, 1)?.as_int()?),
            Some(list_set),
        )
}

fn list_set(args: &[Value]) -> Result<Value, EvalError> {
    list_receiver(args)?.set(arg(args, 1)?.as_int()?, arg(args, 2)?.clone())?;
    Ok(Value::Null)
}

fn map() -> TypeDefBuilder {
    let k = Type::Generic(0);
    let v = Type::Generic(1);
    TypeDef::class(NS, "Map")
        .generic(2)
        .native_constructor(&[], |ty, _| Ok(Value::Map(MapRef::new(ty.clone()))))
        .computed("Count", Type::Int, |args| {
            Ok(Value::Int(map_receiver(args)?.len() as i64))
        })
        .method("Add", &[k.clone(), v.clone()], Type::Void, |args| {
            map_receiver(args)?.add(arg(args, 1)?.clone(), arg(args, 2)?.clone())?;
            Ok(Value::Null)
        })
        .method("ContainsKey", &[k.clone()], Type::Bool, |args| {
            Ok(Value::Bool(map_receiver(args)?.contains_key(arg(args, 1)?)))
        })
        .indexer(
            &[k],
            v,
            |args| map_receiver(args)?.get(arg(args, 1)?),
            Some(map_set),
        )
}

fn map_set(args: &[Value]) -> Result<Value, EvalError> {
    map_receiver(args)?.set(arg(args, 1)?.clone(), arg(args, 2)?.clone());
    Ok(Value::Null)
}
