//! Tests for runtime values

use smallvec::smallvec;

use super::{ArrayRef, ListRef, MapRef, Value};
use crate::eval::EvalError;
use crate::types::{Type, TypeDef};

fn point_type() -> Type {
    Type::named(
        TypeDef::structure("Geometry", "Point")
            .field("X", Type::Int)
            .field("Y", Type::Int)
            .build("geometry"),
    )
}

#[test]
fn test_default_values() {
    assert_eq!(Value::default_for(&Type::Int), Value::Int(0));
    assert_eq!(Value::default_for(&Type::Bool), Value::Bool(false));
    assert_eq!(Value::default_for(&Type::String), Value::Null);

    let Value::Struct(point) = Value::default_for(&point_type()) else {
        panic!("expected a struct value");
    };
    assert_eq!(point.fields.as_slice(), &[Value::Int(0), Value::Int(0)]);
}

#[test]
fn test_structs_copy_and_arrays_alias() {
    let original = Value::default_for(&point_type());
    let mut copy = original.clone();
    if let Value::Struct(s) = &mut copy {
        s.fields[0] = Value::Int(5);
    }
    assert_ne!(original, copy);

    let array = Value::Array(ArrayRef::new(Type::Int, smallvec![2], vec![Value::Int(1), Value::Int(2)]));
    let alias = array.clone();
    if let Value::Array(a) = &alias {
        a.set(&[0], Value::Int(9)).unwrap();
    }
    assert_eq!(array, alias);
    assert_eq!(array.to_string(), "[9, 2]");
}

#[test]
fn test_nested_struct_defaults_copy_deeply() {
    let segment = Type::named(
        TypeDef::structure("Geometry", "Segment")
            .field("Start", point_type())
            .field("End", point_type())
            .build("geometry"),
    );
    let original = Value::default_for(&segment);
    let Value::Struct(s) = &original else {
        panic!("expected a struct value");
    };
    assert_eq!(s.fields.len(), 2);
    assert_eq!(s.fields[1], Value::default_for(&point_type()));

    let mut copy = original.clone();
    if let Value::Struct(s) = &mut copy {
        if let Value::Struct(end) = &mut s.fields[1] {
            end.fields[0] = Value::Int(3);
        }
    }
    assert_ne!(original, copy);
}

#[test]
fn test_loose_equality_crosses_numeric_types() {
    assert!(Value::Int(2).loose_eq(&Value::Float(2.0)));
    assert!(!Value::Int(2).loose_eq(&Value::str("2")));
    assert!(Value::str("a").loose_eq(&Value::str("a")));
}

#[test]
fn test_conforms_to() {
    assert!(Value::Int(1).conforms_to(&Type::Int));
    assert!(!Value::Int(1).conforms_to(&Type::Float));
    assert!(Value::Int(1).conforms_to(&Type::Object));
    assert!(Value::Null.conforms_to(&Type::String));
    assert!(!Value::Null.conforms_to(&Type::Int));
}

#[test]
fn test_multi_dimensional_indexing() {
    let array = ArrayRef::with_bounds(Type::Int, smallvec![2, 3]);
    array.set(&[1, 2], Value::Int(7)).unwrap();
    assert_eq!(array.get(&[1, 2]).unwrap(), Value::Int(7));
    assert_eq!(array.len(), 6);
    assert_eq!(
        array.get(&[2, 0]),
        Err(EvalError::IndexOutOfRange { index: 2, len: 2 })
    );
}

#[test]
fn test_list_and_map() {
    let list = ListRef::new(Type::Object, vec![]);
    list.push(Value::Int(1));
    assert_eq!(list.get(0).unwrap(), Value::Int(1));
    assert!(matches!(list.get(3), Err(EvalError::IndexOutOfRange { .. })));

    let map = MapRef::new(Type::Object);
    map.add(Value::str("a"), Value::Int(1)).unwrap();
    assert!(map.add(Value::str("a"), Value::Int(2)).is_err());
    map.set(Value::str("b"), Value::Int(2));
    assert_eq!(map.get(&Value::str("b")).unwrap(), Value::Int(2));
    assert_eq!(
        map.get(&Value::str("c")),
        Err(EvalError::KeyNotFound("c".to_string()))
    );
    assert_eq!(Value::Map(map).to_string(), "{a: 1, b: 2}");
}

#[test]
fn test_struct_display() {
    let value = Value::default_for(&point_type());
    assert_eq!(value.to_string(), "Geometry.Point { X = 0, Y = 0 }");
    assert_eq!(Value::Null.to_text(), "");
}
