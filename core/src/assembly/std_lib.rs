//! The `std` assembly.
//!
//! Declares namespace `Std`: the `Math`, `Text` and `Convert` static types
//! and the members of the primitive types.
//!
//! Design notes:
//! - String lengths and positions count chars, not bytes
//! - Integer arithmetic helpers wrap on overflow like the operators do

use std::sync::Arc;

use super::{Assembly, AssemblyError, STD, arg};
use crate::eval::EvalError;
use crate::types::{Primitive, Type, TypeDef, TypeDefBuilder};
use crate::values::Value;

const NS: &str = "Std";

pub(super) fn assembly() -> Result<Arc<Assembly>, AssemblyError> {
    Assembly::builder(STD)
        .with_type(math())
        .with_type(text())
        .with_type(convert())
        .with_type(string())
        .with_type(int())
        .with_type(float())
        .with_type(array())
        .build()
}

fn str_arg(args: &[Value], i: usize) -> Result<&str, EvalError> {
    arg(args, i)?.as_str()
}

fn int_arg(args: &[Value], i: usize) -> Result<i64, EvalError> {
    arg(args, i)?.as_int()
}

fn float_arg(args: &[Value], i: usize) -> Result<f64, EvalError> {
    arg(args, i)?.as_float()
}

// ============================================================================
// Math
// ============================================================================

fn math() -> TypeDefBuilder {
    TypeDef::static_class(NS, "Math")
        .static_field("PI", Type::Float, |_| Ok(Value::Float(core::f64::consts::PI)))
        .static_field("E", Type::Float, |_| Ok(Value::Float(core::f64::consts::E)))
        .static_method("Abs", &[Type::Int], Type::Int, |args| {
            Ok(Value::Int(int_arg(args, 0)?.wrapping_abs()))
        })
        .static_method("Abs", &[Type::Float], Type::Float, |args| {
            Ok(Value::Float(float_arg(args, 0)?.abs()))
        })
        .static_method("Max", &[Type::Int, Type::Int], Type::Int, |args| {
            Ok(Value::Int(int_arg(args, 0)?.max(int_arg(args, 1)?)))
        })
        .static_method("Max", &[Type::Float, Type::Float], Type::Float, |args| {
            Ok(Value::Float(float_arg(args, 0)?.max(float_arg(args, 1)?)))
        })
        .static_method("Min", &[Type::Int, Type::Int], Type::Int, |args| {
            Ok(Value::Int(int_arg(args, 0)?.min(int_arg(args, 1)?)))
        })
        .static_method("Min", &[Type::Float, Type::Float], Type::Float, |args| {
            Ok(Value::Float(float_arg(args, 0)?.min(float_arg(args, 1)?)))
        })
        .static_method("Sqrt", &[Type::Float], Type::Float, |args| {
            Ok(Value::Float(float_arg(args, 0)?.sqrt()))
        })
        .static_method("Pow", &[Type::Float, Type::Float], Type::Float, |args| {
            Ok(Value::Float(float_arg(args, 0)?.powf(float_arg(args, 1)?)))
        })
        .static_method("Floor", &[Type::Float], Type::Float, |args| {
            Ok(Value::Float(float_arg(args, 0)?.floor()))
        })
        .static_method("Ceiling", &[Type::Float], Type::Float, |args| {
            Ok(Value::Float(float_arg(args, 0)?.ceil()))
        })
        .static_method("Round", &[Type::Float], Type::Float, |args| {
            Ok(Value::Float(float_arg(args, 0)?.round_ties_even()))
        })
}

// ============================================================================
// Text and Convert
// ============================================================================

fn text() -> TypeDefBuilder {
    TypeDef::static_class(NS, "Text")
        .static_method("Concat", &[Type::Object, Type::Object], Type::String, |args| {
            let mut out = arg(args, 0)?.to_text();
            out.push_str(&arg(args, 1)?.to_text());
            Ok(Value::str(&out))
        })
        .static_method("Repeat", &[Type::String, Type::Int], Type::String, |args| {
            let count = usize::try_from(int_arg(args, 1)?).map_err(|_| {
                EvalError::Native("repeat count must not be negative".to_string())
            })?;
            Ok(Value::str(&str_arg(args, 0)?.repeat(count)))
        })
        .static_method("IsNullOrEmpty", &[Type::String], Type::Bool, is_null_or_empty)
}

fn is_null_or_empty(args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Bool(match arg(args, 0)? {
        Value::Null => true,
        other => other.as_str()?.is_empty(),
    }))
}

fn convert() -> TypeDefBuilder {
    TypeDef::static_class(NS, "Convert")
        .static_method("ToInt", &[Type::Object], Type::Int, |args| {
            match arg(args, 0)? {
                Value::Int(i) => Ok(Value::Int(*i)),
                Value::Float(f) => Ok(Value::Int(f.round_ties_even() as i64)),
                Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
                Value::Str(s) => parse_int(s),
                other => Err(invalid_cast(other, "int")),
            }
        })
        .static_method("ToFloat", &[Type::Object], Type::Float, |args| {
            match arg(args, 0)? {
                Value::Str(s) => parse_float(s),
                Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
                other => Ok(Value::Float(other.as_float()?)),
            }
        })
        .static_method("ToBoolean", &[Type::Object], Type::Bool, |args| {
            match arg(args, 0)? {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                Value::Int(i) => Ok(Value::Bool(*i != 0)),
                Value::Str(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
                Value::Str(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
                other => Err(invalid_cast(other, "bool")),
            }
        })
        .static_method("ToString", &[Type::Object], Type::String, |args| {
            Ok(Value::str(&arg(args, 0)?.to_text()))
        })
}

fn invalid_cast(value: &Value, to: &str) -> EvalError {
    EvalError::InvalidCast {
        from: value.runtime_type().to_string(),
        to: to.to_string(),
    }
}

fn parse_int(s: &str) -> Result<Value, EvalError> {
    s.trim()
        .parse::<i64>()
        .map(Value::Int)
        .map_err(|e| EvalError::Native(format!("cannot parse '{}' as int: {}", s, e)))
}

fn parse_float(s: &str) -> Result<Value, EvalError> {
    s.trim()
        .parse::<f64>()
        .map(Value::Float)
        .map_err(|e| EvalError::Native(format!("cannot parse '{}' as float: {}", s, e)))
}

// ============================================================================
// Primitive members
// ============================================================================

fn string() -> TypeDefBuilder {
    TypeDef::primitive(NS, "String", Primitive::String)
        .computed("Length", Type::Int, |args| {
            Ok(Value::Int(str_arg(args, 0)?.chars().count() as i64))
        })
        .method("ToUpper", &[], Type::String, |args| {
            Ok(Value::str(&str_arg(args, 0)?.to_uppercase()))
        })
        .method("ToLower", &[], Type::String, |args| {
            Ok(Value::str(&str_arg(args, 0)?.to_lowercase()))
        })
        .method("Trim", &[], Type::String, |args| {
            Ok(Value::str(str_arg(args, 0)?.trim()))
        })
        .method("Contains", &[Type::String], Type::Bool, |args| {
            Ok(Value::Bool(str_arg(args, 0)?.contains(str_arg(args, 1)?)))
        })
        .method("StartsWith", &[Type::String], Type::Bool, |args| {
            Ok(Value::Bool(str_arg(args, 0)?.starts_with(str_arg(args, 1)?)))
        })
        .method("EndsWith", &[Type::String], Type::Bool, |args| {
            Ok(Value::Bool(str_arg(args, 0)?.ends_with(str_arg(args, 1)?)))
        })
        .method("IndexOf", &[Type::String], Type::Int, |args| {
            let haystack = str_arg(args, 0)?;
            let index = haystack
                .find(str_arg(args, 1)?)
                .map(|byte| haystack[..byte].chars().count() as i64)
                .unwrap_or(-1);
            Ok(Value::Int(index))
        })
        .method("Replace", &[Type::String, Type::String], Type::String, |args| {
            Ok(Value::str(
                &str_arg(args, 0)?.replace(str_arg(args, 1)?, str_arg(args, 2)?),
            ))
        })
        .method("Substring", &[Type::Int], Type::String, |args| {
            let s = str_arg(args, 0)?;
            let start = int_arg(args, 1)?;
            substring(s, start, s.chars().count() as i64 - start)
        })
        .method("Substring", &[Type::Int, Type::Int], Type::String, |args| {
            substring(str_arg(args, 0)?, int_arg(args, 1)?, int_arg(args, 2)?)
        })
        .static_method("IsNullOrEmpty", &[Type::String], Type::Bool, is_null_or_empty)
}

fn substring(s: &str, start: i64, len: i64) -> Result<Value, EvalError> {
    let total = s.chars().count();
    let start_ok = usize::try_from(start).ok().filter(|&i| i <= total);
    let Some(start) = start_ok else {
        return Err(EvalError::IndexOutOfRange { index: start, len: total });
    };
    let end_ok = usize::try_from(len).ok().map(|l| start + l).filter(|&e| e <= total);
    let Some(end) = end_ok else {
        return Err(EvalError::IndexOutOfRange { index: len, len: total - start });
    };
    Ok(Value::str(&s.chars().skip(start).take(end - start).collect::<String>()))
}

fn int() -> TypeDefBuilder {
    TypeDef::primitive(NS, "Int", Primitive::Int)
        .static_field("MaxValue", Type::Int, |_| Ok(Value::Int(i64::MAX)))
        .static_field("MinValue", Type::Int, |_| Ok(Value::Int(i64::MIN)))
        .static_method("Parse", &[Type::String], Type::Int, |args| parse_int(str_arg(args, 0)?))
}

fn float() -> TypeDefBuilder {
    TypeDef::primitive(NS, "Float", Primitive::Float)
        .static_method("Parse", &[Type::String], Type::Float, |args| {
            parse_float(str_arg(args, 0)?)
        })
        .static_method("IsNaN", &[Type::Float], Type::Bool, |args| {
            Ok(Value::Bool(float_arg(args, 0)?.is_nan()))
        })
}

fn array() -> TypeDefBuilder {
    fn receiver(args: &[Value]) -> Result<&crate::values::ArrayRef, EvalError> {
        match arg(args, 0)? {
            Value::Array(a) => Ok(a),
            Value::Null => Err(EvalError::NullReference("array".to_string())),
            other => Err(invalid_cast(other, "array")),
        }
    }
    TypeDef::primitive(NS, "Array", Primitive::Array)
        .computed("Length", Type::Int, |args| Ok(Value::Int(receiver(args)?.len() as i64)))
        .computed("Rank", Type::Int, |args| Ok(Value::Int(receiver(args)?.rank() as i64)))
        .method("GetLength", &[Type::Int], Type::Int, |args| {
            Ok(Value::Int(receiver(args)?.length(int_arg(args, 1)?)? as i64))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(name: &str) -> Arc<TypeDef> {
        assembly()
            .unwrap()
            .types
            .iter()
            .find(|def| def.name == name)
            .cloned()
            .unwrap()
    }

    fn call(def: &TypeDef, method: &str, args: &[Value]) -> Result<Value, EvalError> {
        let m = def
            .methods
            .iter()
            .find(|m| {
                let arity = args.len() - usize::from(!m.is_static);
                m.name == method && m.params.len() == arity
            })
            .unwrap();
        (m.native)(args)
    }

    #[test]
    fn test_std_assembly_builds() {
        let std = assembly().unwrap();
        assert_eq!(std.name, STD);
        assert!(std.types.len() >= 7);
    }

    #[test]
    fn test_string_members() {
        let string = find("String");
        let s = Value::str("héllo world");
        assert_eq!(call(&string, "IndexOf", &[s.clone(), Value::str("world")]), Ok(Value::Int(6)));
        assert_eq!(
            call(&string, "Substring", &[s.clone(), Value::Int(1), Value::Int(4)]),
            Ok(Value::str("éllo"))
        );
        assert!(matches!(
            call(&string, "Substring", &[s, Value::Int(20)]),
            Err(EvalError::IndexOutOfRange { .. })
        ));
        assert_eq!(call(&string, "IsNullOrEmpty", &[Value::Null]), Ok(Value::Bool(true)));
    }

    #[test]
    fn test_convert() {
        let convert = find("Convert");
        assert_eq!(call(&convert, "ToInt", &[Value::str(" 42 ")]), Ok(Value::Int(42)));
        assert_eq!(call(&convert, "ToInt", &[Value::Float(2.5)]), Ok(Value::Int(2)));
        assert!(call(&convert, "ToInt", &[Value::str("x")]).is_err());
    }
}
