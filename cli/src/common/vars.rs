//! `--var name:type[=value]` parsing and environment construction.

use std::str::FromStr;
use std::sync::Arc;

use flowexpr::Value;
use flowexpr::environment::{ActivityContext, Scope};
use flowexpr::syntax::Language;
use flowexpr::types::Type;

use super::{CliError, CliResult};

/// One variable declared on the command line.
#[derive(Debug, Clone)]
pub struct VarSpec {
    pub name: String,
    pub ty: Type,
    pub value: Option<Value>,
}

impl FromStr for VarSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (decl, value) = match s.split_once('=') {
            Some((decl, value)) => (decl, Some(value)),
            None => (s, None),
        };
        let (name, ty) = decl
            .split_once(':')
            .ok_or_else(|| format!("expected name:type, got '{}'", decl))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("missing variable name in '{}'", s));
        }
        let ty = parse_type(ty.trim())?;
        let value = value.map(|text| parse_value(&ty, text)).transpose()?;
        Ok(VarSpec {
            name: name.to_string(),
            ty,
            value,
        })
    }
}

/// Primitive type named by a keyword of either dialect.
pub fn parse_type(name: &str) -> Result<Type, String> {
    Language::CStyle
        .primitive_keyword(name)
        .or_else(|| Language::Basic.primitive_keyword(name))
        .ok_or_else(|| format!("unknown type '{}'", name))
}

fn parse_value(ty: &Type, text: &str) -> Result<Value, String> {
    let invalid = |e: &dyn std::fmt::Display| format!("invalid {} value '{}': {}", ty, text, e);
    match ty {
        Type::Int => text.parse().map(Value::Int).map_err(|e| invalid(&e)),
        Type::Float => text.parse().map(Value::Float).map_err(|e| invalid(&e)),
        Type::Bool => text.parse().map(Value::Bool).map_err(|e| invalid(&e)),
        _ if text == "null" => Ok(Value::Null),
        _ => Ok(Value::str(text)),
    }
}

/// A single scope declaring `vars` in order.
pub fn scope(vars: &[VarSpec]) -> Arc<Scope> {
    vars.iter()
        .fold(Scope::builder(), |builder, var| {
            builder.variable(&var.name, var.ty.clone())
        })
        .build()
}

/// Binds the values given on the command line to the locations of `scope`.
pub fn context(scope: &Scope, vars: &[VarSpec]) -> CliResult<ActivityContext> {
    let mut ctx = ActivityContext::new();
    for var in vars {
        let Some(value) = &var.value else { continue };
        let location = scope
            .find(&var.name)
            .ok_or_else(|| CliError::Usage(format!("unknown variable '{}'", var.name)))?;
        ctx.set(location, value.clone())?;
    }
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_declaration_without_value() {
        let var: VarSpec = "count:int".parse().unwrap();
        assert_eq!(var.name, "count");
        assert!(matches!(var.ty, Type::Int));
        assert!(var.value.is_none());
    }

    #[test]
    fn test_parse_values_by_type() {
        let var: VarSpec = "ratio:double=0.5".parse().unwrap();
        assert_eq!(var.value, Some(Value::Float(0.5)));

        let var: VarSpec = "name:string=a=b".parse().unwrap();
        assert_eq!(var.value, Some(Value::str("a=b")));

        let var: VarSpec = "flag:Boolean=true".parse().unwrap();
        assert_eq!(var.value, Some(Value::Bool(true)));
    }

    #[test]
    fn test_parse_errors() {
        assert!("count".parse::<VarSpec>().is_err());
        assert!("count:decimal".parse::<VarSpec>().is_err());
        assert!("count:int=many".parse::<VarSpec>().is_err());
        assert!(":int=1".parse::<VarSpec>().is_err());
    }
}
