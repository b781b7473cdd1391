use std::sync::Arc;

use super::{Expr, ParamId};
use crate::eval::{EvalError, EvalOptions, Evaluator};
use crate::syntax::Language;
use crate::types::{CallableSignature, Type};
use crate::values::Value;

/// Name of the runtime-context parameter every raw tree declares first.
pub const CONTEXT_PARAMETER: &str = "$context";

/// A declared parameter of a raw tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub id: ParamId,
    pub name: Arc<str>,
    pub ty: Type,
}

/// Backend output: a typed but unbound expression body.
///
/// Conceptually a function of the runtime context followed by one parameter
/// per free identifier the backend resolved through its lookup. Immutable
/// once produced, and shared through `Arc` by every environment that binds
/// it.
#[derive(Debug, Clone)]
pub struct RawExpressionTree {
    pub body: Expr,
    pub context: ParamDecl,
    pub free_identifiers: Vec<ParamDecl>,
    pub result_type: Type,
    pub signature: CallableSignature,
    pub language: Language,
    /// Number of compiler temporaries declared anywhere in `body`.
    pub local_count: u32,
}

impl RawExpressionTree {
    pub fn new(
        body: Expr,
        free_identifiers: Vec<ParamDecl>,
        language: Language,
        local_count: u32,
    ) -> Self {
        let result_type = body.ty.clone();
        let context = ParamDecl {
            id: ParamId(u32::MAX),
            name: Arc::from(CONTEXT_PARAMETER),
            ty: Type::Object,
        };
        let params = core::iter::once(context.ty.clone())
            .chain(free_identifiers.iter().map(|p| p.ty.clone()))
            .collect();
        let signature = CallableSignature::for_parameters(params, result_type.clone());
        Self {
            body,
            context,
            free_identifiers,
            result_type,
            signature,
            language,
            local_count,
        }
    }

    pub fn free_identifier(&self, id: ParamId) -> Option<&ParamDecl> {
        self.free_identifiers.get(id.0 as usize)
    }

    /// Evaluates the unbound body, supplying one value per free identifier
    /// in declaration order.
    pub fn invoke(&self, args: &[Value]) -> Result<Value, EvalError> {
        if args.len() != self.free_identifiers.len() {
            return Err(EvalError::ArgumentCount {
                expected: self.free_identifiers.len(),
                got: args.len(),
            });
        }
        let args = self
            .free_identifiers
            .iter()
            .zip(args)
            .map(|(param, value)| match (&param.ty, value) {
                (Type::Float, Value::Int(i)) => Ok(Value::Float(*i as f64)),
                (ty, value) if value.conforms_to(ty) => Ok(value.clone()),
                (ty, value) => Err(EvalError::TypeMismatch {
                    expected: ty.to_string(),
                    found: value.runtime_type().to_string(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let options = EvalOptions::default();
        Evaluator::new(&options, None, &args, self.local_count).eval(&self.body)
    }
}
