//! Callable type descriptions for compiled expression trees.
//!
//! A raw tree is conceptually a function of the runtime context followed by
//! one parameter per free identifier. Hosts expose function types up to a
//! fixed arity; beyond that an ad-hoc description is synthesized so an
//! expression may reference any number of free identifiers.

use core::fmt;

use super::Type;

/// Largest parameter count a built-in function type can describe.
pub const MAX_BUILTIN_ARITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallableSignature {
    Builtin { params: Vec<Type>, result: Type },
    Synthesized(SynthesizedCallable),
}

/// Callable type created on demand for parameter lists longer than
/// [`MAX_BUILTIN_ARITY`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SynthesizedCallable {
    pub name: String,
    pub params: Vec<Type>,
    pub result: Type,
}

impl CallableSignature {
    pub fn for_parameters(params: Vec<Type>, result: Type) -> Self {
        if params.len() <= MAX_BUILTIN_ARITY {
            CallableSignature::Builtin { params, result }
        } else {
            CallableSignature::Synthesized(SynthesizedCallable {
                name: format!("$Callable{}", params.len()),
                params,
                result,
            })
        }
    }

    pub fn params(&self) -> &[Type] {
        match self {
            CallableSignature::Builtin { params, .. } => params,
            CallableSignature::Synthesized(s) => &s.params,
        }
    }

    pub fn result(&self) -> &Type {
        match self {
            CallableSignature::Builtin { result, .. } => result,
            CallableSignature::Synthesized(s) => &s.result,
        }
    }

    pub fn arity(&self) -> usize {
        self.params().len()
    }

    pub fn is_synthesized(&self) -> bool {
        matches!(self, CallableSignature::Synthesized(_))
    }
}

impl fmt::Display for CallableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallableSignature::Builtin { .. } => "Func",
            CallableSignature::Synthesized(s) => s.name.as_str(),
        };
        write!(f, "{}<", name)?;
        for param in self.params() {
            write!(f, "{}, ", param)?;
        }
        write!(f, "{}>", self.result())
    }
}
