use thiserror::Error;

/// Failure while evaluating a compiled expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("null reference while accessing {0}")]
    NullReference(String),

    #[error("index {index} is out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("attempted to divide by zero")]
    DivideByZero,

    #[error("cannot cast a value of type {from} to {to}")]
    InvalidCast { from: String, to: String },

    #[error("location '{0}' has no value in the activity context")]
    UnboundLocation(String),

    #[error("expected a value of type {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("the given key {0} was not present in the map")]
    KeyNotFound(String),

    #[error("expected {expected} arguments, got {got}")]
    ArgumentCount { expected: usize, got: usize },

    #[error("evaluation exceeded the maximum depth of {0}")]
    DepthExceeded(usize),

    #[error("{0}")]
    Native(String),

    #[error("internal evaluation error: {0}")]
    Internal(String),
}
