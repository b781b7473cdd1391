use std::sync::Arc;

use super::Expr;
use crate::environment::LocationId;
use crate::types::{CallableSignature, Type};

/// How a bound location is accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationAccess {
    /// The location's value is read (and copied, for value types).
    Value,
    /// The location is a value-type container whose members are read or
    /// written in place.
    Reference,
}

/// A free identifier resolved to a location in a specific environment.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundLocation {
    pub id: LocationId,
    pub name: Arc<str>,
    pub ty: Type,
    pub access: LocationAccess,
}

/// Which rewrite produced a bound expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewritePath {
    /// A cached raw tree was rebound without invoking the backend.
    Fast,
    /// The raw tree was produced by a fresh backend compile.
    Full,
}

/// A raw tree with every free identifier replaced by a location of one
/// environment. Owned by the caller; never cached.
#[derive(Debug, Clone)]
pub struct BoundExpression {
    pub body: Expr,
    pub result_type: Type,
    /// Distinct locations the body references, in first-use order.
    pub locations: Vec<BoundLocation>,
    pub path: RewritePath,
    pub local_count: u32,
    /// Signature of the raw tree this was bound from.
    pub signature: CallableSignature,
}
