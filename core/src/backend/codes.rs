//! Diagnostic codes.

/// Syntax error.
pub const SYNTAX: &str = "P001";
pub const TYPE_MISMATCH: &str = "E001";
pub const UNDEFINED_IDENTIFIER: &str = "E002";
pub const UNKNOWN_MEMBER: &str = "E003";
/// No matching or ambiguous overload.
pub const NO_OVERLOAD: &str = "E004";
pub const UNKNOWN_TYPE: &str = "E005";
pub const INVALID_CAST: &str = "E006";
pub const NOT_ASSIGNABLE: &str = "E007";
pub const INVALID_OPERATOR: &str = "E008";
/// Free identifier declared more than once in the innermost declaring scope.
pub const AMBIGUOUS_IDENTIFIER: &str = "E009";
pub const REDUNDANT_CAST: &str = "W001";
/// Value type compared with null.
pub const NULL_COMPARISON: &str = "W002";

// Reported by the diagnostics path itself rather than a backend.
pub const ASSEMBLY_LOAD: &str = "A001";
pub const BACKEND_CONSTRUCTION: &str = "B001";
pub const INTERNAL: &str = "I001";
