//! flowexpr - compiled, cached expressions for workflow activities
//!
//! # Overview
//!
//! Workflow activities carry small expressions written against the
//! variables and arguments in scope where the activity sits. flowexpr
//! compiles such expressions into typed callables, caching backend output so
//! that reusing a workflow definition does not pay for compilation again.
//!
//! # Quick Start
//!
//! ```
//! use flowexpr::{CompileRequest, CompilerOptions, ExpressionCompiler, Value};
//! use flowexpr::environment::{ActivityContext, Scope};
//! use flowexpr::syntax::Language;
//! use flowexpr::types::Type;
//!
//! let compiler = ExpressionCompiler::new(Language::CStyle, CompilerOptions::default());
//!
//! // Variables visible to the activity
//! let env = Scope::builder()
//!     .variable("attempts", Type::Int)
//!     .variable("limit", Type::Int)
//!     .build();
//!
//! // Compile an expression
//! let retry = compiler
//!     .compile(&CompileRequest::new("attempts < limit", env.clone()))
//!     .unwrap();
//!
//! // Evaluate against the runtime values
//! let ctx = ActivityContext::new()
//!     .with(env.find("attempts").unwrap(), Value::Int(2))
//!     .unwrap()
//!     .with(env.find("limit").unwrap(), Value::Int(3))
//!     .unwrap();
//! assert_eq!(retry.invoke(&ctx).unwrap(), Value::Bool(true));
//! ```
//!
//! # Validation
//!
//! [`ExpressionCompiler::validate`] reports every error and warning without
//! producing a callable, and never fails. Render the records with
//! [`render_diagnostics_to`].

// Error rendering utilities
pub mod error_renderer;
pub use error_renderer::{
    CharSet, RenderConfig, render_diagnostics_to, render_error, render_error_to,
};

// Re-export public API from flowexpr_core
pub use flowexpr_core::api::{
    CompileRequest, CompiledCallable, CompiledLocation, CompilerOptions, CompilerOptionsOverride,
    Error, EvalOptions, EvalOptionsOverride, ExpressionCompiler,
};
pub use flowexpr_core::diagnostics::DiagnosticRecord;

// Re-export commonly used modules and values
pub use flowexpr_core::eval::EvalError;
pub use flowexpr_core::values::{self, Value};
pub use flowexpr_core::{assembly, environment, syntax, types};
