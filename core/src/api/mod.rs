//! Public API for compiling and evaluating workflow expressions.
//!
//! An [`ExpressionCompiler`] turns a [`CompileRequest`] (source text plus the
//! environment it is written against) into a [`CompiledCallable`], or into a
//! [`CompiledLocation`] for expressions that are assigned to. The raw output
//! of the backend is cached and rebound to other environments with the same
//! shape without compiling again.
//!
//! # Example
//!
//! ```
//! use flowexpr_core::api::{CompileRequest, CompilerOptions, ExpressionCompiler};
//! use flowexpr_core::environment::{ActivityContext, Scope};
//! use flowexpr_core::syntax::Language;
//! use flowexpr_core::types::Type;
//! use flowexpr_core::values::Value;
//!
//! let compiler = ExpressionCompiler::new(Language::CStyle, CompilerOptions::default());
//!
//! let env = Scope::builder().variable("radius", Type::Float).build();
//! let radius = env.find("radius").unwrap().clone();
//! let area = compiler
//!     .compile(&CompileRequest::new("Math.PI * radius * radius", env))
//!     .unwrap();
//!
//! let ctx = ActivityContext::new().with(&radius, Value::Float(2.0)).unwrap();
//! let Value::Float(result) = area.invoke(&ctx).unwrap() else {
//!     panic!("expected a float");
//! };
//! assert!((result - 12.566).abs() < 0.001);
//! ```

mod compiler;
pub mod error;
mod expression;
pub mod options;
mod request;

pub use compiler::ExpressionCompiler;
pub use error::Error;
pub use expression::{CompiledCallable, CompiledLocation};
pub use options::{
    CompilerOptions, CompilerOptionsOverride, EvalOptions, EvalOptionsOverride,
};
pub use request::CompileRequest;
