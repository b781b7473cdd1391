//! Dynamic compilation and caching of workflow expressions.
//!
//! Activities of a workflow carry small expressions written against the
//! variables and arguments visible to them. This crate compiles those
//! expressions into strongly-typed callables and caches the expensive part
//! of the work across activity trees that reuse the same text.
//!
//! The pieces, leaves first:
//!
//! - [`environment`]: nested scopes of named, typed location references and
//!   the runtime [`ActivityContext`](environment::ActivityContext).
//! - [`backend`]: the compiler seam, with the hosted backend for the
//!   C-style and Basic dialects.
//! - [`pool`]: bounded, reference-counted reuse of backends per assembly set.
//! - [`cache`]: raw backend output keyed independently of any environment.
//! - [`rewriter`]: binds a raw tree to a concrete environment.
//! - [`api`]: the [`ExpressionCompiler`] service tying these together.

pub mod api;
pub mod assembly;
pub mod backend;
pub mod cache;
pub mod diagnostics;
pub mod environment;
pub mod eval;
pub mod pool;
pub mod rewriter;
pub mod syntax;
pub mod tree;
pub mod types;
pub mod values;

pub use api::{
    CompileRequest, CompiledCallable, CompiledLocation, CompilerOptions, Error,
    ExpressionCompiler,
};

static_assertions::assert_impl_all!(ExpressionCompiler: Send, Sync);
static_assertions::assert_impl_all!(cache::RawTreeCache: Send, Sync);
static_assertions::assert_impl_all!(pool::BackendPool: Send, Sync);
static_assertions::assert_impl_all!(tree::RawExpressionTree: Send, Sync);
static_assertions::assert_impl_all!(CompiledCallable: Send, Sync);
