//! Command implementations.
//!
//! Each subcommand has its own module with a `run` function.

pub mod check;
pub mod eval;

use flowexpr::environment::Environment;
use flowexpr::{CompileRequest, CompilerOptions, ExpressionCompiler};
use std::sync::Arc;

use crate::cli::CompileArgs;

/// Compiler for the dialect selected on the command line.
pub fn compiler(args: &CompileArgs, options: CompilerOptions) -> ExpressionCompiler {
    ExpressionCompiler::new(args.language, options)
}

/// Request for `source` carrying the namespaces and assemblies of `args`.
pub fn request(source: &str, args: &CompileArgs, env: Arc<dyn Environment>) -> CompileRequest {
    args.assemblies.iter().fold(
        CompileRequest::new(source, env).namespaces(args.namespaces.iter().cloned()),
        |request, assembly| request.assembly(assembly.clone()),
    )
}
