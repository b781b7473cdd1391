//! The `eval` command - compile and evaluate an expression.

use flowexpr::{CompilerOptions, CompilerOptionsOverride, EvalOptionsOverride};

use crate::cli::EvalArgs;
use crate::common::vars::{self, parse_type};
use crate::common::{CliError, CliResult};

/// Run the eval command.
pub fn run(args: EvalArgs) -> CliResult<()> {
    let mut options = CompilerOptions::default();
    options.override_with(&CompilerOptionsOverride {
        eval: Some(EvalOptionsOverride {
            max_depth: args.max_depth,
        }),
        ..Default::default()
    });
    let compiler = super::compiler(&args.compile, options);

    let env = vars::scope(&args.compile.vars);
    let ctx = vars::context(&env, &args.compile.vars)?;

    let mut request = super::request(&args.expression, &args.compile, env);
    if let Some(target) = &args.target {
        request = request.target_type(parse_type(target).map_err(CliError::Usage)?);
    }

    let callable = compiler.compile(&request)?;
    tracing::debug!(result_type = %callable.result_type(), "compiled");

    let value = callable.invoke(&ctx)?;
    println!("{}", value);
    Ok(())
}
