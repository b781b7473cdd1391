//! The `check` command - report diagnostics for expression files.

use flowexpr::{CompilerOptions, RenderConfig, render_diagnostics_to};

use crate::cli::CheckArgs;
use crate::common::CliResult;
use crate::common::input::read_input;
use crate::common::vars;

/// Run the check command.
pub fn run(args: CheckArgs, no_color: bool) -> CliResult<()> {
    let compiler = super::compiler(&args.compile, CompilerOptions::default());
    let mut has_errors = false;

    for file in &args.files {
        if !check_file(&compiler, file, &args, no_color) {
            has_errors = true;
        }
    }

    if has_errors {
        std::process::exit(1);
    }

    Ok(())
}

/// Check a single file. Returns true if it has no errors.
fn check_file(
    compiler: &flowexpr::ExpressionCompiler,
    path: &str,
    args: &CheckArgs,
    no_color: bool,
) -> bool {
    let (content, display_name) = match read_input(path) {
        Ok(c) => c,
        Err(e) => {
            if !args.quiet {
                eprintln!("error: {}", e);
            }
            return false;
        }
    };
    let source = content.trim_end();

    let env = vars::scope(&args.compile.vars);
    let records = compiler.validate(&super::request(source, &args.compile, env));
    let ok = records.iter().all(|r| r.is_warning);
    tracing::debug!(file = %display_name, records = records.len(), "validated");

    if args.quiet {
        return ok;
    }

    if !records.is_empty() {
        let config = RenderConfig {
            color: !no_color,
            filename: Some(display_name.as_str()),
            ..Default::default()
        };
        render_diagnostics_to(source, &records, &mut std::io::stderr(), &config).ok();
    }
    if ok {
        println!("{}: OK", display_name);
    }
    ok
}
