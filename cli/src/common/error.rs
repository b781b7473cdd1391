//! Error handling utilities for the CLI.

use flowexpr::{Error, EvalError, RenderConfig, render_error_to};

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Failure of a command, rendered once by `main`.
#[derive(Debug)]
pub enum CliError {
    /// Compilation failed or a service error occurred.
    Compile(Error),
    /// The compiled expression failed while running.
    Eval(EvalError),
    /// Arguments were well-formed for clap but unusable.
    Usage(String),
}

impl From<Error> for CliError {
    fn from(error: Error) -> Self {
        CliError::Compile(error)
    }
}

impl From<EvalError> for CliError {
    fn from(error: EvalError) -> Self {
        CliError::Eval(error)
    }
}

/// Render an error to stderr and exit with code 1.
pub fn render_and_exit(error: CliError, no_color: bool) -> ! {
    let config = RenderConfig {
        color: !no_color,
        ..Default::default()
    };
    match error {
        CliError::Compile(e) => {
            render_error_to(&e, &mut std::io::stderr(), &config).ok();
        }
        CliError::Eval(e) => eprintln!("runtime error: {}", e),
        CliError::Usage(message) => eprintln!("error: {}", message),
    }
    std::process::exit(1);
}
