//! Command-line interface definitions.
//!
//! This module contains only clap struct definitions - no business logic.
//! All command implementations are in the `commands` module.

use clap::{Args, Parser, Subcommand};
use flowexpr::syntax::Language;

use crate::common::vars::VarSpec;

/// flowexpr - compile, validate and evaluate workflow expressions
#[derive(Parser, Debug)]
#[command(name = "flowexpr", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate an expression against variable values
    Eval(EvalArgs),

    /// Report errors and warnings for expression files without evaluating
    Check(CheckArgs),
}

/// Options shared by every command that compiles an expression.
#[derive(Args, Debug, Clone)]
pub struct CompileArgs {
    /// Expression dialect
    #[arg(long, short, default_value = "c-style")]
    pub language: Language,

    /// Variable in scope, as `name:type` or `name:type=value`
    #[arg(long = "var", value_name = "SPEC")]
    pub vars: Vec<VarSpec>,

    /// Additional namespace to import
    #[arg(long = "namespace", value_name = "NAME")]
    pub namespaces: Vec<String>,

    /// Additional assembly to reference
    #[arg(long = "assembly", value_name = "NAME")]
    pub assemblies: Vec<String>,
}

/// Arguments for the `eval` command.
#[derive(Args, Debug)]
pub struct EvalArgs {
    /// Expression to evaluate
    pub expression: String,

    /// Convert the result to this type (`int`, `float`, `bool`, `string`, `object`)
    #[arg(long, value_name = "TYPE")]
    pub target: Option<String>,

    /// Maximum evaluation depth
    #[arg(long)]
    pub max_depth: Option<usize>,

    #[command(flatten)]
    pub compile: CompileArgs,
}

/// Arguments for the `check` command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Files to check, one expression each (use `-` for stdin)
    #[arg(required = true)]
    pub files: Vec<String>,

    /// Only set the exit status; print nothing
    #[arg(long, short)]
    pub quiet: bool,

    #[command(flatten)]
    pub compile: CompileArgs,
}
