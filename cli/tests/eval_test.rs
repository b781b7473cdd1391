//! Integration tests for the `eval` command.

mod common;

use common::{check_stderr, check_stdout, flowexpr};
use expect_test::expect;
use predicates::prelude::*;

#[test]
fn eval_simple_expression() {
    flowexpr()
        .args(["eval", "1 + 2"])
        .assert()
        .success()
        .stdout("3\n");
}

#[test]
fn eval_string_concatenation() {
    check_stdout(&["eval", r#""a" + 1"#], expect![[r#"
        a1
    "#]]);
}

#[test]
fn eval_with_variables() {
    flowexpr()
        .args([
            "eval",
            "attempts < limit && name == \"retry\"",
            "--var",
            "attempts:int=2",
            "--var",
            "limit:int=3",
            "--var",
            "name:string=retry",
        ])
        .assert()
        .success()
        .stdout("true\n");
}

#[test]
fn eval_basic_dialect() {
    flowexpr()
        .args([
            "eval",
            "--language",
            "basic",
            "If(N Mod 2 = 0, \"even\", \"odd\")",
            "--var",
            "n:Integer=4",
        ])
        .assert()
        .success()
        .stdout("even\n");
}

#[test]
fn eval_target_type() {
    flowexpr()
        .args(["eval", "7", "--target", "float"])
        .assert()
        .success()
        .stdout("7\n");

    flowexpr()
        .args(["eval", "\"7\"", "--target", "int", "--no-color"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E001"));
}

#[test]
fn eval_namespace_import() {
    flowexpr()
        .args([
            "eval",
            "new List<int> { 4, 5 }.Count",
            "--namespace",
            "Std.Collections",
        ])
        .assert()
        .success()
        .stdout("2\n");
}

#[test]
fn eval_unknown_name_is_rendered() {
    flowexpr()
        .args(["eval", "missing + 1", "--no-color"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("[E002] Error"))
        .stderr(predicate::str::contains("<expression>"));
}

#[test]
fn eval_runtime_error() {
    check_stderr(&["eval", "1 / x", "--var", "x:int=0"], expect![[r#"
        runtime error: attempted to divide by zero
    "#]]);
}

#[test]
fn eval_unbound_variable() {
    flowexpr()
        .args(["eval", "x * 2", "--var", "x:int"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("location 'x' has no value"));
}

#[test]
fn eval_depth_limit() {
    flowexpr()
        .args(["eval", "x + 2 + 3", "--var", "x:int=1", "--max-depth", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("maximum depth of 1"));
}

#[test]
fn eval_rejects_malformed_var() {
    flowexpr()
        .args(["eval", "x", "--var", "x:int=many"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid int value 'many'"));
}
