//! Shared test utilities for CLI integration tests.

#![allow(dead_code)]

use assert_cmd::Command;
use expect_test::Expect;
use std::io::Write;

/// Create a new command for the flowexpr binary.
pub fn flowexpr() -> Command {
    Command::new(env!("CARGO_BIN_EXE_flowexpr"))
}

/// Create a temporary file with the given content.
pub fn temp_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".expr")
        .tempfile()
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

/// Run a command and check that stdout matches the expected output.
pub fn check_stdout(args: &[&str], expected: Expect) {
    let output = flowexpr()
        .args(args)
        .output()
        .expect("failed to execute command");
    expected.assert_eq(&String::from_utf8_lossy(&output.stdout));
}

/// Run a command and check that stderr matches the expected output.
pub fn check_stderr(args: &[&str], expected: Expect) {
    let output = flowexpr()
        .args(args)
        .output()
        .expect("failed to execute command");
    expected.assert_eq(&String::from_utf8_lossy(&output.stderr));
}
