//! Error rendering using ariadne
//!
//! This module renders compilation failures and validation results with
//! source snippets and labels pointing at the offending text.

use crate::{DiagnosticRecord, Error};
use ariadne::{ColorGenerator, Label, Report, ReportKind, Source};
use std::io::Write;

/// Character set for rendering error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CharSet {
    /// Use Unicode characters for rich visual output.
    #[default]
    Unicode,
    /// Use ASCII-only characters for compatibility.
    Ascii,
}

/// Configuration for error rendering.
#[derive(Debug, Clone)]
pub struct RenderConfig<'a> {
    /// Whether to use ANSI color codes in output.
    pub color: bool,
    /// The name to display for the expression source.
    /// Defaults to "<expression>" if not provided.
    pub filename: Option<&'a str>,
    /// The character set to use for rendering.
    pub charset: CharSet,
}

impl Default for RenderConfig<'_> {
    fn default() -> Self {
        Self {
            color: true,
            filename: None,
            charset: CharSet::Unicode,
        }
    }
}

/// Render an error to stderr using the default config.
pub fn render_error(error: &Error) {
    render_error_to(error, &mut std::io::stderr(), &RenderConfig::default()).ok();
}

/// Render an error to a writer with the given configuration.
///
/// Compilation failures are rendered as annotated source snippets; other
/// errors have no position and are written as a single line.
///
/// # Example
/// ```
/// use flowexpr::{CompileRequest, CompilerOptions, ExpressionCompiler, RenderConfig, render_error_to};
/// use flowexpr::environment::Scope;
/// use flowexpr::syntax::Language;
///
/// let compiler = ExpressionCompiler::new(Language::CStyle, CompilerOptions::default());
/// let env = Scope::builder().build();
/// let err = compiler.compile(&CompileRequest::new("1 +", env)).unwrap_err();
///
/// let mut buf = Vec::new();
/// let config = RenderConfig { color: false, ..Default::default() };
/// render_error_to(&err, &mut buf, &config).unwrap();
/// assert!(String::from_utf8_lossy(&buf).contains("P001"));
/// ```
pub fn render_error_to(
    error: &Error,
    writer: &mut dyn Write,
    config: &RenderConfig,
) -> std::io::Result<()> {
    match error {
        Error::Compilation {
            source_text,
            diagnostics,
        } => render_diagnostics_to(source_text, diagnostics, writer, config),
        other => writeln!(writer, "Error: {}", other),
    }
}

/// Render diagnostic records for `source`, in order.
pub fn render_diagnostics_to(
    source: &str,
    diagnostics: &[DiagnosticRecord],
    writer: &mut dyn Write,
    config: &RenderConfig,
) -> std::io::Result<()> {
    let filename = config.filename.unwrap_or("<expression>");
    let ariadne_charset = match config.charset {
        CharSet::Unicode => ariadne::CharSet::Unicode,
        CharSet::Ascii => ariadne::CharSet::Ascii,
    };

    for diag in diagnostics {
        let mut colors = ColorGenerator::new();
        colors.next(); // Skip the first color.

        let kind = if diag.is_warning {
            ReportKind::Warning
        } else {
            ReportKind::Error
        };
        let ariadne_config = ariadne::Config::default()
            .with_color(config.color)
            .with_char_set(ariadne_charset);

        let span = clamp(diag.span.start, source)..clamp(diag.span.end, source);
        let report = Report::build(kind, (filename, span.clone()))
            .with_code(&diag.code)
            .with_message(&diag.message)
            .with_config(ariadne_config)
            .with_label(
                Label::new((filename, span))
                    .with_message(&diag.message)
                    .with_color(colors.next()),
            );

        report
            .finish()
            .write((filename, Source::from(source)), &mut *writer)?;
    }

    Ok(())
}

/// Ariadne labels are character ranges.
fn clamp(offset: usize, source: &str) -> usize {
    let mut offset = offset.min(source.len());
    while !source.is_char_boundary(offset) {
        offset -= 1;
    }
    source[..offset].chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Scope;
    use crate::syntax::{Language, Span};
    use crate::{CompileRequest, CompilerOptions, ExpressionCompiler};
    use expect_test::{Expect, expect};
    use pretty_assertions::assert_eq;

    const UNICODE_CONFIG: RenderConfig = RenderConfig {
        color: false,
        filename: Some("test.flow"),
        charset: CharSet::Unicode,
    };

    const ASCII_CONFIG: RenderConfig = RenderConfig {
        color: false,
        filename: Some("test.flow"),
        charset: CharSet::Ascii,
    };

    fn render_error_string(source: &str, config: &RenderConfig) -> String {
        let compiler = ExpressionCompiler::new(Language::CStyle, CompilerOptions::default());
        let env = Scope::builder().build();
        match compiler.compile(&CompileRequest::new(source, env)) {
            Err(e) => {
                let mut buf = Vec::new();
                render_error_to(&e, &mut buf, config).unwrap();
                String::from_utf8_lossy(&buf).into_owned()
            }
            Ok(_) => panic!("Expected compilation error for source: {source}"),
        }
    }

    fn check_error(source: &str, config: &RenderConfig, expected: Expect) {
        let output = render_error_string(source, config);
        expected.assert_eq(&output);
    }

    #[test]
    fn test_unknown_identifier_unicode() {
        check_error(
            "foo + 1",
            &UNICODE_CONFIG,
            expect![[r#"
                [E002] Error: the name 'foo' does not exist in the current context
                   ╭─[ test.flow:1:1 ]
                   │
                 1 │ foo + 1
                   │ ─┬─  
                   │  ╰─── the name 'foo' does not exist in the current context
                ───╯
            "#]],
        );
    }

    #[test]
    fn test_unknown_identifier_ascii() {
        check_error(
            "foo + 1",
            &ASCII_CONFIG,
            expect![[r#"
                [E002] Error: the name 'foo' does not exist in the current context
                   ,-[ test.flow:1:1 ]
                   |
                 1 | foo + 1
                   | ^|^  
                   |  `--- the name 'foo' does not exist in the current context
                ---'
            "#]],
        );
    }

    #[test]
    fn test_warning_record() {
        let record = DiagnosticRecord {
            line: 1,
            column: 5,
            code: "W001".to_string(),
            message: "redundant".to_string(),
            is_warning: true,
            span: Span::new(4, 8),
        };
        let mut buf = Vec::new();
        render_diagnostics_to("1 + true", &[record], &mut buf, &UNICODE_CONFIG).unwrap();
        let output = String::from_utf8_lossy(&buf);
        assert!(output.starts_with("[W001] Warning: redundant"));
        assert!(output.contains("test.flow:1:5"));
    }

    #[test]
    fn test_error_without_position() {
        let error = Error::AmbiguousIdentifier {
            name: "x".to_string(),
            count: 2,
        };
        let mut buf = Vec::new();
        render_error_to(&error, &mut buf, &ASCII_CONFIG).unwrap();
        expect![[r#"
            Error: identifier 'x' is ambiguous: 2 locations share the name in one scope
        "#]]
        .assert_eq(&String::from_utf8_lossy(&buf));
    }

    #[test]
    fn test_multibyte_spans_are_character_ranges() {
        assert_eq!(clamp(3, "é + x"), 2);
        assert_eq!(clamp(1, "é"), 0);
        assert_eq!(clamp(99, "ab"), 2);
    }

    #[test]
    fn test_render_config_default_charset() {
        let config = RenderConfig::default();
        assert_eq!(config.charset, CharSet::Unicode);
    }
}
