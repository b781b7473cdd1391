//! Diagnostic records handed to callers of the validation path.

use core::fmt;

use crate::backend::BackendDiagnostic;
use crate::syntax::Span;

/// One error or warning, positioned in the text the user wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRecord {
    /// 1-based line.
    pub line: usize,
    /// 1-based column, counted in characters.
    pub column: usize,
    pub code: String,
    pub message: String,
    pub is_warning: bool,
    /// Byte span in the source text.
    pub span: Span,
}

impl DiagnosticRecord {
    pub fn from_backend(diagnostic: &BackendDiagnostic, source: &str) -> Self {
        let (line, column) = line_column(source, diagnostic.span.start);
        Self {
            line,
            column,
            code: diagnostic.code.to_string(),
            message: diagnostic.message.clone(),
            is_warning: !diagnostic.is_error(),
            span: diagnostic.span,
        }
    }

    /// An error not tied to a position, such as a failed assembly load.
    pub fn general(code: &str, message: impl Into<String>) -> Self {
        Self {
            line: 1,
            column: 1,
            code: code.to_string(),
            message: message.into(),
            is_warning: false,
            span: Span::default(),
        }
    }

    pub fn is_error(&self) -> bool {
        !self.is_warning
    }
}

impl fmt::Display for DiagnosticRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = if self.is_warning { "warning" } else { "error" };
        write!(
            f,
            "{}:{}: {}[{}]: {}",
            self.line, self.column, severity, self.code, self.message
        )
    }
}

/// Converts backend diagnostics, errors first, keeping the backend's order
/// within each group.
pub fn records(diagnostics: &[BackendDiagnostic], source: &str) -> Vec<DiagnosticRecord> {
    let mut records: Vec<_> = diagnostics
        .iter()
        .map(|d| DiagnosticRecord::from_backend(d, source))
        .collect();
    records.sort_by_key(|r| r.is_warning);
    records
}

/// Line and column of byte `offset`, both 1-based. Offsets past the end or
/// inside a character clamp to the preceding boundary.
fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let mut offset = offset.min(source.len());
    while !source.is_char_boundary(offset) {
        offset -= 1;
    }
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::backend::codes;

    #[test]
    fn test_line_column() {
        assert_eq!(line_column("x + 1", 4), (1, 5));
        assert_eq!(line_column("a\nbc + d", 7), (2, 6));
        assert_eq!(line_column("é + x", 5), (1, 5));
        assert_eq!(line_column("x", 10), (1, 2));
    }

    #[test]
    fn test_errors_sort_before_warnings() {
        let source = "a\nb";
        let diagnostics = [
            BackendDiagnostic::warning(codes::REDUNDANT_CAST, "redundant", Span::new(0, 1)),
            BackendDiagnostic::error(codes::UNDEFINED_IDENTIFIER, "undefined", Span::new(2, 3)),
        ];
        let records = records(&diagnostics, source);
        assert_eq!(records[0].code, "E002");
        assert_eq!((records[0].line, records[0].column), (2, 1));
        assert!(records[1].is_warning);
        assert_eq!(records[1].to_string(), "1:1: warning[W001]: redundant");
    }
}
