//! Source-highlighted error reports.
//!
//! Front-end and analysis errors are rendered with `ariadne` as a report
//! pointing at the offending span. Engine faults are reported as internal
//! errors so they are never mistaken for mistakes in the analyzed program.

use crate::compiler::FrontendError;
use crate::interpreter::errors::AnalysisError;
use crate::parser::ast::Span;
use ariadne::{Color, Config, Label, Report, ReportKind, Source};
use std::ops::Range;

pub fn render_frontend_error(filename: &str, source: &str, error: &FrontendError) -> String {
    let label = match error {
        FrontendError::Parse(_) => "syntax error here",
        FrontendError::Compile(_) => "rejected here",
    };
    render(
        filename,
        source,
        ReportKind::Error,
        &error.message(),
        Some(error.location()),
        label,
    )
}

pub fn render_analysis_error(filename: &str, source: &str, error: &AnalysisError) -> String {
    let (kind, label) = match error {
        AnalysisError::Runtime(_) => (ReportKind::Error, "raised here"),
        AnalysisError::Fault { .. } => (
            ReportKind::Custom("internal error", Color::Red),
            "while stepping this node",
        ),
    };
    render(
        filename,
        source,
        kind,
        &error.to_string(),
        error.location().copied(),
        label,
    )
}

fn render(
    filename: &str,
    source: &str,
    kind: ReportKind<'_>,
    message: &str,
    span: Option<Span>,
    label: &str,
) -> String {
    let Some(span) = span else {
        return format!("{}: {}\n", filename, message);
    };
    let range = char_range(source, span);

    let mut bytes = Vec::new();
    let written = Report::build(kind, (filename, range.clone()))
        .with_config(Config::default().with_color(false))
        .with_message(message)
        .with_label(Label::new((filename, range)).with_message(label))
        .finish()
        .write((filename, Source::from(source)), &mut bytes);

    match written.map(|_| String::from_utf8(bytes)) {
        Ok(Ok(report)) => report,
        _ => format!(
            "{}:{}:{}: {}\n",
            filename, span.line, span.column, message
        ),
    }
}

/// Spans count characters; clamp them to the source and never leave them empty
fn char_range(source: &str, span: Span) -> Range<usize> {
    let len = source.chars().count();
    let start = span.start.min(len);
    let end = span.end.max(start + 1).min(len.max(start));
    start..end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_source;
    use crate::interpreter::errors::{EngineFault, RuntimeError};

    #[test]
    fn test_parse_error_report_names_file() {
        let source = "let x = ;";
        let error = compile_source(source).unwrap_err();
        let report = render_frontend_error("bad.rt", source, &error);
        assert!(report.contains("bad.rt"));
        assert!(report.contains("syntax error here"));
    }

    #[test]
    fn test_faults_are_internal() {
        let source = "fun main() { exit; }";
        let error = AnalysisError::Fault {
            fault: EngineFault::NotPrepared,
            span: Some(Span::new(13, 17, 1, 14)),
        };
        let report = render_analysis_error("f.rt", source, &error);
        assert!(report.contains("internal error"));
    }

    #[test]
    fn test_runtime_error_without_span_source() {
        let error = AnalysisError::Runtime(RuntimeError::UserError {
            message: "boom".to_string(),
            span: Span::new(100, 104, 9, 1),
        });
        // Spans past the end are clamped rather than rejected
        let report = render_analysis_error("f.rt", "x", &error);
        assert!(report.contains("boom"));
    }

    #[test]
    fn test_char_range_is_never_empty() {
        assert_eq!(char_range("abc", Span::new(1, 1, 1, 2)), 1..2);
        assert_eq!(char_range("abc", Span::new(5, 9, 1, 6)), 3..3);
    }
}
