// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! JSON diagnostic output for machine consumption.
//!
//! Produces structured JSON that tooling can parse to understand and fix
//! lowering failures. Each diagnostic includes source context, exact
//! locations (line/col), and the error category.

use serde::Serialize;

use crate::{codes::ErrorCodeRegistry, Diagnostic, LabelStyle};

/// A complete JSON diagnostic report for one lowering run.
#[derive(Debug, Serialize)]
pub struct DiagnosticReport {
    /// Schema version for forward compatibility.
    pub version: u32,
    /// The file the method bodies came from.
    pub file: String,
    /// Whether lowering succeeded (no errors).
    pub success: bool,
    /// All diagnostics from this run.
    pub diagnostics: Vec<JsonDiagnostic>,
    /// Total error count.
    pub error_count: usize,
    /// Total warning count.
    pub warning_count: usize,
}

/// A single diagnostic in JSON form, enriched with source context.
#[derive(Debug, Serialize)]
pub struct JsonDiagnostic {
    /// Severity: "error", "warning", or "note".
    pub severity: String,
    /// Error code (e.g., "E0302").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Error category (e.g., "Jump", "Region").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Human-readable error message.
    pub message: String,
    /// Primary source location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    /// All labeled source spans.
    pub labels: Vec<JsonLabel>,
    /// Additional notes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    /// Actionable help message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

/// A source location with line/column (1-based).
#[derive(Debug, Serialize)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
    pub byte_offset: usize,
    /// The source line text for context.
    pub source_line: String,
}

/// A labeled span in JSON form.
#[derive(Debug, Serialize)]
pub struct JsonLabel {
    /// "primary" or "secondary".
    pub role: String,
    /// Label message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub start: LineCol,
    pub end: LineCol,
    /// The source line containing this label.
    pub source_line: String,
}

/// Line/column pair (1-based).
#[derive(Debug, Serialize)]
pub struct LineCol {
    pub line: usize,
    pub column: usize,
    pub byte_offset: usize,
}

/// Convert diagnostics to a structured JSON report.
pub fn to_json_report(diagnostics: &[Diagnostic], source: &str, file: &str) -> DiagnosticReport {
    let registry = ErrorCodeRegistry::default();
    let mut error_count = 0;
    let mut warning_count = 0;

    let json_diags: Vec<JsonDiagnostic> = diagnostics
        .iter()
        .map(|d| {
            match d.severity {
                crate::Severity::Error => error_count += 1,
                crate::Severity::Warning => warning_count += 1,
                crate::Severity::Note => {}
            }
            to_json_diagnostic(d, source, &registry)
        })
        .collect();

    DiagnosticReport {
        version: 1,
        file: file.to_string(),
        success: error_count == 0,
        diagnostics: json_diags,
        error_count,
        warning_count,
    }
}

fn to_json_diagnostic(
    diag: &Diagnostic,
    source: &str,
    registry: &ErrorCodeRegistry,
) -> JsonDiagnostic {
    let severity = match diag.severity {
        crate::Severity::Error => "error",
        crate::Severity::Warning => "warning",
        crate::Severity::Note => "note",
    };

    let code = diag.code.as_ref().map(|c| c.0.clone());
    let category = code
        .as_ref()
        .and_then(|c| registry.get(c))
        .map(|info| info.category.to_string());

    let location = diag
        .labels
        .iter()
        .find(|l| l.style == LabelStyle::Primary)
        .or(diag.labels.first())
        .map(|l| {
            let (line, col) = offset_to_line_col(source, l.span.start);
            SourceLocation {
                line,
                column: col,
                byte_offset: l.span.start,
                source_line: get_line(source, line).unwrap_or("").to_string(),
            }
        });

    let labels = diag
        .labels
        .iter()
        .map(|l| {
            let (start_line, start_col) = offset_to_line_col(source, l.span.start);
            let (end_line, end_col) = offset_to_line_col(source, l.span.end);
            JsonLabel {
                role: match l.style {
                    LabelStyle::Primary => "primary".to_string(),
                    LabelStyle::Secondary => "secondary".to_string(),
                },
                message: l.message.clone(),
                start: LineCol {
                    line: start_line,
                    column: start_col,
                    byte_offset: l.span.start,
                },
                end: LineCol {
                    line: end_line,
                    column: end_col,
                    byte_offset: l.span.end,
                },
                source_line: get_line(source, start_line).unwrap_or("").to_string(),
            }
        })
        .collect();

    JsonDiagnostic {
        severity: severity.to_string(),
        code,
        category,
        message: diag.message.clone(),
        location,
        labels,
        notes: diag.notes.clone(),
        help: diag.help.as_ref().map(|h| h.message.clone()),
    }
}

/// Convert byte offset to (line, col), both 1-based.
fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (i, ch) in source.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

/// Get source line text by 1-based line number.
fn get_line(source: &str, line_num: usize) -> Option<&str> {
    source.lines().nth(line_num - 1)
}

/// Serialize a diagnostic report to pretty JSON.
pub fn to_json_string(report: &DiagnosticReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToDiagnostic;
    use seam_hir::Span;
    use seam_machine::LoweringError;

    #[test]
    fn report_counts_errors_and_resolves_category() {
        let source = "let x = 1\nlet x = 2\n";
        let err = LoweringError::InvalidCaptureConflict {
            name: "x".to_string(),
            span: Span::new(14, 15),
        };
        let report = to_json_report(&[err.to_diagnostic()], source, "demo.src");

        assert!(!report.success);
        assert_eq!(report.error_count, 1);
        let diag = &report.diagnostics[0];
        assert_eq!(diag.code.as_deref(), Some("E0320"));
        assert_eq!(diag.category.as_deref(), Some("Capture"));
        let loc = diag.location.as_ref().unwrap();
        assert_eq!(loc.line, 2);
        assert_eq!(loc.source_line, "let x = 2");
    }
}
