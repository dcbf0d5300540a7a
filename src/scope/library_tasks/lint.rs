//! Lint task
//!
//! Lints the source files the last compile emitted. Only fatal errors fail
//! the task; ordinary errors and warnings are reported.

use std::path::Path;

use crate::domain::{Diagnostic, LibraryId, Severity, SourceSpan, TaskStatus};
use crate::scope::library::LintSummary;
use crate::scope::{Scope, TaskContext};
use crate::storage::find_lint_config;
use crate::tools::{LintFix, LintMessage, LintSeverity};

pub(crate) fn exec(cx: &mut TaskContext<'_>, library: LibraryId, name: &str) -> TaskStatus {
    let scope = &cx.registry[library];
    let files: Vec<_> = scope.compile.emitted.values().cloned().collect();
    if files.is_empty() {
        return TaskStatus::Pending;
    }

    let lint_config = match find_lint_config(scope.base_dir(), &cx.config.files.lint_config) {
        Ok(config) => config,
        Err(e) => {
            cx.reporter.error(name, &format!("{:#}", e));
            return TaskStatus::Failure;
        }
    };

    let mut summary = LintSummary::default();
    for file in &files {
        match cx.toolchain.linter.lint_text(&file.text, &file.path, lint_config.as_ref()) {
            Ok(report) => {
                summary.add(&report);
                for message in &report.messages {
                    cx.reporter.diagnostic(name, &to_diagnostic(&file.path, message));
                }
            }
            Err(e) => {
                cx.reporter.error(name, &e.to_string());
                summary.fatal_error_count += 1;
            }
        }
    }

    cx.registry[library].lint = summary;
    if summary.fatal_error_count > 0 {
        TaskStatus::Failure
    } else {
        TaskStatus::Success
    }
}

/// Converts a lint message, chaining its fix and suggestions as causes
pub(crate) fn to_diagnostic(path: &Path, message: &LintMessage) -> Diagnostic {
    let severity = if message.fatal || message.severity == LintSeverity::Error {
        Severity::Error
    } else {
        Severity::Warning
    };

    let mut span = SourceSpan::at(path, message.line, message.column);
    if let (Some(line), Some(column)) = (message.end_line, message.end_column) {
        span = span.with_end(line, column);
    }

    let mut fixes: Vec<Diagnostic> = Vec::new();
    if let Some(fix) = &message.fix {
        fixes.push(fix_diagnostic(path, "fix", fix));
    }
    for suggestion in &message.suggestions {
        fixes.push(fix_diagnostic(path, &suggestion.desc, &suggestion.fix));
    }

    let mut diagnostic = Diagnostic::new(severity, &message.message).with_span(span);
    if let Some(rule) = &message.rule_id {
        diagnostic = diagnostic.with_note(rule.clone());
    }
    match fixes.into_iter().rev().reduce(|inner, outer| outer.caused_by(inner)) {
        Some(chain) => diagnostic.caused_by(chain),
        None => diagnostic,
    }
}

fn fix_diagnostic(path: &Path, label: &str, fix: &LintFix) -> Diagnostic {
    Diagnostic::new(
        Severity::Info,
        format!(
            "{}: replace bytes {}..{} with {:?}",
            label, fix.range.0, fix.range.1, fix.text
        ),
    )
    .with_span(SourceSpan::file(path))
}
