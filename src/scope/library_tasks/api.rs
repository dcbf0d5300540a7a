//! Api task
//!
//! Runs the API extractor in local-build mode. Messages are intercepted,
//! marked handled and reported as diagnostics.

use std::fs;

use crate::domain::{Diagnostic, LibraryId, Severity, SourceSpan, TaskStatus};
use crate::scope::{Scope, TaskContext};
use crate::storage::ApiExtractorConfig;
use crate::tools::{ExtractorLogLevel, ExtractorMessage, ExtractorOptions};

pub(crate) fn exec(cx: &mut TaskContext<'_>, library: LibraryId, name: &str) -> TaskStatus {
    let dir = cx.registry[library].base_dir().to_path_buf();
    let config_path = dir.join(&cx.config.files.api_config);
    if !config_path.is_file() {
        return TaskStatus::Pending;
    }

    let config = match ApiExtractorConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            cx.reporter.error(name, &format!("{:#}", e));
            return TaskStatus::Failure;
        }
    };

    if config.api_report.enabled {
        let report_dir = config.report_dir(&dir);
        if let Err(e) = fs::create_dir_all(&report_dir) {
            cx.reporter.error(
                name,
                &format!("Failed to create report folder {}: {}", report_dir.display(), e),
            );
            return TaskStatus::Failure;
        }
    }

    let mut diagnostics = Vec::new();
    let result = cx.toolchain.api_extractor.extract(
        &config_path,
        &config,
        ExtractorOptions { local_build: true },
        &mut |message| {
            message.handled = true;
            if let Some(diagnostic) = to_diagnostic(message) {
                diagnostics.push(diagnostic);
            }
        },
    );

    for diagnostic in &diagnostics {
        cx.reporter.diagnostic(name, diagnostic);
    }

    match result {
        Ok(result) if result.succeeded => TaskStatus::Success,
        Ok(result) => {
            cx.reporter.error(
                name,
                &format!(
                    "API extraction failed with {} error(s) and {} warning(s)",
                    result.error_count, result.warning_count
                ),
            );
            TaskStatus::Failure
        }
        Err(e) => {
            cx.reporter.error(name, &e.to_string());
            TaskStatus::Failure
        }
    }
}

/// Maps an extractor message by log level; silent messages are dropped
pub(crate) fn to_diagnostic(message: &ExtractorMessage) -> Option<Diagnostic> {
    let severity = match message.log_level {
        ExtractorLogLevel::None => return None,
        ExtractorLogLevel::Error => Severity::Error,
        ExtractorLogLevel::Warning => Severity::Warning,
        ExtractorLogLevel::Info => Severity::Info,
        ExtractorLogLevel::Verbose => Severity::Debug,
    };

    let mut diagnostic = Diagnostic::new(severity, &message.text);
    if let Some(path) = &message.source_file_path {
        let span = match (message.source_file_line, message.source_file_column) {
            (Some(line), Some(column)) => SourceSpan::at(path, line, column),
            (Some(line), None) => SourceSpan::at(path, line, 1),
            _ => SourceSpan::file(path),
        };
        diagnostic = diagnostic.with_span(span);
    }
    if let Some(id) = &message.message_id {
        diagnostic = diagnostic.with_note(id.clone());
    }
    Some(diagnostic)
}
