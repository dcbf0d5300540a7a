//! Console rendering of task progress

use std::time::Duration;

use tracing::debug;

use super::output::Output;
use crate::domain::{Diagnostic, Severity, TaskStatus};
use crate::scope::{MessageLevel, Reporter, TaskKind};

/// Renders reports through [`Output`]
///
/// Failed tasks go to stderr with the other errors. Diagnostics below
/// `info` are logged instead of printed.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleReporter {
    output: Output,
}

impl ConsoleReporter {
    pub fn new(output: Output) -> Self {
        Self { output }
    }
}

impl Reporter for ConsoleReporter {
    fn task_began(&mut self, scope: &str, task: TaskKind) {
        if self.output.is_json() {
            self.output.record(&serde_json::json!({
                "event": "began",
                "scope": scope,
                "task": task.to_string(),
            }));
        } else {
            self.output.line(&began_line(scope, task));
        }
    }

    fn task_finished(&mut self, scope: &str, task: TaskKind, status: TaskStatus, elapsed: Duration) {
        if self.output.is_json() {
            self.output.record(&serde_json::json!({
                "event": "finished",
                "scope": scope,
                "task": task.to_string(),
                "status": status,
                "elapsed_ms": elapsed.as_millis() as u64,
            }));
        } else {
            let line = finished_line(scope, task, status, elapsed);
            match channel(status) {
                Channel::Out => self.output.line(&line),
                Channel::Warning => self.output.warning(&line),
                Channel::Error => self.output.error(&line),
            }
        }
    }

    fn diagnostic(&mut self, scope: &str, diagnostic: &Diagnostic) {
        if diagnostic.severity == Severity::Debug {
            debug!(scope, "{}", diagnostic);
            return;
        }
        if self.output.is_json() {
            self.output.record(&serde_json::json!({
                "event": "diagnostic",
                "scope": scope,
                "diagnostic": diagnostic,
            }));
            return;
        }

        let text = format!("{}: {}", scope, diagnostic);
        match diagnostic.severity {
            Severity::Error | Severity::Warning => eprintln!("{}", text),
            _ => self.output.line(&text),
        }
    }

    fn message(&mut self, scope: &str, level: MessageLevel, text: &str) {
        let text = format!("{}: {}", scope, text);
        match level {
            MessageLevel::Info => self.output.line(&text),
            MessageLevel::Warning => self.output.warning(&text),
            MessageLevel::Error => self.output.error(&text),
        }
    }
}

/// Where a finished line is printed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Out,
    Warning,
    Error,
}

fn channel(status: TaskStatus) -> Channel {
    match status {
        TaskStatus::Failure => Channel::Error,
        // Blocked by a failed dependency
        TaskStatus::Pending => Channel::Warning,
        TaskStatus::Success | TaskStatus::Skipped => Channel::Out,
    }
}

/// `scope: task started`
fn began_line(scope: &str, task: TaskKind) -> String {
    format!("{}: {} started", scope, task)
}

/// `scope: task status (N ms)`
fn finished_line(scope: &str, task: TaskKind, status: TaskStatus, elapsed: Duration) -> String {
    format!("{}: {} {} ({} ms)", scope, task, status, elapsed.as_millis())
}
