//! Reporting hooks for task progress and diagnostics
//!
//! Every stage transition and every normalized diagnostic goes through a
//! [`Reporter`]. Rendering is up to the implementation.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::task::TaskKind;
use crate::domain::{Diagnostic, Severity, TaskStatus};

/// Level of a free-form message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

/// Receives progress and diagnostics from running tasks
pub trait Reporter {
    /// A task is about to run in `scope`
    fn task_began(&mut self, scope: &str, task: TaskKind);

    /// A task finished in `scope`
    fn task_finished(&mut self, scope: &str, task: TaskKind, status: TaskStatus, elapsed: Duration);

    /// A tool reported a diagnostic
    fn diagnostic(&mut self, scope: &str, diagnostic: &Diagnostic);

    /// A free-form message
    fn message(&mut self, scope: &str, level: MessageLevel, text: &str);

    fn info(&mut self, scope: &str, text: &str) {
        self.message(scope, MessageLevel::Info, text);
    }

    fn warning(&mut self, scope: &str, text: &str) {
        self.message(scope, MessageLevel::Warning, text);
    }

    fn error(&mut self, scope: &str, text: &str) {
        self.message(scope, MessageLevel::Error, text);
    }
}

/// Reports through `tracing` only
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn task_began(&mut self, scope: &str, task: TaskKind) {
        info!(scope, %task, "started");
    }

    fn task_finished(&mut self, scope: &str, task: TaskKind, status: TaskStatus, elapsed: Duration) {
        let elapsed_ms = elapsed.as_millis() as u64;
        if status.is_failure() {
            error!(scope, %task, %status, elapsed_ms, "finished");
        } else {
            info!(scope, %task, %status, elapsed_ms, "finished");
        }
    }

    fn diagnostic(&mut self, scope: &str, diagnostic: &Diagnostic) {
        match diagnostic.severity {
            Severity::Error => error!(scope, "{}", diagnostic),
            Severity::Warning => warn!(scope, "{}", diagnostic),
            Severity::Info => info!(scope, "{}", diagnostic),
            Severity::Debug => debug!(scope, "{}", diagnostic),
        }
    }

    fn message(&mut self, scope: &str, level: MessageLevel, text: &str) {
        match level {
            MessageLevel::Info => info!(scope, "{}", text),
            MessageLevel::Warning => warn!(scope, "{}", text),
            MessageLevel::Error => error!(scope, "{}", text),
        }
    }
}

/// A recorded report
#[derive(Debug, Clone, PartialEq)]
pub enum ReportEvent {
    Began {
        scope: String,
        task: TaskKind,
    },
    Finished {
        scope: String,
        task: TaskKind,
        status: TaskStatus,
    },
    Diagnostic {
        scope: String,
        diagnostic: Diagnostic,
    },
    Message {
        scope: String,
        level: MessageLevel,
        text: String,
    },
}

/// Records reports in memory, shared through a handle
///
/// Clones share the same log, so a test can keep one handle while the
/// workspace owns another.
#[derive(Debug, Default, Clone)]
pub struct MemoryReporter {
    events: std::rc::Rc<std::cell::RefCell<Vec<ReportEvent>>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReportEvent> {
        self.events.borrow().clone()
    }

    /// Returns `scope:task` for every task that began, in order
    pub fn started(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                ReportEvent::Began { scope, task } => Some(format!("{}:{}", scope, task)),
                _ => None,
            })
            .collect()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                ReportEvent::Diagnostic { diagnostic, .. } => Some(diagnostic.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn messages(&self, level: MessageLevel) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                ReportEvent::Message { level: l, text, .. } if *l == level => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: ReportEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl Reporter for MemoryReporter {
    fn task_began(&mut self, scope: &str, task: TaskKind) {
        self.push(ReportEvent::Began {
            scope: scope.to_string(),
            task,
        });
    }

    fn task_finished(&mut self, scope: &str, task: TaskKind, status: TaskStatus, _elapsed: Duration) {
        self.push(ReportEvent::Finished {
            scope: scope.to_string(),
            task,
            status,
        });
    }

    fn diagnostic(&mut self, scope: &str, diagnostic: &Diagnostic) {
        self.push(ReportEvent::Diagnostic {
            scope: scope.to_string(),
            diagnostic: diagnostic.clone(),
        });
    }

    fn message(&mut self, scope: &str, level: MessageLevel, text: &str) {
        self.push(ReportEvent::Message {
            scope: scope.to_string(),
            level,
            text: text.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::task::LibraryTask;

    #[test]
    fn memory_reporter_shares_log_between_clones() {
        let reporter = MemoryReporter::new();
        let mut handle = reporter.clone();

        handle.task_began("core/main", LibraryTask::Compile.into());
        handle.warning("core", "careful");

        assert_eq!(reporter.started(), vec!["core/main:compile"]);
        assert_eq!(reporter.messages(MessageLevel::Warning), vec!["careful"]);
        assert!(reporter.messages(MessageLevel::Error).is_empty());
    }
}
