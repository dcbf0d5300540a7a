//! Uniform diagnostic format
//!
//! Compiler, lint and API-extractor messages are all normalized into a
//! [`Diagnostic`] before they are handed to a reporter.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// A 1-based line/column position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Location of a diagnostic in a source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<Position>,
}

impl SourceSpan {
    /// A span covering a whole file
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            start: None,
            end: None,
        }
    }

    /// A span starting at a single position
    pub fn at(path: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        Self {
            path: path.into(),
            start: Some(Position::new(line, column)),
            end: None,
        }
    }

    pub fn with_end(mut self, line: u32, column: u32) -> Self {
        self.end = Some(Position::new(line, column));
        self
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())?;
        if let Some(start) = self.start {
            write!(f, ":{}:{}", start.line, start.column)?;
        }
        Ok(())
    }
}

/// A normalized diagnostic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<SourceSpan>,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    /// Secondary diagnostic this one was caused by (e.g. a suggested fix)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<Diagnostic>>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            span: None,
            message: message.into(),
            note: None,
            cause: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn caused_by(mut self, cause: Diagnostic) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Iterates over the cause chain, starting with the first cause
    pub fn causes(&self) -> impl Iterator<Item = &Diagnostic> {
        std::iter::successors(self.cause.as_deref(), |d| d.cause.as_deref())
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(span) = &self.span {
            write!(f, "{}: ", span)?;
        }
        write!(f, "{}: {}", self.severity.label(), self.message)?;
        if let Some(note) = &self.note {
            write!(f, "\n  note: {}", note)?;
        }
        for cause in self.causes() {
            write!(f, "\n  caused by: ")?;
            if let Some(span) = &cause.span {
                write!(f, "{}: ", span)?;
            }
            write!(f, "{}", cause.message)?;
        }
        Ok(())
    }
}
