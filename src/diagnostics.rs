use std::fmt;

use thiserror::Error;

use crate::value::Value;

/// Location of a construct within a source file.
///
/// `start`/`end` are byte offsets; `line`/`column` are 1-based and point at
/// `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl SourceSpan {
    pub const fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Span covering `self` through `other`, keeping the position of `self`.
    pub fn to(self, other: SourceSpan) -> Self {
        Self {
            start: self.start,
            end: other.end.max(self.end),
            line: self.line,
            column: self.column,
        }
    }
}

/// Classification of a diagnostic event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    Lexer,
    Parser,
    Runtime,
    Match,
    /// `break`/`continue` escaped every enclosing loop.
    ControlFlow,
}

/// Rich diagnostic information surfaced to end users.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Option<SourceSpan>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
            notes: Vec::new(),
        }
    }

    pub fn runtime(message: impl Into<String>, span: SourceSpan) -> Self {
        Self::new(DiagnosticKind::Runtime, message).with_span(span)
    }

    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn line(&self) -> Option<usize> {
        self.span.map(|span| span.line)
    }

    /// Whether `try`/`catch` in a script may intercept this diagnostic.
    pub fn is_catchable(&self) -> bool {
        matches!(self.kind, DiagnosticKind::Runtime | DiagnosticKind::Match)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        if let Some(span) = self.span {
            write!(f, " (line {}, column {})", span.line, span.column)?;
        }
        if !self.notes.is_empty() {
            writeln!(f)?;
            for note in &self.notes {
                writeln!(f, "  note: {note}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

/// Unified error type for the Lumen toolchain.
#[derive(Debug, Error)]
pub enum LumenError {
    #[error("{0}")]
    Diagnostic(#[from] Diagnostic),
    /// A script-level `throw` that no `catch` intercepted.
    #[error("uncaught exception: {value}{}", line_suffix(.span))]
    Thrown {
        value: Value,
        span: Option<SourceSpan>,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LumenError {
    pub fn thrown(value: Value, span: SourceSpan) -> Self {
        Self::Thrown {
            value,
            span: Some(span),
        }
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            LumenError::Diagnostic(diag) => diag.line(),
            LumenError::Thrown { span, .. } => span.map(|span| span.line),
            LumenError::Io(_) => None,
        }
    }

    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            LumenError::Diagnostic(diag) => Some(diag),
            _ => None,
        }
    }
}

fn line_suffix(span: &Option<SourceSpan>) -> String {
    match span {
        Some(span) => format!(" (line {})", span.line),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, LumenError>;
