//! Diagnostics and error interfaces.
//!
//! Nothing in this crate aborts a compile. Errors found while lexing, parsing,
//! or assembling are *attached* to the token that caused them as an
//! [`Annotation`] and collected into a [`Diagnostics`] table, which the host
//! (typically an editor) queries to render inline markers.
//!
//! The [`Error`] trait is implemented by the crate's error enums and adds
//! an optional help message on top of the usual `Display` text;
//! [`Diagnostics::report`] attaches both.

use std::borrow::Cow;
use std::ops::Range;

/// A byte range in the source text.
pub type Span = Range<usize>;

/// Extension trait for the crate's error types.
pub trait Error: std::error::Error {
    /// A help message suggesting how to resolve this error, if there is one.
    fn help(&self) -> Option<Cow<str>> {
        None
    }
}

/// How severe an [`Annotation`] is.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub enum Severity {
    /// Purely informational.
    Info,
    /// Suspicious but not wrong; never fails a compile.
    Warning,
    /// Wrong; the compile is reported as failed, but still completes.
    Error,
}
impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => f.write_str("info"),
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// A message attached to a token.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Annotation {
    /// How severe the message is.
    pub severity: Severity,
    /// The message text.
    pub message: String,
    /// The index of the token this annotation is attached to.
    pub token: usize,
    /// The byte span of the offending source text.
    pub span: Span,
}

/// All annotations produced by one compile, queryable by token.
///
/// Tokens themselves stay immutable; this side table is what "attaching a
/// severity to a token" means in practice. Queries are pull-based: the host
/// asks, nothing is pushed.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Diagnostics {
    notes: Vec<Annotation>,
}

impl Diagnostics {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches an error to the given token.
    pub fn error(&mut self, token: usize, span: Span, message: impl Into<String>) {
        self.push(Severity::Error, token, span, message);
    }

    /// Attaches a warning to the given token.
    pub fn warning(&mut self, token: usize, span: Span, message: impl Into<String>) {
        self.push(Severity::Warning, token, span, message);
    }

    /// Attaches an informational note to the given token.
    pub fn info(&mut self, token: usize, span: Span, message: impl Into<String>) {
        self.push(Severity::Info, token, span, message);
    }

    /// Attaches a crate error to the given token, followed by its help
    /// text as an informational note when it has one.
    pub fn report(&mut self, token: usize, span: Span, err: &dyn Error) {
        self.push(Severity::Error, token, span.clone(), err.to_string());
        if let Some(help) = err.help() {
            self.push(Severity::Info, token, span, format!("help: {help}"));
        }
    }

    fn push(&mut self, severity: Severity, token: usize, span: Span, message: impl Into<String>) {
        self.notes.push(Annotation { severity, message: message.into(), token, span });
    }

    /// Iterates over every annotation, in the order they were attached.
    pub fn iter(&self) -> impl Iterator<Item = &Annotation> + '_ {
        self.notes.iter()
    }

    /// Iterates over the annotations attached to one token.
    pub fn for_token(&self, token: usize) -> impl Iterator<Item = &Annotation> + '_ {
        self.notes.iter().filter(move |a| a.token == token)
    }

    /// Whether any error-severity annotation was attached.
    ///
    /// A compile is reported as failed iff this is true; warnings never
    /// fail a compile.
    pub fn has_errors(&self) -> bool {
        self.notes.iter().any(|a| a.severity == Severity::Error)
    }

    /// Counts the error-severity annotations.
    pub fn error_count(&self) -> usize {
        self.notes.iter().filter(|a| a.severity == Severity::Error).count()
    }

    /// Total number of annotations.
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    /// Whether no annotations were attached at all.
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}
