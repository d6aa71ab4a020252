//! Unified Diagnostics Module
//!
//! Single diagnostic type used across parse, validation, and generation.
//! Recoverable issues are collected as data so the caller decides whether a
//! warning should stop the pipeline.

use serde::{Deserialize, Serialize};

/// Diagnostic severity level
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Diagnostic codes for categorizing issues
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // =========================================================================
    // Parse warnings
    // =========================================================================
    MissingHeader,
    DuplicateEntity,
    DuplicateField,
    ImplicitEntity,
    MissingLabel,

    // =========================================================================
    // Validation findings
    // =========================================================================
    MissingPrimaryKey,
    MultiplePrimaryKeys,
    SelfReference,
    MultipleParentalRelationships,
    OrphanedEntity,
    NamingCollision,
    UnresolvedForeignKey,

    // =========================================================================
    // Generation findings
    // =========================================================================
    AmbiguousJunction,
    UnknownFieldType,
    UnboundForeignKey,
    ChoiceSetOverridden,
    SynthesizedJunction,
    UnsupportedKeyAttribute,
}

/// Source location span
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl SourceSpan {
    pub fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Zero-width span at a single position
    pub fn point(line: u32, col: u32) -> Self {
        Self::new(line, col, line, col)
    }
}

/// A diagnostic message with location, severity, and the entity it concerns
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    pub span: Option<SourceSpan>,
    /// Entity (or choice set) the finding is about, when there is one
    pub subject: Option<String>,
}

impl Diagnostic {
    /// Create an error diagnostic
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Error, code, message)
    }

    /// Create a warning diagnostic
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Warning, code, message)
    }

    /// Create an info diagnostic
    pub fn info(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Info, code, message)
    }

    fn with_severity(severity: Severity, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            span: None,
            subject: None,
        }
    }

    /// Add source span
    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    /// Attach a 1-based source line when only the line is known
    pub fn at_line(self, line: u32) -> Self {
        if line == 0 {
            return self;
        }
        self.with_span(SourceSpan::point(line, 1))
    }

    /// Name the entity this diagnostic concerns
    pub fn about(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }

    pub fn is_warning(&self) -> bool {
        matches!(self.severity, Severity::Warning)
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        match &self.span {
            Some(span) => write!(
                f,
                "{}[{:?}] line {}, column {}: {}",
                level, self.code, span.start_line, span.start_col, self.message
            ),
            None => write!(f, "{}[{:?}]: {}", level, self.code, self.message),
        }
    }
}

// =============================================================================
// Collections
// =============================================================================

/// Ordered collection of diagnostics
///
/// Iteration is lazy and restartable: every call to [`Diagnostics::iter`]
/// yields a fresh cursor, and the cursors themselves are `Clone`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    pub fn extend(&mut self, other: impl IntoIterator<Item = Diagnostic>) {
        self.0.extend(other);
    }

    pub fn iter(&self) -> DiagnosticIter<'_> {
        DiagnosticIter {
            inner: self.0.iter(),
            filter: None,
        }
    }

    pub fn errors(&self) -> DiagnosticIter<'_> {
        DiagnosticIter {
            inner: self.0.iter(),
            filter: Some(Severity::Error),
        }
    }

    pub fn warnings(&self) -> DiagnosticIter<'_> {
        DiagnosticIter {
            inner: self.0.iter(),
            filter: Some(Severity::Warning),
        }
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(Diagnostic::is_error)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Count diagnostics carrying a given code
    pub fn count_code(&self, code: DiagnosticCode) -> usize {
        self.0.iter().filter(|d| d.code == code).count()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.0
    }
}

impl From<Vec<Diagnostic>> for Diagnostics {
    fn from(items: Vec<Diagnostic>) -> Self {
        Self(items)
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = DiagnosticIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Borrowing cursor over a [`Diagnostics`] collection, optionally filtered by severity
#[derive(Clone, Debug)]
pub struct DiagnosticIter<'a> {
    inner: std::slice::Iter<'a, Diagnostic>,
    filter: Option<Severity>,
}

impl<'a> Iterator for DiagnosticIter<'a> {
    type Item = &'a Diagnostic;

    fn next(&mut self) -> Option<Self::Item> {
        match self.filter {
            None => self.inner.next(),
            Some(severity) => self.inner.by_ref().find(|d| d.severity == severity),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let diag = Diagnostic::error(DiagnosticCode::NamingCollision, "collides");
        assert!(diag.is_error());
        assert!(!diag.is_warning());
        assert_eq!(diag.message, "collides");
    }

    #[test]
    fn test_with_span_and_subject() {
        let diag = Diagnostic::warning(DiagnosticCode::OrphanedEntity, "alone")
            .at_line(4)
            .about("Customer");
        assert_eq!(diag.span.map(|s| s.start_line), Some(4));
        assert_eq!(diag.subject.as_deref(), Some("Customer"));
    }

    #[test]
    fn test_iteration_is_restartable() {
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::warning(DiagnosticCode::DuplicateEntity, "a"));
        diags.push(Diagnostic::error(DiagnosticCode::NamingCollision, "b"));
        diags.push(Diagnostic::warning(DiagnosticCode::ImplicitEntity, "c"));

        let warnings = diags.warnings();
        let replay = warnings.clone();
        assert_eq!(warnings.count(), 2);
        assert_eq!(replay.count(), 2);
        assert_eq!(diags.iter().count(), 3);
        assert_eq!(diags.errors().count(), 1);
        assert!(diags.has_errors());
    }
}
