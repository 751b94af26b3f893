//! Diagnostic value types shared by both sides of the extension boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Zero-based position in a text document.
///
/// `character` counts Unicode scalar values within the line.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    #[must_use]
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// A span between two positions, end exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    #[must_use]
    pub const fn new(
        start_line: u32,
        start_character: u32,
        end_line: u32,
        end_character: u32,
    ) -> Self {
        Self {
            start: Position::new(start_line, start_character),
            end: Position::new(end_line, end_character),
        }
    }

    /// The empty range at `position`, as produced by insertions.
    #[must_use]
    pub const fn at(position: Position) -> Self {
        Self {
            start: position,
            end: position,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Severity level for a diagnostic.
///
/// Serialized as its numeric value (1=Error .. 4=Hint), the form diagnostics
/// carry on the boundary channel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum DiagnosticSeverity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

#[derive(Debug, Error)]
#[error("diagnostic severity must be in 1..=4, got {0}")]
pub struct InvalidSeverityError(pub u8);

impl TryFrom<u8> for DiagnosticSeverity {
    type Error = InvalidSeverityError;

    fn try_from(value: u8) -> Result<Self, InvalidSeverityError> {
        match value {
            1 => Ok(Self::Error),
            2 => Ok(Self::Warning),
            3 => Ok(Self::Information),
            4 => Ok(Self::Hint),
            other => Err(InvalidSeverityError(other)),
        }
    }
}

impl From<DiagnosticSeverity> for u8 {
    fn from(value: DiagnosticSeverity) -> Self {
        value as Self
    }
}

impl DiagnosticSeverity {
    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "info",
            Self::Hint => "hint",
        }
    }
}

/// A single issue report attached to a resource.
///
/// Immutable after construction; equality is structural. Fields are private,
/// consumers read via accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    message: String,
    severity: DiagnosticSeverity,
    range: Range,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
}

impl Diagnostic {
    #[must_use]
    pub fn new(message: impl Into<String>, severity: DiagnosticSeverity, range: Range) -> Self {
        Self {
            message: message.into(),
            severity,
            range,
            source: None,
        }
    }

    /// Attach the name of the reporting tool (e.g. "check-search").
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn severity(&self) -> DiagnosticSeverity {
        self.severity
    }

    #[must_use]
    pub fn range(&self) -> Range {
        self.range
    }

    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Format as `uri:line:character: severity: message` (1-indexed for display).
    #[must_use]
    pub fn display_with_uri(&self, uri: &Url) -> String {
        let prefix = format!(
            "{}:{}:{}: {}:",
            uri,
            self.range.start.line + 1,
            self.range.start.character + 1,
            self.severity.label(),
        );
        match &self.source {
            Some(source) => format!("{prefix} [{source}] {}", self.message),
            None => format!("{prefix} {}", self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    // ── DiagnosticSeverity ─────────────────────────────────────────────

    #[test]
    fn severity_try_from_known_values() {
        assert_eq!(
            DiagnosticSeverity::try_from(1).unwrap(),
            DiagnosticSeverity::Error
        );
        assert_eq!(
            DiagnosticSeverity::try_from(2).unwrap(),
            DiagnosticSeverity::Warning
        );
        assert_eq!(
            DiagnosticSeverity::try_from(3).unwrap(),
            DiagnosticSeverity::Information
        );
        assert_eq!(
            DiagnosticSeverity::try_from(4).unwrap(),
            DiagnosticSeverity::Hint
        );
    }

    #[test]
    fn severity_try_from_rejects_out_of_range() {
        assert!(DiagnosticSeverity::try_from(0).is_err());
        assert!(DiagnosticSeverity::try_from(5).is_err());
    }

    #[test]
    fn severity_serializes_as_number() {
        let json = serde_json::to_value(DiagnosticSeverity::Warning).unwrap();
        assert_eq!(json, serde_json::json!(2));
        let back: DiagnosticSeverity = serde_json::from_value(json).unwrap();
        assert_eq!(back, DiagnosticSeverity::Warning);
    }

    #[test]
    fn severity_is_error() {
        assert!(DiagnosticSeverity::Error.is_error());
        assert!(!DiagnosticSeverity::Warning.is_error());
        assert!(!DiagnosticSeverity::Hint.is_error());
    }

    // ── Range ──────────────────────────────────────────────────────────

    #[test]
    fn range_at_is_empty() {
        let range = Range::at(Position::new(3, 7));
        assert!(range.is_empty());
        assert_eq!(range.start, range.end);
    }

    #[test]
    fn range_new_spans_positions() {
        let range = Range::new(1, 2, 10, 4);
        assert_eq!(range.start, Position::new(1, 2));
        assert_eq!(range.end, Position::new(10, 4));
        assert!(!range.is_empty());
    }

    // ── Diagnostic ─────────────────────────────────────────────────────

    #[test]
    fn diagnostic_round_trips_through_json() {
        let diag = Diagnostic::new(
            "My diagnostic",
            DiagnosticSeverity::Error,
            Range::new(1, 2, 10, 4),
        )
        .with_source("demo");
        let json = serde_json::to_value(&diag).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "message": "My diagnostic",
                "severity": 1,
                "range": {
                    "start": { "line": 1, "character": 2 },
                    "end": { "line": 10, "character": 4 }
                },
                "source": "demo"
            })
        );
        let back: Diagnostic = serde_json::from_value(json).unwrap();
        assert_eq!(back, diag);
    }

    #[test]
    fn diagnostic_source_is_optional_on_the_wire() {
        let diag = Diagnostic::new("m", DiagnosticSeverity::Hint, Range::default());
        let json = serde_json::to_value(&diag).unwrap();
        assert!(json.get("source").is_none());
        let back: Diagnostic = serde_json::from_value(json).unwrap();
        assert_eq!(back.source(), None);
    }

    #[test]
    fn display_with_uri_is_one_indexed() {
        let diag = Diagnostic::new(
            "expected `;`",
            DiagnosticSeverity::Error,
            Range::new(10, 5, 10, 6),
        )
        .with_source("checker");
        assert_eq!(
            diag.display_with_uri(&uri("file:///src/main.rs")),
            "file:///src/main.rs:11:6: error: [checker] expected `;`"
        );
    }

    #[test]
    fn display_with_uri_without_source() {
        let diag = Diagnostic::new("unused variable", DiagnosticSeverity::Warning, Range::default());
        assert_eq!(
            diag.display_with_uri(&uri("file:///lib.rs")),
            "file:///lib.rs:1:1: warning: unused variable"
        );
    }
}
