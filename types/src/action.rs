//! Code actions: titled workspace edits proposed against diagnostics.

use crate::diagnostic::Diagnostic;
use crate::workspace_edit::WorkspaceEdit;
use serde::{Deserialize, Serialize};

/// A proposed fix: a titled workspace edit, optionally bound to the
/// diagnostics it resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeAction {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit: Option<WorkspaceEdit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl CodeAction {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            edit: None,
            diagnostics: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_edit(mut self, edit: WorkspaceEdit) -> Self {
        self.edit = Some(edit);
        self
    }

    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Vec<Diagnostic>) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::{DiagnosticSeverity, Range};
    use url::Url;

    #[test]
    fn bare_action_serializes_title_only() {
        let action = CodeAction::new("Replace const -> let");
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json, serde_json::json!({ "title": "Replace const -> let" }));
    }

    #[test]
    fn action_round_trips_with_edit_and_diagnostics() {
        let uri = Url::parse("file:///a.ts").unwrap();
        let mut edit = WorkspaceEdit::new();
        edit.replace(&uri, Range::new(0, 0, 0, 5), "let");
        let action = CodeAction::new("Replace const -> let")
            .with_edit(edit)
            .with_diagnostics(vec![Diagnostic::new(
                "My diagnostic",
                DiagnosticSeverity::Error,
                Range::new(1, 2, 10, 4),
            )]);

        let json = serde_json::to_value(&action).unwrap();
        let back: CodeAction = serde_json::from_value(json).unwrap();
        assert_eq!(back, action);
        assert!(back.edit.is_some());
        assert_eq!(back.diagnostics.len(), 1);
    }
}
