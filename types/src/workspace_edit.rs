//! Ordered log of file operations and text edits describing a proposed change.

use crate::diagnostic::{Position, Range};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use thiserror::Error;
use url::Url;

/// A single text replacement within one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEdit {
    pub range: Range,
    pub new_text: String,
}

impl TextEdit {
    #[must_use]
    pub fn new(range: Range, new_text: impl Into<String>) -> Self {
        Self {
            range,
            new_text: new_text.into(),
        }
    }
}

/// Options for a file operation. All default to off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileOperationOptions {
    pub overwrite: bool,
    pub ignore_if_exists: bool,
    pub ignore_if_not_exists: bool,
    pub recursive: bool,
}

/// A create, delete, or rename of one resource.
///
/// Serialized as `{from?, to?, options}`: an absent `from` means create, an
/// absent `to` means delete. Deserialization rejects the shape with neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFileOperation", into = "RawFileOperation")]
pub enum FileOperation {
    Create {
        to: Url,
        options: FileOperationOptions,
    },
    Delete {
        from: Url,
        options: FileOperationOptions,
    },
    Rename {
        from: Url,
        to: Url,
        options: FileOperationOptions,
    },
}

impl FileOperation {
    /// Source resource; absent for creates.
    #[must_use]
    pub fn from_uri(&self) -> Option<&Url> {
        match self {
            Self::Create { .. } => None,
            Self::Delete { from, .. } | Self::Rename { from, .. } => Some(from),
        }
    }

    /// Target resource; absent for deletes.
    #[must_use]
    pub fn to_uri(&self) -> Option<&Url> {
        match self {
            Self::Delete { .. } => None,
            Self::Create { to, .. } | Self::Rename { to, .. } => Some(to),
        }
    }

    #[must_use]
    pub fn options(&self) -> FileOperationOptions {
        match self {
            Self::Create { options, .. }
            | Self::Delete { options, .. }
            | Self::Rename { options, .. } => *options,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFileOperation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    to: Option<Url>,
    #[serde(default)]
    options: FileOperationOptions,
}

#[derive(Debug, Error)]
#[error("file operation requires at least one of `from` and `to`")]
pub struct EmptyFileOperationError;

impl TryFrom<RawFileOperation> for FileOperation {
    type Error = EmptyFileOperationError;

    fn try_from(raw: RawFileOperation) -> Result<Self, EmptyFileOperationError> {
        match (raw.from, raw.to) {
            (None, Some(to)) => Ok(Self::Create {
                to,
                options: raw.options,
            }),
            (Some(from), None) => Ok(Self::Delete {
                from,
                options: raw.options,
            }),
            (Some(from), Some(to)) => Ok(Self::Rename {
                from,
                to,
                options: raw.options,
            }),
            (None, None) => Err(EmptyFileOperationError),
        }
    }
}

impl From<FileOperation> for RawFileOperation {
    fn from(op: FileOperation) -> Self {
        match op {
            FileOperation::Create { to, options } => Self {
                from: None,
                to: Some(to),
                options,
            },
            FileOperation::Delete { from, options } => Self {
                from: Some(from),
                to: None,
                options,
            },
            FileOperation::Rename { from, to, options } => Self {
                from: Some(from),
                to: Some(to),
                options,
            },
        }
    }
}

/// A text edit bound to the resource it applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTextEdit {
    pub uri: Url,
    pub edit: TextEdit,
}

/// One entry in the edit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WorkspaceEntry {
    FileOperation(FileOperation),
    TextEdit(FileTextEdit),
}

/// An ordered batch of file operations and text replacements.
///
/// Entries append in call order and are never merged or validated against
/// each other: a downstream applier processes text edits in array order,
/// even when ranges overlap. Owned by its creator until handed to an
/// apply/preview consumer, which treats it as read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceEdit {
    entries: Vec<WorkspaceEntry>,
}

impl WorkspaceEdit {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a replacement of `range` with `new_text` in `uri`.
    pub fn replace(&mut self, uri: &Url, range: Range, new_text: impl Into<String>) {
        self.entries.push(WorkspaceEntry::TextEdit(FileTextEdit {
            uri: uri.clone(),
            edit: TextEdit::new(range, new_text),
        }));
    }

    /// Append an insertion of `text` at `position` in `uri`.
    pub fn insert(&mut self, uri: &Url, position: Position, text: impl Into<String>) {
        self.replace(uri, Range::at(position), text);
    }

    /// Append a deletion of `range` in `uri`.
    pub fn delete(&mut self, uri: &Url, range: Range) {
        self.replace(uri, range, "");
    }

    pub fn create_file(&mut self, uri: &Url, options: FileOperationOptions) {
        self.entries
            .push(WorkspaceEntry::FileOperation(FileOperation::Create {
                to: uri.clone(),
                options,
            }));
    }

    pub fn delete_file(&mut self, uri: &Url, options: FileOperationOptions) {
        self.entries
            .push(WorkspaceEntry::FileOperation(FileOperation::Delete {
                from: uri.clone(),
                options,
            }));
    }

    pub fn rename_file(&mut self, from: &Url, to: &Url, options: FileOperationOptions) {
        self.entries
            .push(WorkspaceEntry::FileOperation(FileOperation::Rename {
                from: from.clone(),
                to: to.clone(),
                options,
            }));
    }

    /// Whether any text edit targets `uri`. File operations do not count.
    #[must_use]
    pub fn contains(&self, uri: &Url) -> bool {
        self.entries.iter().any(|entry| {
            matches!(entry, WorkspaceEntry::TextEdit(file_edit) if file_edit.uri == *uri)
        })
    }

    /// The text edits for `uri`, in append order.
    #[must_use]
    pub fn text_edits(&self, uri: &Url) -> Vec<&TextEdit> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                WorkspaceEntry::TextEdit(file_edit) if file_edit.uri == *uri => {
                    Some(&file_edit.edit)
                }
                _ => None,
            })
            .collect()
    }

    /// The full entry log, file operations inline at their log position.
    #[must_use]
    pub fn entries(&self) -> &[WorkspaceEntry] {
        &self.entries
    }

    /// Text edits grouped per resource, resources in order of their first
    /// appearance in the log. File operations are filtered out.
    #[must_use]
    pub fn text_edit_groups(&self) -> Vec<(&Url, Vec<&TextEdit>)> {
        let mut order: Vec<&Url> = Vec::new();
        let mut groups: HashMap<&Url, Vec<&TextEdit>> = HashMap::new();
        for entry in &self.entries {
            if let WorkspaceEntry::TextEdit(file_edit) = entry {
                groups
                    .entry(&file_edit.uri)
                    .or_insert_with(|| {
                        order.push(&file_edit.uri);
                        Vec::new()
                    })
                    .push(&file_edit.edit);
            }
        }
        order
            .into_iter()
            .map(|uri| {
                let edits = groups.remove(uri).unwrap_or_default();
                (uri, edits)
            })
            .collect()
    }

    /// Number of distinct resources with text edits. File operations do not
    /// count here either.
    #[must_use]
    pub fn len(&self) -> usize {
        self.text_edit_groups().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every text edit targeting `uri`. File operations survive.
    pub fn clear_text_edits(&mut self, uri: &Url) {
        self.entries.retain(|entry| {
            !matches!(entry, WorkspaceEntry::TextEdit(file_edit) if file_edit.uri == *uri)
        });
    }

    /// The external JSON form: grouped `[uri, TextEdit[]]` pairs.
    ///
    /// File operations are omitted from this form; consumers that need them
    /// serialize the entry log itself, which round-trips every entry kind.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let groups: Vec<serde_json::Value> = self
            .text_edit_groups()
            .into_iter()
            .map(|(uri, edits)| json!([uri.as_str(), edits]))
            .collect();
        serde_json::Value::Array(groups)
    }
}
