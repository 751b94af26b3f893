//! Render a [`WorkspaceEdit`] as unified diffs against current file
//! content.

use quarry_types::diagnostic::Position;
use quarry_types::workspace_edit::{FileOperation, TextEdit, WorkspaceEdit, WorkspaceEntry};
use similar::{ChangeTag, TextDiff};
use thiserror::Error;
use url::Url;

use crate::services::{FileSystemError, FileSystemService};

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error(transparent)]
    FileSystem(#[from] FileSystemError),
}

/// Preview of the changes to one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePreview {
    pub uri: Url,
    /// Unified diff body; empty when the edits are a no-op.
    pub diff: String,
    pub additions: u32,
    pub deletions: u32,
}

/// Preview of a whole [`WorkspaceEdit`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceEditPreview {
    pub files: Vec<FilePreview>,
    /// All sections concatenated, file-operation headers included.
    pub patch: String,
}

impl WorkspaceEditPreview {
    #[must_use]
    pub fn total_additions(&self) -> u32 {
        self.files.iter().map(|f| f.additions).sum()
    }

    #[must_use]
    pub fn total_deletions(&self) -> u32 {
        self.files.iter().map(|f| f.deletions).sum()
    }
}

/// Compute the preview for `edit`.
///
/// Per text-edited resource: read the current content through the
/// file-system capability, apply that resource's edits in array order
/// (each against the then-current text), and diff old against new. File
/// operations render as headers at their log position: a delete also
/// diffs the current content to empty, a create introduces an empty file.
pub async fn compute_workspace_edit_diff(
    fs: &FileSystemService,
    edit: &WorkspaceEdit,
) -> Result<WorkspaceEditPreview, PreviewError> {
    let mut preview = WorkspaceEditPreview::default();

    for entry in edit.entries() {
        if let WorkspaceEntry::FileOperation(op) = entry {
            match op {
                FileOperation::Create { to, .. } => {
                    preview.patch.push_str(&format!("create {to}\n"));
                }
                FileOperation::Delete { from, .. } => {
                    let old = fs.read_file(from).await?;
                    let file = diff_file(from.clone(), &old, "");
                    preview.patch.push_str(&format!("delete {from}\n"));
                    preview.patch.push_str(&file.diff);
                    preview.files.push(file);
                }
                FileOperation::Rename { from, to, .. } => {
                    preview.patch.push_str(&format!("rename {from} -> {to}\n"));
                }
            }
        }
    }

    for (uri, edits) in edit.text_edit_groups() {
        let old = fs.read_file(uri).await?;
        let new = apply_text_edits(&old, &edits);
        let file = diff_file(uri.clone(), &old, &new);
        preview.patch.push_str(&file.diff);
        preview.files.push(file);
    }

    Ok(preview)
}

/// Apply `edits` to `text` in array order.
///
/// Each edit sees the text produced by the previous one; positions beyond
/// the document clamp to its bounds.
#[must_use]
pub fn apply_text_edits(text: &str, edits: &[&TextEdit]) -> String {
    let mut current = text.to_string();
    for edit in edits {
        let start = offset_of(&current, edit.range.start);
        let end = offset_of(&current, edit.range.end).max(start);
        current.replace_range(start..end, &edit.new_text);
    }
    current
}

/// Byte offset of `position`, clamped to document and line bounds.
///
/// `character` counts Unicode scalar values within the line.
fn offset_of(text: &str, position: Position) -> usize {
    let mut line_start = 0usize;
    for _ in 0..position.line {
        match text[line_start..].find('\n') {
            Some(i) => line_start += i + 1,
            None => return text.len(),
        }
    }
    let line_end = text[line_start..]
        .find('\n')
        .map_or(text.len(), |i| line_start + i);
    match text[line_start..line_end]
        .char_indices()
        .nth(position.character as usize)
    {
        Some((idx, _)) => line_start + idx,
        None => line_end,
    }
}

fn diff_file(uri: Url, old: &str, new: &str) -> FilePreview {
    let diff = TextDiff::from_lines(old, new);

    let mut additions = 0u32;
    let mut deletions = 0u32;
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => additions += 1,
            ChangeTag::Delete => deletions += 1,
            ChangeTag::Equal => {}
        }
    }

    let body = if additions == 0 && deletions == 0 {
        String::new()
    } else {
        let header_old = format!("a/{}", display_path(&uri));
        let header_new = format!("b/{}", display_path(&uri));
        diff.unified_diff()
            .context_radius(3)
            .header(&header_old, &header_new)
            .to_string()
    };

    FilePreview {
        uri,
        diff: body,
        additions,
        deletions,
    }
}

/// Path shown in diff headers: the URI path for file URIs, otherwise the
/// full URI.
fn display_path(uri: &Url) -> String {
    if uri.scheme() == "file" {
        uri.path().trim_start_matches('/').to_string()
    } else {
        uri.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{FileProvider, ReadFileFut};
    use quarry_types::diagnostic::Range;
    use quarry_types::workspace_edit::FileOperationOptions;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct MapFs(HashMap<Url, String>);

    impl FileProvider for MapFs {
        fn read_file<'a>(&'a self, uri: &'a Url) -> ReadFileFut<'a> {
            let result = self
                .0
                .get(uri)
                .cloned()
                .ok_or_else(|| FileSystemError::NotFound(uri.clone()));
            Box::pin(async move { result })
        }
    }

    fn service_with(files: &[(&Url, &str)]) -> FileSystemService {
        let map: HashMap<Url, String> = files
            .iter()
            .map(|(uri, content)| ((*uri).clone(), (*content).to_string()))
            .collect();
        let service = FileSystemService::new();
        service.set_provider(Arc::new(MapFs(map)));
        service
    }

    fn uri(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    // ── Edit application ────────────────────────────────────────────────────

    #[test]
    fn offsets_count_scalar_values_and_clamp() {
        let text = "aé b\nsecond";
        assert_eq!(offset_of(text, Position::new(0, 0)), 0);
        // 'é' is 2 bytes; character 2 lands after it.
        assert_eq!(offset_of(text, Position::new(0, 2)), 3);
        assert_eq!(offset_of(text, Position::new(0, 99)), 5, "clamps to line end");
        assert_eq!(offset_of(text, Position::new(1, 0)), 6);
        assert_eq!(offset_of(text, Position::new(9, 0)), text.len());
    }

    #[test]
    fn edits_apply_in_array_order_against_current_text() {
        let edits = [
            TextEdit::new(Range::new(0, 0, 0, 5), "let"),
            TextEdit::new(Range::new(0, 4, 0, 5), "y"),
        ];
        let refs: Vec<&TextEdit> = edits.iter().collect();
        // The second edit targets the text the first edit produced.
        assert_eq!(apply_text_edits("const x = 1", &refs), "let y = 1");
    }

    #[test]
    fn insertion_and_deletion_edits() {
        let insert = [TextEdit::new(Range::new(0, 5, 0, 5), "new ")];
        let refs: Vec<&TextEdit> = insert.iter().collect();
        assert_eq!(apply_text_edits("some text", &refs), "some new text");

        let delete = [TextEdit::new(Range::new(0, 4, 0, 9), "")];
        let refs: Vec<&TextEdit> = delete.iter().collect();
        assert_eq!(apply_text_edits("some text", &refs), "some");
    }

    // ── Preview ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn single_file_preview_counts_lines() {
        let a = uri("file:///src/a.rs");
        let fs = service_with(&[(&a, "const x = 1;\nkeep me\n")]);

        let mut edit = WorkspaceEdit::new();
        edit.replace(&a, Range::new(0, 0, 0, 5), "let");

        let preview = compute_workspace_edit_diff(&fs, &edit).await.unwrap();
        assert_eq!(preview.files.len(), 1);
        let file = &preview.files[0];
        assert_eq!((file.additions, file.deletions), (1, 1));
        assert!(file.diff.contains("-const x = 1;"));
        assert!(file.diff.contains("+let x = 1;"));
        assert!(file.diff.contains("a/src/a.rs"));
    }

    #[tokio::test]
    async fn multi_file_grouping_follows_first_appearance() {
        let a = uri("file:///a.txt");
        let b = uri("file:///b.txt");
        let fs = service_with(&[(&a, "one\n"), (&b, "two\n")]);

        let mut edit = WorkspaceEdit::new();
        edit.replace(&b, Range::new(0, 0, 0, 3), "2");
        edit.replace(&a, Range::new(0, 0, 0, 3), "1");
        edit.replace(&b, Range::new(0, 1, 0, 1), "!");

        let preview = compute_workspace_edit_diff(&fs, &edit).await.unwrap();
        let uris: Vec<&Url> = preview.files.iter().map(|f| &f.uri).collect();
        assert_eq!(uris, [&b, &a]);
        assert!(preview.files[0].diff.contains("+2!"));
    }

    #[tokio::test]
    async fn file_operations_render_headers_and_delete_diffs() {
        let doomed = uri("file:///old.txt");
        let fs = service_with(&[(&doomed, "gone soon\n")]);

        let mut edit = WorkspaceEdit::new();
        edit.create_file(&uri("file:///new.txt"), FileOperationOptions::default());
        edit.delete_file(&doomed, FileOperationOptions::default());
        edit.rename_file(
            &uri("file:///from.txt"),
            &uri("file:///to.txt"),
            FileOperationOptions::default(),
        );

        let preview = compute_workspace_edit_diff(&fs, &edit).await.unwrap();
        assert!(preview.patch.contains("create file:///new.txt"));
        assert!(preview.patch.contains("delete file:///old.txt"));
        assert!(preview.patch.contains("rename file:///from.txt -> file:///to.txt"));
        assert_eq!(preview.files.len(), 1);
        assert_eq!(preview.files[0].deletions, 1);
        assert!(preview.files[0].diff.contains("-gone soon"));
    }

    #[tokio::test]
    async fn missing_file_propagates_file_system_error() {
        let fs = service_with(&[]);
        let mut edit = WorkspaceEdit::new();
        edit.replace(&uri("file:///nope.txt"), Range::new(0, 0, 0, 1), "x");

        let err = compute_workspace_edit_diff(&fs, &edit).await.unwrap_err();
        assert!(matches!(
            err,
            PreviewError::FileSystem(FileSystemError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn noop_edit_produces_empty_diff() {
        let a = uri("file:///a.txt");
        let fs = service_with(&[(&a, "same\n")]);
        let mut edit = WorkspaceEdit::new();
        edit.replace(&a, Range::new(0, 0, 0, 4), "same");

        let preview = compute_workspace_edit_diff(&fs, &edit).await.unwrap();
        assert_eq!(preview.files[0].diff, "");
        assert_eq!(preview.total_additions(), 0);
        assert_eq!(preview.total_deletions(), 0);
    }
}
