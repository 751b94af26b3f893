//! The documented local workflow end to end: search a directory, propose
//! a workspace edit for the hits, preview it as a unified diff.

use std::fs;
use std::sync::Arc;

use quarry_client::fs_search::{FsTextSearchProvider, LocalFileSystem};
use quarry_client::host::ClientServices;
use quarry_client::preview::compute_workspace_edit_diff;
use quarry_types::action::CodeAction;
use quarry_types::diagnostic::Range;
use quarry_types::search::{TextSearchParams, TextSearchQuery};
use quarry_types::workspace_edit::WorkspaceEdit;

#[tokio::test]
async fn search_edit_preview_workflow() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("config.js"),
        "const port = 3000;\nconst host = \"localhost\";\n",
    )
    .unwrap();
    fs::write(dir.path().join("readme.md"), "no matches here\n").unwrap();

    let services = ClientServices::new();
    services.file_system.set_provider(Arc::new(LocalFileSystem));
    let _provider = services
        .search
        .providers()
        .register(Arc::new(FsTextSearchProvider::new(dir.path())));

    let results = services
        .find_text_in_files(TextSearchParams::new(TextSearchQuery::literal("const ")))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    let uri = results[0].uri.clone();

    let mut edit = WorkspaceEdit::new();
    edit.replace(&uri, Range::new(0, 0, 0, 5), "let");
    edit.replace(&uri, Range::new(1, 0, 1, 5), "let");
    let action = CodeAction::new("Replace const with let").with_edit(edit);

    let edit = action.edit.as_ref().unwrap();
    let preview = compute_workspace_edit_diff(&services.file_system, edit)
        .await
        .unwrap();

    assert_eq!(preview.files.len(), 1);
    assert_eq!(preview.files[0].uri, uri);
    assert_eq!(preview.total_deletions(), 2);
    assert_eq!(preview.total_additions(), 2);
    assert!(preview.patch.contains("-const port = 3000;"));
    assert!(preview.patch.contains("+let port = 3000;"));
    assert!(preview.patch.contains("+let host = \"localhost\";"));
}
