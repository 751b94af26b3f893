//! Core domain types for Quarry.
//!
//! Pure data with no IO and no async. The wire protocol and both endpoint
//! crates build on these values.

pub mod action;
pub mod collection;
pub mod diagnostic;
pub mod ids;
pub mod search;
pub mod settings;
pub mod workspace_edit;

pub use action::CodeAction;
pub use collection::DiagnosticCollection;
pub use diagnostic::{Diagnostic, DiagnosticSeverity, InvalidSeverityError, Position, Range};
pub use ids::{ProviderId, RegistrationId, RequestId};
pub use search::{
    IncludeExcludePatterns, PatternKind, TextSearchOptions, TextSearchParams, TextSearchQuery,
    TextSearchResult,
};
pub use settings::{
    PullRequest, PullRequestBase, PullRequestTemplate, SubmittedPullRequest, ThreadSettings,
};
pub use workspace_edit::{
    EmptyFileOperationError, FileOperation, FileOperationOptions, FileTextEdit, TextEdit,
    WorkspaceEdit, WorkspaceEntry,
};
