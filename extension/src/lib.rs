//! Extension half of the boundary.
//!
//! An extension connects with [`ExtensionHost::connect`] (or
//! [`ExtensionHost::stdio`] when spawned as a child process) and programs
//! against two facades: [`diagnostics`](ExtensionHost::diagnostics) for
//! publishing diagnostic collections and [`search`](ExtensionHost::search)
//! for issuing searches and contributing transformers and providers.

pub mod diagnostics;
pub mod runtime;
pub mod search;

pub use diagnostics::{DiagnosticCollectionHandle, ExtDiagnostics};
pub use runtime::{ExtensionError, ExtensionHost};
pub use search::{
    Disposal, ExtSearch, ProvideFut, QueryTransformer, TextSearchProvider, TransformFut,
};
