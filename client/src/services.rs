//! Client-authoritative services the UI reads from and the extension host
//! pushes into.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use quarry_types::{Diagnostic, DiagnosticCollection};
use thiserror::Error;
use tokio::sync::watch;
use url::Url;

/// The client-side diagnostics store.
///
/// Holds one collection fed by snapshot pushes from the extension host.
/// Every accepted snapshot replaces the previous state wholesale and bumps
/// a change version; UI consumers watch the version and re-read
/// [`DiagnosticsService::entries`] after each bump. The collection itself
/// exposes no live view.
pub struct DiagnosticsService {
    collection: Mutex<DiagnosticCollection>,
    changes: watch::Sender<u64>,
}

impl Default for DiagnosticsService {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticsService {
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            collection: Mutex::new(DiagnosticCollection::new("")),
            changes,
        }
    }

    /// Apply a snapshot from the extension host.
    ///
    /// The snapshot is authoritative: the whole collection is replaced,
    /// with duplicate URIs within one snapshot concatenating in order.
    pub fn accept(&self, updates: Vec<(Url, Vec<Diagnostic>)>) {
        {
            let mut collection = self.collection.lock().expect("diagnostics lock poisoned");
            collection.set_entries(updates);
        }
        self.changes.send_modify(|version| *version += 1);
    }

    /// Owned snapshot of the current entries, sorted by URI.
    #[must_use]
    pub fn entries(&self) -> Vec<(Url, Vec<Diagnostic>)> {
        self.collection
            .lock()
            .expect("diagnostics lock poisoned")
            .to_entries()
    }

    #[must_use]
    pub fn get(&self, uri: &Url) -> Option<Vec<Diagnostic>> {
        self.collection
            .lock()
            .expect("diagnostics lock poisoned")
            .get(uri)
            .map(<[Diagnostic]>::to_vec)
    }

    /// Subscribe to the change version. The value only ever increases.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        *self.changes.borrow()
    }
}

/// Future type for [`FileProvider::read_file`].
pub type ReadFileFut<'a> = Pin<Box<dyn Future<Output = Result<String, FileSystemError>> + Send + 'a>>;

/// The "read file" capability consumed by the core.
///
/// Embedders supply an implementation; two ship with this crate
/// ([`crate::fs_search::LocalFileSystem`] for `file://` URIs and
/// [`crate::contributions::GraphQlFileSystem`] for `git://` repo URIs).
pub trait FileProvider: Send + Sync {
    fn read_file<'a>(&'a self, uri: &'a Url) -> ReadFileFut<'a>;
}

#[derive(Debug, Error)]
pub enum FileSystemError {
    #[error("no file system provider registered")]
    NoProvider,
    #[error("file not found: {0}")]
    NotFound(Url),
    #[error("unsupported uri {uri}: {reason}")]
    UnsupportedUri { uri: Url, reason: String },
    #[error("reading {uri}: {message}")]
    Read { uri: Url, message: String },
}

/// Single-slot holder for the active [`FileProvider`].
///
/// Setting a new provider replaces the previous one, mirroring the
/// one-provider contract of the observed system.
#[derive(Default)]
pub struct FileSystemService {
    provider: Mutex<Option<Arc<dyn FileProvider>>>,
}

impl FileSystemService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_provider(&self, provider: Arc<dyn FileProvider>) {
        *self.provider.lock().expect("file provider lock poisoned") = Some(provider);
    }

    pub fn clear_provider(&self) {
        *self.provider.lock().expect("file provider lock poisoned") = None;
    }

    #[must_use]
    pub fn has_provider(&self) -> bool {
        self.provider
            .lock()
            .expect("file provider lock poisoned")
            .is_some()
    }

    pub async fn read_file(&self, uri: &Url) -> Result<String, FileSystemError> {
        let provider = self
            .provider
            .lock()
            .expect("file provider lock poisoned")
            .clone()
            .ok_or(FileSystemError::NoProvider)?;
        provider.read_file(uri).await
    }
}
