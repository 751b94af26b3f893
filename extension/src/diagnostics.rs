//! Extension-side diagnostics API.
//!
//! Extensions create named collections and mutate them; every mutation
//! republishes the union of all live collections to the client as one
//! `$acceptDiagnosticsData` snapshot.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use quarry_proto::channel::Endpoint;
use quarry_proto::envelope::{AcceptDiagnosticsDataParams, methods};
use quarry_types::{Diagnostic, DiagnosticCollection};
use url::Url;

use crate::runtime::ExtensionError;

/// Diagnostics facade handed out by [`crate::ExtensionHost`].
pub struct ExtDiagnostics {
    endpoint: Endpoint,
    /// Live collections in creation order, keyed by a monotonic id so the
    /// published union is deterministic.
    collections: Arc<Mutex<BTreeMap<u64, DiagnosticCollection>>>,
    next_key: AtomicU64,
}

impl ExtDiagnostics {
    pub(crate) fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            collections: Arc::new(Mutex::new(BTreeMap::new())),
            next_key: AtomicU64::new(1),
        }
    }

    /// Create a named collection. Names need not be unique; each call
    /// creates an independent collection.
    pub fn create_diagnostic_collection(&self, name: &str) -> DiagnosticCollectionHandle {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        self.collections
            .lock()
            .expect("collections lock poisoned")
            .insert(key, DiagnosticCollection::new(name));
        DiagnosticCollectionHandle {
            endpoint: self.endpoint.clone(),
            collections: self.collections.clone(),
            key,
        }
    }

    /// The merged view across all live collections, sorted by URI, with
    /// overlapping URIs concatenated in collection-creation order.
    #[must_use]
    pub fn get_diagnostics(&self) -> Vec<(Url, Vec<Diagnostic>)> {
        let collections = self.collections.lock().expect("collections lock poisoned");
        merged_snapshot(&collections)
    }

    /// Per-resource lookup.
    pub fn get_diagnostics_for(&self, _uri: &Url) -> Result<Vec<Diagnostic>, ExtensionError> {
        Err(ExtensionError::Unimplemented("getDiagnostics(resource)"))
    }
}

fn merged_snapshot(
    collections: &BTreeMap<u64, DiagnosticCollection>,
) -> Vec<(Url, Vec<Diagnostic>)> {
    let mut merged = DiagnosticCollection::new("");
    for collection in collections.values() {
        for (uri, diagnostics) in collection.entries() {
            merged.merge(uri, diagnostics.to_vec());
        }
    }
    merged.to_entries()
}

/// One extension-owned diagnostic collection.
///
/// Mutations apply locally, then publish the union snapshot across all
/// collections. The handle is a capability; dropping it without calling
/// [`unsubscribe`](Self::unsubscribe) leaves the collection's state live.
pub struct DiagnosticCollectionHandle {
    endpoint: Endpoint,
    collections: Arc<Mutex<BTreeMap<u64, DiagnosticCollection>>>,
    key: u64,
}

impl DiagnosticCollectionHandle {
    /// Replace the diagnostics for `uri`. An empty list removes the key.
    pub async fn set(
        &self,
        uri: &Url,
        diagnostics: Vec<Diagnostic>,
    ) -> Result<(), ExtensionError> {
        self.mutate(|collection| collection.set(uri, diagnostics))
            .await
    }

    /// Append to the diagnostics for `uri`.
    pub async fn merge(
        &self,
        uri: &Url,
        diagnostics: Vec<Diagnostic>,
    ) -> Result<(), ExtensionError> {
        self.mutate(|collection| collection.merge(uri, diagnostics))
            .await
    }

    /// Remove the diagnostics for `uri`.
    pub async fn delete(&self, uri: &Url) -> Result<(), ExtensionError> {
        self.mutate(|collection| {
            collection.delete(uri);
        })
        .await
    }

    /// Drop every entry in this collection.
    pub async fn clear(&self) -> Result<(), ExtensionError> {
        self.mutate(DiagnosticCollection::clear).await
    }

    /// Retire the collection: remove it from the published union entirely.
    pub async fn unsubscribe(self) -> Result<(), ExtensionError> {
        let snapshot = {
            let mut collections = self.collections.lock().expect("collections lock poisoned");
            collections.remove(&self.key);
            merged_snapshot(&collections)
        };
        self.publish(snapshot).await
    }

    #[must_use]
    pub fn get(&self, uri: &Url) -> Option<Vec<Diagnostic>> {
        let collections = self.collections.lock().expect("collections lock poisoned");
        collections
            .get(&self.key)
            .and_then(|collection| collection.get(uri).map(<[Diagnostic]>::to_vec))
    }

    #[must_use]
    pub fn contains(&self, uri: &Url) -> bool {
        let collections = self.collections.lock().expect("collections lock poisoned");
        collections
            .get(&self.key)
            .is_some_and(|collection| collection.contains(uri))
    }

    /// Owned snapshot of this collection's entries, sorted by URI.
    #[must_use]
    pub fn entries(&self) -> Vec<(Url, Vec<Diagnostic>)> {
        let collections = self.collections.lock().expect("collections lock poisoned");
        collections
            .get(&self.key)
            .map(DiagnosticCollection::to_entries)
            .unwrap_or_default()
    }

    async fn mutate(
        &self,
        apply: impl FnOnce(&mut DiagnosticCollection),
    ) -> Result<(), ExtensionError> {
        let snapshot = {
            let mut collections = self.collections.lock().expect("collections lock poisoned");
            if let Some(collection) = collections.get_mut(&self.key) {
                apply(collection);
            }
            merged_snapshot(&collections)
        };
        self.publish(snapshot).await
    }

    async fn publish(&self, updates: Vec<(Url, Vec<Diagnostic>)>) -> Result<(), ExtensionError> {
        self.endpoint
            .notify(
                methods::ACCEPT_DIAGNOSTICS_DATA,
                &AcceptDiagnosticsDataParams { updates },
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_types::diagnostic::{DiagnosticSeverity, Range};

    fn uri(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn diag(msg: &str) -> Diagnostic {
        Diagnostic::new(msg, DiagnosticSeverity::Error, Range::new(0, 0, 0, 1))
    }

    #[test]
    fn merged_snapshot_concatenates_in_creation_order() {
        let mut collections = BTreeMap::new();
        let a = uri("file:///a.rs");

        let mut lint = DiagnosticCollection::new("lint");
        lint.set(&a, vec![diag("from lint")]);
        collections.insert(1, lint);

        let mut deps = DiagnosticCollection::new("deps");
        deps.set(&a, vec![diag("from deps")]);
        collections.insert(2, deps);

        let merged = merged_snapshot(&collections);
        assert_eq!(merged.len(), 1);
        let messages: Vec<_> = merged[0].1.iter().map(Diagnostic::message).collect();
        assert_eq!(messages, ["from lint", "from deps"]);
    }

    #[test]
    fn merged_snapshot_is_sorted_by_uri() {
        let mut collections = BTreeMap::new();
        let mut lint = DiagnosticCollection::new("lint");
        lint.set(&uri("file:///b.rs"), vec![diag("b")]);
        lint.set(&uri("file:///a.rs"), vec![diag("a")]);
        collections.insert(1, lint);

        let merged = merged_snapshot(&collections);
        assert_eq!(merged[0].0, uri("file:///a.rs"));
        assert_eq!(merged[1].0, uri("file:///b.rs"));
    }
}
