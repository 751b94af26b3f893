//! Named collection of diagnostics keyed by resource URI.

use crate::diagnostic::Diagnostic;
use std::collections::HashMap;
use url::Url;

/// A named mapping from resource URI to the diagnostics currently reported
/// against it.
///
/// A URI is present iff it has at least one diagnostic; storing an empty
/// list removes the key. The name identifies the logical feature that owns
/// the collection and is not required to be unique.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticCollection {
    name: String,
    data: HashMap<Url, Vec<Diagnostic>>,
}

impl DiagnosticCollection {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: HashMap::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the diagnostics for `uri`. An empty list removes the key.
    pub fn set(&mut self, uri: &Url, diagnostics: Vec<Diagnostic>) {
        if diagnostics.is_empty() {
            self.data.remove(uri);
        } else {
            self.data.insert(uri.clone(), diagnostics);
        }
    }

    /// Append to the diagnostics for `uri`, creating the key if absent.
    ///
    /// Appending an empty list leaves the collection unchanged, so the
    /// absent-not-empty invariant holds.
    pub fn merge(&mut self, uri: &Url, diagnostics: Vec<Diagnostic>) {
        if diagnostics.is_empty() {
            return;
        }
        self.data.entry(uri.clone()).or_default().extend(diagnostics);
    }

    /// Replace the entire collection with the given snapshot.
    ///
    /// Clears first, then merges each entry in order: duplicate URIs within
    /// one snapshot concatenate in call order.
    pub fn set_entries(&mut self, entries: impl IntoIterator<Item = (Url, Vec<Diagnostic>)>) {
        self.data.clear();
        for (uri, diagnostics) in entries {
            self.merge(&uri, diagnostics);
        }
    }

    /// Remove the diagnostics for `uri`. Returns whether the key existed.
    pub fn delete(&mut self, uri: &Url) -> bool {
        self.data.remove(uri).is_some()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Tear the collection down as a disposable resource.
    ///
    /// A state wipe and nothing more; the name is retained and the
    /// collection stays usable.
    pub fn unsubscribe(&mut self) {
        self.clear();
    }

    #[must_use]
    pub fn get(&self, uri: &Url) -> Option<&[Diagnostic]> {
        self.data.get(uri).map(Vec::as_slice)
    }

    #[must_use]
    pub fn contains(&self, uri: &Url) -> bool {
        self.data.contains_key(uri)
    }

    /// Current entries sorted by URI. Recomputed per call, not a live view.
    #[must_use]
    pub fn entries(&self) -> Vec<(&Url, &[Diagnostic])> {
        let mut out: Vec<_> = self
            .data
            .iter()
            .map(|(uri, diagnostics)| (uri, diagnostics.as_slice()))
            .collect();
        out.sort_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()));
        out
    }

    /// Owned snapshot of the current entries, sorted by URI.
    #[must_use]
    pub fn to_entries(&self) -> Vec<(Url, Vec<Diagnostic>)> {
        self.entries()
            .into_iter()
            .map(|(uri, diagnostics)| (uri.clone(), diagnostics.to_vec()))
            .collect()
    }

    /// Number of URIs with diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Total diagnostic count across all URIs.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.data.values().map(Vec::len).sum()
    }
}
