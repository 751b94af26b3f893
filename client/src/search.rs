//! The text-search pipeline: query transformers chained in registration
//! order, then fan-out over every registered provider.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::collections::HashSet;

use quarry_types::ids::RegistrationId;
use quarry_types::search::{PatternKind, TextSearchParams, TextSearchQuery, TextSearchResult};
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

use crate::graphql::GraphQlError;
use crate::registry::ProviderRegistry;

/// Future type for [`QueryTransformer::transform_query`].
pub type TransformFut<'a> =
    Pin<Box<dyn Future<Output = Result<TextSearchQuery, SearchError>> + Send + 'a>>;

/// Rewrites a query before any provider sees it.
pub trait QueryTransformer: Send + Sync {
    fn transform_query<'a>(&'a self, query: TextSearchQuery) -> TransformFut<'a>;
}

/// Future type for [`TextSearchProvider::provide`].
pub type ProvideFut<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<TextSearchResult>, SearchError>> + Send + 'a>>;

/// Answers "find text matching this query" over some resource set.
pub trait TextSearchProvider: Send + Sync {
    fn provide<'a>(&'a self, params: TextSearchParams) -> ProvideFut<'a>;
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid search pattern: {0}")]
    InvalidPattern(String),
    #[error("unsupported include/exclude pattern kind {0:?}: only regexp is supported")]
    UnsupportedPatternKind(PatternKind),
    #[error("2+ patterns in include/exclude patterns are not supported")]
    MultiplePatterns,
    #[error("query transformer failed: {0}")]
    Transform(String),
    #[error("text search provider failed: {0}")]
    Provider(String),
    #[error("all {count} text search providers failed; last error: {last}")]
    AllProvidersFailed { count: usize, last: String },
    #[error(transparent)]
    GraphQl(#[from] GraphQlError),
}

/// Both search registries plus the execution logic.
///
/// Transformers apply in registration order, each seeing the previous
/// result. Every provider runs; each provider's results are emitted as one
/// batch, and a URI already emitted within the same request is dropped
/// (first-provider-wins deduplication). A failing provider is logged and
/// skipped; the request fails only when every provider failed.
pub struct SearchPipeline {
    transformers: ProviderRegistry<dyn QueryTransformer>,
    providers: ProviderRegistry<dyn TextSearchProvider>,
}

impl Default for SearchPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchPipeline {
    #[must_use]
    pub fn new() -> Self {
        // One id space across both registries; the boundary disposes
        // registrations by id alone.
        let ids = Arc::new(AtomicU64::new(1));
        Self {
            transformers: ProviderRegistry::with_id_allocator(ids.clone()),
            providers: ProviderRegistry::with_id_allocator(ids),
        }
    }

    #[must_use]
    pub fn transformers(&self) -> &ProviderRegistry<dyn QueryTransformer> {
        &self.transformers
    }

    #[must_use]
    pub fn providers(&self) -> &ProviderRegistry<dyn TextSearchProvider> {
        &self.providers
    }

    /// Drop a registration from whichever registry holds it.
    pub fn unregister(&self, id: RegistrationId) -> bool {
        self.transformers.unregister(id) || self.providers.unregister(id)
    }

    /// Run one search, emitting per-provider batches on `batches`.
    ///
    /// Returns the number of distinct results delivered across all batches.
    pub async fn run(
        &self,
        params: TextSearchParams,
        batches: &mpsc::UnboundedSender<Vec<TextSearchResult>>,
    ) -> Result<usize, SearchError> {
        let mut params = params;
        for transformer in self.transformers.providers() {
            params.query = transformer.transform_query(params.query).await?;
        }

        let providers = self.providers.providers();
        let mut seen: HashSet<Url> = HashSet::new();
        let mut total = 0usize;
        let mut failures = 0usize;
        let mut last_error = None;

        for provider in &providers {
            match provider.provide(params.clone()).await {
                Ok(results) => {
                    let batch: Vec<TextSearchResult> = results
                        .into_iter()
                        .filter(|result| seen.insert(result.uri.clone()))
                        .collect();
                    if batch.is_empty() {
                        continue;
                    }
                    total += batch.len();
                    if batches.send(batch).is_err() {
                        // Consumer hung up; nothing left to deliver to.
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!("text search provider failed: {err}");
                    failures += 1;
                    last_error = Some(err);
                }
            }
        }

        if !providers.is_empty() && failures == providers.len() {
            let last = last_error.map(|e| e.to_string()).unwrap_or_default();
            return Err(SearchError::AllProvidersFailed {
                count: failures,
                last,
            });
        }
        Ok(total)
    }

    /// Run one search and collect every batch.
    pub async fn collect(
        &self,
        params: TextSearchParams,
    ) -> Result<Vec<TextSearchResult>, SearchError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.run(params, &tx).await?;
        drop(tx);
        let mut out = Vec::new();
        while let Some(mut batch) = rx.recv().await {
            out.append(&mut batch);
        }
        Ok(out)
    }
}
