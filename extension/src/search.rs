//! Extension-side search API: issuing searches and contributing
//! transformers and providers to the client's pipeline.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use quarry_proto::channel::Endpoint;
use quarry_proto::envelope::{
    Ack, FindTextInFilesParams, FindTextInFilesResult, RegisterProviderParams,
    RegisterProviderResult, UnregisterParams, methods,
};
use quarry_types::ids::{ProviderId, RegistrationId};
use quarry_types::search::{TextSearchParams, TextSearchQuery, TextSearchResult};
use tokio::sync::mpsc;
use tokio::time;

use crate::runtime::{ExtensionError, SharedState};

/// Future type for [`QueryTransformer::transform_query`].
pub type TransformFut<'a> =
    Pin<Box<dyn Future<Output = Result<TextSearchQuery, ExtensionError>> + Send + 'a>>;

/// Rewrites queries before the client's pipeline fans them out.
pub trait QueryTransformer: Send + Sync {
    fn transform_query<'a>(&'a self, query: TextSearchQuery) -> TransformFut<'a>;
}

/// Future type for [`TextSearchProvider::provide`].
pub type ProvideFut<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<TextSearchResult>, ExtensionError>> + Send + 'a>>;

/// Contributes results to the client's search fan-out.
pub trait TextSearchProvider: Send + Sync {
    fn provide<'a>(&'a self, params: TextSearchParams) -> ProvideFut<'a>;
}

/// Handle for a registration made with the client. Dropping it without
/// calling [`dispose`](Self::dispose) leaves the registration live until
/// the connection closes.
pub struct Disposal {
    endpoint: Endpoint,
    state: Arc<SharedState>,
    registration: RegistrationId,
    provider: ProviderId,
    kind: RegistrationKind,
}

enum RegistrationKind {
    Transformer,
    Provider,
}

impl Disposal {
    #[must_use]
    pub fn registration(&self) -> RegistrationId {
        self.registration
    }

    /// Withdraw the registration on both sides of the boundary.
    pub async fn dispose(self) -> Result<(), ExtensionError> {
        match self.kind {
            RegistrationKind::Transformer => {
                self.state
                    .transformers
                    .lock()
                    .expect("transformers lock poisoned")
                    .remove(&self.provider.value());
            }
            RegistrationKind::Provider => {
                self.state
                    .providers
                    .lock()
                    .expect("providers lock poisoned")
                    .remove(&self.provider.value());
            }
        }
        let _: Ack = self
            .endpoint
            .call(
                methods::UNREGISTER,
                &UnregisterParams {
                    registration: self.registration,
                },
            )
            .await?;
        Ok(())
    }
}

/// Search facade handed out by [`crate::ExtensionHost`].
pub struct ExtSearch {
    endpoint: Endpoint,
    state: Arc<SharedState>,
}

impl ExtSearch {
    pub(crate) fn new(endpoint: Endpoint, state: Arc<SharedState>) -> Self {
        Self { endpoint, state }
    }

    /// Run a search on the client and collect the streamed results.
    ///
    /// Result batches arrive as notifications correlated by the request id,
    /// so the id is reserved and the sink registered before the request
    /// goes out. The completing response carries the total, which bounds
    /// the drain.
    pub async fn find_text_in_files(
        &self,
        params: TextSearchParams,
    ) -> Result<Vec<TextSearchResult>, ExtensionError> {
        let id = self.endpoint.allocate_request_id();
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.state
            .streams
            .lock()
            .expect("streams lock poisoned")
            .insert(id.value(), tx);

        let outcome: Result<FindTextInFilesResult, _> = self
            .endpoint
            .call_with_id(
                id,
                methods::FIND_TEXT_IN_FILES,
                &FindTextInFilesParams { params },
            )
            .await;

        let drained = match &outcome {
            Ok(result) => {
                let mut items = Vec::with_capacity(result.total);
                // Batches were written before the response, but they route
                // through the serve loop, which may still be catching up.
                while items.len() < result.total {
                    let next = time::timeout(self.endpoint.request_timeout(), rx.recv()).await;
                    match next {
                        Ok(Some(batch)) => items.extend(batch),
                        Ok(None) => break,
                        Err(_) => {
                            tracing::debug!(
                                request = %id,
                                expected = result.total,
                                received = items.len(),
                                "timed out draining search batches"
                            );
                            break;
                        }
                    }
                }
                items
            }
            Err(_) => Vec::new(),
        };
        self.state
            .streams
            .lock()
            .expect("streams lock poisoned")
            .remove(&id.value());

        outcome?;
        Ok(drained)
    }

    /// Register a query transformer with the client.
    pub async fn register_query_transformer(
        &self,
        transformer: Arc<dyn QueryTransformer>,
    ) -> Result<Disposal, ExtensionError> {
        let provider = ProviderId::new(self.state.next_provider_id.fetch_add(1, Ordering::Relaxed));
        self.state
            .transformers
            .lock()
            .expect("transformers lock poisoned")
            .insert(provider.value(), transformer);

        let registered: Result<RegisterProviderResult, _> = self
            .endpoint
            .call(
                methods::REGISTER_QUERY_TRANSFORMER,
                &RegisterProviderParams { provider },
            )
            .await;
        let result = match registered {
            Ok(result) => result,
            Err(err) => {
                self.state
                    .transformers
                    .lock()
                    .expect("transformers lock poisoned")
                    .remove(&provider.value());
                return Err(err.into());
            }
        };

        Ok(Disposal {
            endpoint: self.endpoint.clone(),
            state: self.state.clone(),
            registration: result.registration,
            provider,
            kind: RegistrationKind::Transformer,
        })
    }

    /// Register a text search provider with the client.
    pub async fn register_text_search_provider(
        &self,
        provider_impl: Arc<dyn TextSearchProvider>,
    ) -> Result<Disposal, ExtensionError> {
        let provider = ProviderId::new(self.state.next_provider_id.fetch_add(1, Ordering::Relaxed));
        self.state
            .providers
            .lock()
            .expect("providers lock poisoned")
            .insert(provider.value(), provider_impl);

        let registered: Result<RegisterProviderResult, _> = self
            .endpoint
            .call(
                methods::REGISTER_TEXT_SEARCH_PROVIDER,
                &RegisterProviderParams { provider },
            )
            .await;
        let result = match registered {
            Ok(result) => result,
            Err(err) => {
                self.state
                    .providers
                    .lock()
                    .expect("providers lock poisoned")
                    .remove(&provider.value());
                return Err(err.into());
            }
        };

        Ok(Disposal {
            endpoint: self.endpoint.clone(),
            state: self.state.clone(),
            registration: result.registration,
            provider,
            kind: RegistrationKind::Provider,
        })
    }
}
