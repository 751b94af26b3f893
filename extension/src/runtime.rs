//! Extension-host runtime: the serve loop and the connection facade.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quarry_proto::channel::{Endpoint, EndpointError, Inbound};
use quarry_proto::envelope::{
    AcceptSearchResultsParams, Ack, InitializeParams, Message, Notification,
    ProvideTextSearchResultsParams, ProvideTextSearchResultsResult, Request, ResponseError,
    TransformQueryParams, TransformQueryResult, methods, parse_params,
};
use quarry_types::ids::RequestId;
use quarry_types::search::TextSearchResult;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};

use crate::diagnostics::ExtDiagnostics;
use crate::search::{ExtSearch, QueryTransformer, TextSearchProvider};

/// Errors surfaced by the extension-side API.
#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error(transparent)]
    Channel(#[from] EndpointError),
    #[error("query transformer failed: {0}")]
    Transform(String),
    #[error("search provider failed: {0}")]
    Provider(String),
    #[error("not implemented: {0}")]
    Unimplemented(&'static str),
}

/// Tables shared between the serve loop and the API facades.
pub(crate) struct SharedState {
    pub(crate) transformers: Mutex<HashMap<u64, Arc<dyn QueryTransformer>>>,
    pub(crate) providers: Mutex<HashMap<u64, Arc<dyn TextSearchProvider>>>,
    /// Per-request sinks for streamed search batches, keyed by the id of
    /// the originating `$findTextInFiles` request.
    pub(crate) streams: Mutex<HashMap<u64, mpsc::UnboundedSender<Vec<TextSearchResult>>>>,
    pub(crate) next_provider_id: AtomicU64,
}

impl SharedState {
    fn new() -> Self {
        Self {
            transformers: Mutex::new(HashMap::new()),
            providers: Mutex::new(HashMap::new()),
            streams: Mutex::new(HashMap::new()),
            next_provider_id: AtomicU64::new(1),
        }
    }
}

/// The extension side of the boundary.
///
/// Connecting starts the channel tasks and the serve loop; the
/// [`diagnostics`](Self::diagnostics) and [`search`](Self::search) facades
/// are the API extensions program against.
pub struct ExtensionHost {
    endpoint: Endpoint,
    diagnostics: ExtDiagnostics,
    search: ExtSearch,
    shutdown: watch::Receiver<bool>,
}

impl ExtensionHost {
    /// Attach to the client over any duplex pair.
    pub fn connect<R, W>(reader: R, writer: W, request_timeout: Duration) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (endpoint, inbound) = Endpoint::start(reader, writer, request_timeout);
        let state = Arc::new(SharedState::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let server = Arc::new(Server {
            endpoint: endpoint.clone(),
            state: state.clone(),
            shutdown: shutdown_tx,
        });
        tokio::spawn(server.run(inbound));

        Self {
            diagnostics: ExtDiagnostics::new(endpoint.clone()),
            search: ExtSearch::new(endpoint.clone(), state),
            endpoint,
            shutdown: shutdown_rx,
        }
    }

    /// Attach over this process's stdio, for hosts spawned as a child of
    /// the client.
    #[must_use]
    pub fn stdio(request_timeout: Duration) -> Self {
        Self::connect(tokio::io::stdin(), tokio::io::stdout(), request_timeout)
    }

    #[must_use]
    pub fn diagnostics(&self) -> &ExtDiagnostics {
        &self.diagnostics
    }

    #[must_use]
    pub fn search(&self) -> &ExtSearch {
        &self.search
    }

    /// Resolves once the client has sent `$shutdown`.
    pub async fn wait_for_shutdown(&self) {
        let mut shutdown = self.shutdown.clone();
        while !*shutdown.borrow_and_update() {
            if shutdown.changed().await.is_err() {
                return;
            }
        }
    }

    /// Flush and close the outgoing channel.
    pub async fn close(&self) {
        self.endpoint.close().await;
    }
}

/// Serves client-originated traffic against the shared tables.
struct Server {
    endpoint: Endpoint,
    state: Arc<SharedState>,
    shutdown: watch::Sender<bool>,
}

impl Server {
    async fn run(self: Arc<Self>, mut inbound: mpsc::Receiver<Inbound>) {
        while let Some(message) = inbound.recv().await {
            match message {
                Inbound::Notification(notification) => self.handle_notification(notification),
                Inbound::Request(request) => {
                    // Registered transformers and providers run arbitrary
                    // futures, so requests get their own task.
                    let server = self.clone();
                    tokio::spawn(async move {
                        let reply = server.handle_request(request).await;
                        if server.endpoint.send(reply).await.is_err() {
                            tracing::debug!("reply dropped: boundary channel closed");
                        }
                    });
                }
            }
        }
        tracing::debug!("client connection closed");
    }

    fn handle_notification(&self, notification: Notification) {
        match notification.method.as_str() {
            methods::ACCEPT_SEARCH_RESULTS => {
                match parse_params::<AcceptSearchResultsParams>(notification.params) {
                    Ok(batch) => {
                        let streams = self.state.streams.lock().expect("streams lock poisoned");
                        if let Some(sink) = streams.get(&batch.request.value()) {
                            let _ = sink.send(batch.items);
                        } else {
                            tracing::debug!(
                                request = %batch.request,
                                "batch for unknown search request"
                            );
                        }
                    }
                    Err(err) => {
                        tracing::debug!("malformed search batch: {err}");
                    }
                }
            }
            other => {
                tracing::trace!("ignoring notification {other}");
            }
        }
    }

    async fn handle_request(&self, request: Request) -> Message {
        match request.method.as_str() {
            methods::INITIALIZE => {
                match parse_params::<InitializeParams>(request.params) {
                    Ok(params) => {
                        tracing::debug!(client = params.name, "initialized");
                        Message::reply(request.id, &Ack {})
                    }
                    Err(err) => Message::failure(request.id, err),
                }
            }
            methods::SHUTDOWN => {
                let _ = self.shutdown.send(true);
                Message::reply(request.id, &Ack {})
            }
            methods::TRANSFORM_QUERY => self.handle_transform(request.id, request.params).await,
            methods::PROVIDE_TEXT_SEARCH_RESULTS => {
                self.handle_provide(request.id, request.params).await
            }
            other => Message::failure(request.id, ResponseError::method_not_found(other)),
        }
    }

    async fn handle_transform(&self, id: RequestId, params: Value) -> Message {
        let params: TransformQueryParams = match parse_params(params) {
            Ok(params) => params,
            Err(err) => return Message::failure(id, err),
        };
        let transformer = self
            .state
            .transformers
            .lock()
            .expect("transformers lock poisoned")
            .get(&params.transformer.value())
            .cloned();
        let Some(transformer) = transformer else {
            return Message::failure(
                id,
                ResponseError::invalid_params(format!(
                    "unknown transformer {}",
                    params.transformer
                )),
            );
        };
        match transformer.transform_query(params.query).await {
            Ok(query) => Message::reply(id, &TransformQueryResult { query }),
            Err(err) => Message::failure(id, ResponseError::internal(err.to_string())),
        }
    }

    async fn handle_provide(&self, id: RequestId, params: Value) -> Message {
        let params: ProvideTextSearchResultsParams = match parse_params(params) {
            Ok(params) => params,
            Err(err) => return Message::failure(id, err),
        };
        let provider = self
            .state
            .providers
            .lock()
            .expect("providers lock poisoned")
            .get(&params.provider.value())
            .cloned();
        let Some(provider) = provider else {
            return Message::failure(
                id,
                ResponseError::invalid_params(format!("unknown provider {}", params.provider)),
            );
        };
        match provider.provide(params.params).await {
            Ok(items) => Message::reply(id, &ProvideTextSearchResultsResult { items }),
            Err(err) => Message::failure(id, ResponseError::internal(err.to_string())),
        }
    }
}
