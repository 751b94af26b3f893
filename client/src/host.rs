//! Extension-host lifecycle and the client side of the boundary protocol.

use std::collections::HashMap;
use std::env;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use quarry_proto::channel::{Endpoint, EndpointError, Inbound};
use quarry_proto::envelope::{
    AcceptDiagnosticsDataParams, AcceptSearchResultsParams, Ack, FindTextInFilesParams,
    FindTextInFilesResult, InitializeParams, Message, Notification, ProvideTextSearchResultsParams,
    ProvideTextSearchResultsResult, RegisterProviderParams, RegisterProviderResult, Request,
    ResponseError, TransformQueryParams, TransformQueryResult, UnregisterParams, methods,
    parse_params,
};
use quarry_types::ids::{ProviderId, RegistrationId, RequestId};
use quarry_types::search::{TextSearchParams, TextSearchQuery, TextSearchResult};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::config::{ENV_SECRET_DENYLIST, HostConfig, env_denylist_matches};
use crate::registry::Registration;
use crate::search::{
    ProvideFut, QueryTransformer, SearchError, SearchPipeline, TextSearchProvider, TransformFut,
};
use crate::services::{DiagnosticsService, FileSystemService};

/// The client-authoritative state the extension host pushes into and the
/// UI reads from.
pub struct ClientServices {
    pub diagnostics: DiagnosticsService,
    pub file_system: FileSystemService,
    pub search: SearchPipeline,
}

impl Default for ClientServices {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientServices {
    #[must_use]
    pub fn new() -> Self {
        Self {
            diagnostics: DiagnosticsService::new(),
            file_system: FileSystemService::new(),
            search: SearchPipeline::new(),
        }
    }

    /// Run one search through the full pipeline and collect the results.
    pub async fn find_text_in_files(
        &self,
        params: TextSearchParams,
    ) -> Result<Vec<TextSearchResult>, SearchError> {
        self.search.collect(params).await
    }
}

/// Client handle to a running extension host.
///
/// Owns the connection tasks and, for spawned hosts, the child process
/// (killed on drop). All extension-originated traffic is dispatched into
/// the shared [`ClientServices`].
pub struct ExtensionHostHandle {
    endpoint: Endpoint,
    services: Arc<ClientServices>,
    child: Option<Child>,
    shutdown_grace: Duration,
}

impl ExtensionHostHandle {
    /// Launch the extension host as a child process and perform the
    /// `$initialize` handshake.
    ///
    /// The command is resolved through `PATH`; secret-bearing environment
    /// variables are withheld from the sandboxed process.
    pub async fn spawn(config: &HostConfig, services: Arc<ClientServices>) -> Result<Self> {
        let resolved = which::which(config.command())
            .with_context(|| format!("{} not found in PATH", config.command()))?;
        let mut command = Command::new(&resolved);
        command
            .args(config.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        for (key, _) in env::vars() {
            let upper = key.to_uppercase();
            if ENV_SECRET_DENYLIST
                .iter()
                .any(|pattern| env_denylist_matches(pattern, &upper))
            {
                command.env_remove(&key);
            }
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("spawning {}", config.command()))?;
        let stdout = child.stdout.take().context("no stdout from extension host")?;
        let stdin = child.stdin.take().context("no stdin from extension host")?;

        let mut handle = Self::connect(stdout, stdin, services, config.request_timeout());
        handle.child = Some(child);
        handle.shutdown_grace = config.shutdown_grace();

        handle
            .initialize("quarry-client")
            .await
            .context("extension host initialize handshake")?;
        tracing::debug!(command = config.command(), "extension host started");
        Ok(handle)
    }

    /// Attach to an already-connected duplex (a test harness, an in-process
    /// host, a remote socket). No handshake is performed.
    pub fn connect<R, W>(
        reader: R,
        writer: W,
        services: Arc<ClientServices>,
        request_timeout: Duration,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (endpoint, inbound) = Endpoint::start(reader, writer, request_timeout);
        let dispatcher = Arc::new(Dispatcher {
            services: services.clone(),
            endpoint: endpoint.clone(),
            registrations: Mutex::new(HashMap::new()),
        });
        tokio::spawn(dispatcher.run(inbound));

        Self {
            endpoint,
            services,
            child: None,
            shutdown_grace: Duration::from_secs(2),
        }
    }

    #[must_use]
    pub fn services(&self) -> &Arc<ClientServices> {
        &self.services
    }

    /// Perform the `$initialize` handshake.
    pub async fn initialize(&self, name: &str) -> Result<(), EndpointError> {
        let _: Ack = self
            .endpoint
            .call(
                methods::INITIALIZE,
                &InitializeParams {
                    name: name.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    /// Orderly teardown: `$shutdown`, close the writer, and give a spawned
    /// process a grace period before killing it.
    pub async fn shutdown(mut self) {
        if let Err(err) = self.endpoint.call::<Ack, Ack>(methods::SHUTDOWN, &Ack {}).await {
            tracing::debug!("extension host shutdown request failed: {err}");
        }
        self.endpoint.close().await;

        if let Some(mut child) = self.child.take() {
            let wait = tokio::time::timeout(self.shutdown_grace, child.wait()).await;
            if wait.is_err() {
                tracing::debug!("extension host didn't exit in time, killing");
                let _ = child.kill().await;
            }
        }
    }
}

enum HeldRegistration {
    Transformer(Registration<dyn QueryTransformer>),
    Provider(Registration<dyn TextSearchProvider>),
}

impl HeldRegistration {
    fn id(&self) -> RegistrationId {
        match self {
            Self::Transformer(registration) => registration.id(),
            Self::Provider(registration) => registration.id(),
        }
    }
}

/// Serves extension-originated requests and notifications against the
/// client services.
struct Dispatcher {
    services: Arc<ClientServices>,
    endpoint: Endpoint,
    /// Guards for boundary-originated registrations. Removing an entry
    /// drops the guard, which unregisters the provider.
    registrations: Mutex<HashMap<RegistrationId, HeldRegistration>>,
}

impl Dispatcher {
    async fn run(self: Arc<Self>, mut inbound: mpsc::Receiver<Inbound>) {
        while let Some(message) = inbound.recv().await {
            match message {
                Inbound::Notification(notification) => self.handle_notification(notification),
                Inbound::Request(request) => {
                    // Requests may call back into the extension (remote
                    // providers), so they must not block this loop.
                    let dispatcher = self.clone();
                    tokio::spawn(async move {
                        let reply = dispatcher.handle_request(request).await;
                        if dispatcher.endpoint.send(reply).await.is_err() {
                            tracing::debug!("reply dropped: boundary channel closed");
                        }
                    });
                }
            }
        }
        tracing::debug!("extension host connection closed");
    }

    fn handle_notification(&self, notification: Notification) {
        match notification.method.as_str() {
            methods::ACCEPT_DIAGNOSTICS_DATA => {
                match parse_params::<AcceptDiagnosticsDataParams>(notification.params) {
                    Ok(params) => self.services.diagnostics.accept(params.updates),
                    Err(err) => {
                        tracing::debug!("malformed diagnostics snapshot: {err}");
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
            methods::FIND_TEXT_IN_FILES => self.handle_find(request.id, request.params).await,
            methods::REGISTER_QUERY_TRANSFORMER => {
                self.handle_register(request.id, request.params, RegistrationKind::Transformer)
            }
            methods::REGISTER_TEXT_SEARCH_PROVIDER => {
                self.handle_register(request.id, request.params, RegistrationKind::Provider)
            }
            methods::UNREGISTER => self.handle_unregister(request.id, request.params),
            other => Message::failure(request.id, ResponseError::method_not_found(other)),
        }
    }

    /// Run the pipeline, streaming each batch to the extension as an
    /// `$acceptSearchResults` notification before the completing response.
    async fn handle_find(&self, id: RequestId, params: Value) -> Message {
        let params: FindTextInFilesParams = match parse_params(params) {
            Ok(params) => params,
            Err(err) => return Message::failure(id, err),
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let forward_endpoint = self.endpoint.clone();
        let forward = tokio::spawn(async move {
            while let Some(items) = rx.recv().await {
                let batch = AcceptSearchResultsParams { request: id, items };
                if forward_endpoint
                    .notify(methods::ACCEPT_SEARCH_RESULTS, &batch)
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        let outcome = self.services.search.run(params.params, &tx).await;
        drop(tx);
        // All batches are on the wire before the response goes out.
        let _ = forward.await;

        match outcome {
            Ok(total) => Message::reply(id, &FindTextInFilesResult { total }),
            Err(err) => Message::failure(id, ResponseError::internal(err.to_string())),
        }
    }

    fn handle_register(&self, id: RequestId, params: Value, kind: RegistrationKind) -> Message {
        let params: RegisterProviderParams = match parse_params(params) {
            Ok(params) => params,
            Err(err) => return Message::failure(id, err),
        };

        let held = match kind {
            RegistrationKind::Transformer => {
                let adapter = Arc::new(RemoteQueryTransformer {
                    endpoint: self.endpoint.clone(),
                    provider: params.provider,
                });
                HeldRegistration::Transformer(self.services.search.transformers().register(adapter))
            }
            RegistrationKind::Provider => {
                let adapter = Arc::new(RemoteTextSearchProvider {
                    endpoint: self.endpoint.clone(),
                    provider: params.provider,
                });
                HeldRegistration::Provider(self.services.search.providers().register(adapter))
            }
        };

        let registration = held.id();
        self.registrations
            .lock()
            .expect("registrations lock poisoned")
            .insert(registration, held);
        Message::reply(id, &RegisterProviderResult { registration })
    }

    fn handle_unregister(&self, id: RequestId, params: Value) -> Message {
        let params: UnregisterParams = match parse_params(params) {
            Ok(params) => params,
            Err(err) => return Message::failure(id, err),
        };
        let removed = self
            .registrations
            .lock()
            .expect("registrations lock poisoned")
            .remove(&params.registration);
        if removed.is_none() {
            tracing::debug!(registration = %params.registration, "unregister of unknown id");
        }
        Message::reply(id, &Ack {})
    }
}

enum RegistrationKind {
    Transformer,
    Provider,
}

/// Extension-side transformer surfaced in the client registry: each use
/// calls back over the boundary.
struct RemoteQueryTransformer {
    endpoint: Endpoint,
    provider: ProviderId,
}

impl QueryTransformer for RemoteQueryTransformer {
    fn transform_query<'a>(&'a self, query: TextSearchQuery) -> TransformFut<'a> {
        Box::pin(async move {
            let params = TransformQueryParams {
                transformer: self.provider,
                query,
            };
            let result: TransformQueryResult = self
                .endpoint
                .call(methods::TRANSFORM_QUERY, &params)
                .await
                .map_err(|err| SearchError::Transform(err.to_string()))?;
            Ok(result.query)
        })
    }
}

/// Extension-side search provider surfaced in the client registry.
struct RemoteTextSearchProvider {
    endpoint: Endpoint,
    provider: ProviderId,
}

impl TextSearchProvider for RemoteTextSearchProvider {
    fn provide<'a>(&'a self, params: TextSearchParams) -> ProvideFut<'a> {
        Box::pin(async move {
            let params = ProvideTextSearchResultsParams {
                provider: self.provider,
                params,
            };
            let result: ProvideTextSearchResultsResult = self
                .endpoint
                .call(methods::PROVIDE_TEXT_SEARCH_RESULTS, &params)
                .await
                .map_err(|err| SearchError::Provider(err.to_string()))?;
            Ok(result.items)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_proto::codec::{FrameReader, FrameWriter};
    use quarry_proto::envelope::codes;
    use quarry_types::Diagnostic;
    use quarry_types::diagnostic::{DiagnosticSeverity, Range};
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf, duplex, split};
    use url::Url;

    struct Harness {
        services: Arc<ClientServices>,
        _handle: ExtensionHostHandle,
        peer_reader: FrameReader<ReadHalf<DuplexStream>>,
        peer_writer: FrameWriter<WriteHalf<DuplexStream>>,
    }

    /// Client handle on one end, raw frame IO playing the extension host
    /// on the other.
    fn harness() -> Harness {
        let (near, far) = duplex(64 * 1024);
        let (near_r, near_w) = split(near);
        let (far_r, far_w) = split(far);
        let services = Arc::new(ClientServices::new());
        let handle = ExtensionHostHandle::connect(
            near_r,
            near_w,
            services.clone(),
            Duration::from_secs(5),
        );
        Harness {
            services,
            _handle: handle,
            peer_reader: FrameReader::new(far_r),
            peer_writer: FrameWriter::new(far_w),
        }
    }

    fn uri(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn diag(msg: &str) -> Diagnostic {
        Diagnostic::new(msg, DiagnosticSeverity::Error, Range::new(0, 0, 0, 1))
    }

    #[tokio::test]
    async fn diagnostics_notification_lands_in_services() {
        let mut harness = harness();
        let mut changes = harness.services.diagnostics.subscribe();

        let params = AcceptDiagnosticsDataParams {
            updates: vec![(uri("file:///a.rs"), vec![diag("boom")])],
        };
        harness
            .peer_writer
            .write_message(&Message::notification(
                methods::ACCEPT_DIAGNOSTICS_DATA,
                serde_json::to_value(&params).unwrap(),
            ))
            .await
            .unwrap();

        changes.changed().await.unwrap();
        let entries = harness.services.diagnostics.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1[0].message(), "boom");
    }

    #[tokio::test]
    async fn unknown_request_gets_method_not_found() {
        let mut harness = harness();
        harness
            .peer_writer
            .write_message(&Message::request(
                RequestId::new(7),
                "$frobnicate",
                Value::Null,
            ))
            .await
            .unwrap();

        let reply = harness.peer_reader.read_message().await.unwrap().unwrap();
        let Message::Response(response) = reply else {
            panic!("expected response, got {reply:?}");
        };
        assert_eq!(response.id, RequestId::new(7));
        let error = response.into_result().unwrap_err();
        assert_eq!(error.code, codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn register_then_unregister_round_trip() {
        let mut harness = harness();
        harness
            .peer_writer
            .write_message(&Message::request(
                RequestId::new(1),
                methods::REGISTER_TEXT_SEARCH_PROVIDER,
                serde_json::to_value(RegisterProviderParams {
                    provider: ProviderId::new(1),
                })
                .unwrap(),
            ))
            .await
            .unwrap();

        let reply = harness.peer_reader.read_message().await.unwrap().unwrap();
        let Message::Response(response) = reply else {
            panic!("expected response, got {reply:?}");
        };
        let result: RegisterProviderResult =
            serde_json::from_value(response.into_result().unwrap()).unwrap();
        assert_eq!(harness.services.search.providers().len(), 1);

        harness
            .peer_writer
            .write_message(&Message::request(
                RequestId::new(2),
                methods::UNREGISTER,
                serde_json::to_value(UnregisterParams {
                    registration: result.registration,
                })
                .unwrap(),
            ))
            .await
            .unwrap();
        let reply = harness.peer_reader.read_message().await.unwrap().unwrap();
        assert!(matches!(reply, Message::Response(_)));
        assert!(harness.services.search.providers().is_empty());
    }

    #[tokio::test]
    async fn find_request_streams_batches_then_responds() {
        struct OneShot;
        impl TextSearchProvider for OneShot {
            fn provide<'a>(&'a self, _params: TextSearchParams) -> ProvideFut<'a> {
                Box::pin(async {
                    Ok(vec![TextSearchResult::new(
                        Url::parse("file:///hit.rs").unwrap(),
                    )])
                })
            }
        }

        let mut harness = harness();
        let _registration = harness
            .services
            .search
            .providers()
            .register(Arc::new(OneShot));

        let params = FindTextInFilesParams {
            params: TextSearchParams::new(TextSearchQuery::literal("hit")),
        };
        harness
            .peer_writer
            .write_message(&Message::request(
                RequestId::new(3),
                methods::FIND_TEXT_IN_FILES,
                serde_json::to_value(&params).unwrap(),
            ))
            .await
            .unwrap();

        let first = harness.peer_reader.read_message().await.unwrap().unwrap();
        let Message::Notification(notification) = first else {
            panic!("expected batch notification before response, got {first:?}");
        };
        assert_eq!(notification.method, methods::ACCEPT_SEARCH_RESULTS);
        let batch: AcceptSearchResultsParams =
            serde_json::from_value(notification.params).unwrap();
        assert_eq!(batch.request, RequestId::new(3));
        assert_eq!(batch.items.len(), 1);

        let second = harness.peer_reader.read_message().await.unwrap().unwrap();
        let Message::Response(response) = second else {
            panic!("expected completing response, got {second:?}");
        };
        let result: FindTextInFilesResult =
            serde_json::from_value(response.into_result().unwrap()).unwrap();
        assert_eq!(result.total, 1);
    }
}
