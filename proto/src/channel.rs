//! Connection endpoint machinery shared by both sides of the boundary.
//!
//! Each connection runs one reader task and one writer task. Outgoing
//! requests park a oneshot sender in a pending map keyed by request id; the
//! reader routes responses back to it and forwards peer-originated requests
//! and notifications to the owning side's dispatch loop. The pending entry
//! is removed on every failure path so repeated failures cannot grow the
//! map.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use quarry_types::ids::RequestId;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, mpsc, oneshot};

use crate::codec::{FrameReader, FrameWriter};
use crate::envelope::{Message, Notification, Request, Response, ResponseError};

const WRITER_CHANNEL_CAPACITY: usize = 64;

const INBOUND_CHANNEL_CAPACITY: usize = 64;

/// Failure of one boundary call.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The writer task is gone; nothing more can be sent.
    #[error("boundary channel closed")]
    ChannelClosed,
    /// No response arrived within the configured request timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// The connection dropped while the request was in flight.
    #[error("connection lost while awaiting response")]
    ConnectionLost,
    /// The peer answered with an error response.
    #[error(transparent)]
    Remote(#[from] ResponseError),
    /// A payload failed to encode, or a success payload failed to decode as
    /// the expected type.
    #[error("unexpected payload: {0}")]
    Payload(String),
}

/// A request or notification arriving from the peer.
#[derive(Debug)]
pub enum Inbound {
    Request(Request),
    Notification(Notification),
}

enum WriterCommand {
    Send(Message),
    Shutdown,
}

type PendingMap = Arc<Mutex<HashMap<RequestId, oneshot::Sender<Response>>>>;

/// One side of a boundary connection.
///
/// Cheap to clone; clones share the writer, the id allocator, and the
/// pending map.
#[derive(Clone)]
pub struct Endpoint {
    writer_tx: mpsc::Sender<WriterCommand>,
    next_id: Arc<AtomicU64>,
    pending: PendingMap,
    request_timeout: Duration,
}

impl Endpoint {
    /// Spawn the reader and writer tasks over the given byte streams.
    ///
    /// Returns the endpoint plus the stream of peer-originated requests and
    /// notifications. The inbound stream ends when the peer closes the
    /// connection or a frame fails to parse; every request still in flight
    /// at that point fails with [`EndpointError::ConnectionLost`].
    pub fn start<R, W>(
        reader: R,
        writer: W,
        request_timeout: Duration,
    ) -> (Self, mpsc::Receiver<Inbound>)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (writer_tx, mut writer_rx) = mpsc::channel::<WriterCommand>(WRITER_CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel::<Inbound>(INBOUND_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut writer = FrameWriter::new(writer);
            while let Some(command) = writer_rx.recv().await {
                match command {
                    WriterCommand::Send(message) => {
                        if let Err(err) = writer.write_message(&message).await {
                            tracing::warn!("boundary write error: {err}");
                            break;
                        }
                    }
                    WriterCommand::Shutdown => break,
                }
            }
        });

        let reader_pending = pending.clone();
        tokio::spawn(async move {
            let mut reader = FrameReader::new(reader);
            loop {
                match reader.read_message().await {
                    Ok(Some(Message::Response(response))) => {
                        let sender = reader_pending.lock().await.remove(&response.id);
                        match sender {
                            Some(tx) => {
                                let _ = tx.send(response);
                            }
                            None => {
                                tracing::debug!(id = %response.id, "response for unknown request");
                            }
                        }
                    }
                    Ok(Some(Message::Request(request))) => {
                        if inbound_tx.send(Inbound::Request(request)).await.is_err() {
                            tracing::debug!("dispatch side gone, stopping reader");
                            break;
                        }
                    }
                    Ok(Some(Message::Notification(notification))) => {
                        if inbound_tx
                            .send(Inbound::Notification(notification))
                            .await
                            .is_err()
                        {
                            tracing::debug!("dispatch side gone, stopping reader");
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::debug!("peer closed the boundary channel");
                        break;
                    }
                    Err(err) => {
                        tracing::warn!("boundary read error: {err}");
                        break;
                    }
                }
            }
            // Fail every in-flight request rather than leaving it to the
            // timeout.
            reader_pending.lock().await.clear();
        });

        let endpoint = Self {
            writer_tx,
            next_id: Arc::new(AtomicU64::new(1)),
            pending,
            request_timeout,
        };
        (endpoint, inbound_rx)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Reserve the next request id without sending anything.
    ///
    /// Callers that must observe notifications correlated to a request
    /// before its response arrives (search result batches) register state
    /// under the id first, then send with [`Endpoint::call_with_id`].
    #[must_use]
    pub fn allocate_request_id(&self) -> RequestId {
        RequestId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Send a request and await its raw result value.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, EndpointError> {
        let id = self.allocate_request_id();
        self.request_with_id(id, method, params).await
    }

    async fn request_with_id(
        &self,
        id: RequestId,
        method: &str,
        params: Value,
    ) -> Result<Value, EndpointError> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let message = Message::request(id, method, params);
        if self
            .writer_tx
            .send(WriterCommand::Send(message))
            .await
            .is_err()
        {
            self.pending.lock().await.remove(&id);
            return Err(EndpointError::ChannelClosed);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response.into_result().map_err(EndpointError::from),
            Ok(Err(_)) => {
                self.pending.lock().await.remove(&id);
                Err(EndpointError::ConnectionLost)
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(EndpointError::Timeout(self.request_timeout))
            }
        }
    }

    /// Send a typed request and decode its typed result.
    pub async fn call<P, T>(&self, method: &str, params: &P) -> Result<T, EndpointError>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let id = self.allocate_request_id();
        self.call_with_id(id, method, params).await
    }

    /// Like [`Endpoint::call`], for a previously reserved id.
    pub async fn call_with_id<P, T>(
        &self,
        id: RequestId,
        method: &str,
        params: &P,
    ) -> Result<T, EndpointError>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let params = encode(params)?;
        let value = self.request_with_id(id, method, params).await?;
        serde_json::from_value(value).map_err(|err| EndpointError::Payload(err.to_string()))
    }

    /// Send a fire-and-forget notification.
    pub async fn notify<P: Serialize>(&self, method: &str, params: &P) -> Result<(), EndpointError> {
        let params = encode(params)?;
        self.send(Message::notification(method, params)).await
    }

    /// Send a prebuilt envelope, typically a response from a dispatch loop.
    pub async fn send(&self, message: Message) -> Result<(), EndpointError> {
        self.writer_tx
            .send(WriterCommand::Send(message))
            .await
            .map_err(|_| EndpointError::ChannelClosed)
    }

    /// Stop the writer task. In-flight reads are unaffected; subsequent
    /// sends fail with [`EndpointError::ChannelClosed`].
    pub async fn close(&self) {
        let _ = self.writer_tx.send(WriterCommand::Shutdown).await;
    }

    /// Number of requests currently awaiting a response.
    pub async fn pending_requests(&self) -> usize {
        self.pending.lock().await.len()
    }
}

fn encode<P: Serialize>(params: &P) -> Result<Value, EndpointError> {
    serde_json::to_value(params).map_err(|err| EndpointError::Payload(err.to_string()))
}
