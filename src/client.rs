// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Async client stub
//!
//! Requests are multiplexed over one connection and correlated by id, so a
//! single client can be shared by many tasks. Every pending request is
//! removed from the correlation map when it completes, times out, is
//! cancelled, or the connection drops.

use crate::config::ClientSettings;
use crate::query::{
    CardImportanceResult, CardSearchResult, ChainResult, ColorIdentityResult, ComboView,
    Distance1Result, Distance2Result, GraphStatistics, PackageList, RelatedResult, SeededPackage,
};
use crate::rpc::{
    self, CardImportanceParams, CardSearchParams, ChainParams, ColorIdentityParams, ComboIdParams,
    HealthReport, HealthStatus, Method, MethodInfo, PackageParams, RelatedParams, RpcError,
    RpcRequest, RpcResponse, SeededPackageParams,
};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, OnceCell};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, warn};

/// Outgoing frames buffered ahead of the writer
const OUTGOING_BUFFER: usize = 256;

/// Client-side errors. Transport failures and application errors are
/// distinct variants.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Could not reach the service
    #[error("failed to connect to {address}")]
    Connect {
        /// Target address
        address: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Could not start the service process
    #[error("failed to spawn service process")]
    Spawn(#[source] std::io::Error),

    /// The connection closed before a response arrived
    #[error("connection closed")]
    ConnectionClosed,

    /// No response within the request timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The correlation map is full
    #[error("too many pending requests (limit {0})")]
    TooManyPending(usize),

    /// A frame or result could not be decoded
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Unknown combo or card
    #[error("not found: {0}")]
    NotFound(String),

    /// The service rejected the arguments
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The service has not finished loading
    #[error("service not ready")]
    NotReady,

    /// Any other error reported by the service
    #[error("service error {code}: {message}")]
    Rpc {
        /// Wire error code
        code: i64,
        /// Wire error message
        message: String,
    },
}

impl From<RpcError> for ClientError {
    fn from(err: RpcError) -> Self {
        match err.code {
            rpc::NOT_FOUND => Self::NotFound(err.message),
            rpc::INVALID_PARAMS => Self::InvalidArgument(err.message),
            rpc::NOT_READY => Self::NotReady,
            code => Self::Rpc {
                code,
                message: err.message,
            },
        }
    }
}

type PendingMap = Mutex<HashMap<u64, oneshot::Sender<RpcResponse>>>;

/// Removes a pending entry however the request ends
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

/// Client for the combo graph service
pub struct ComboGraphClient {
    outgoing: mpsc::Sender<String>,
    pending: Arc<PendingMap>,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
    settings: ClientSettings,
    ready: OnceCell<()>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    _child: Option<Child>,
}

impl ComboGraphClient {
    /// Connect over TCP
    pub async fn connect(address: impl ToSocketAddrs + std::fmt::Display, settings: ClientSettings) -> Result<Self, ClientError> {
        let label = address.to_string();
        let stream = TcpStream::connect(address)
            .await
            .map_err(|source| ClientError::Connect { address: label, source })?;
        let (reader, writer) = stream.into_split();
        Ok(Self::from_io(reader, writer, settings))
    }

    /// Start the service as a child process and talk to it over stdio.
    /// The child is killed when the client is dropped.
    pub fn spawn(mut command: Command, settings: ClientSettings) -> Result<Self, ClientError> {
        command
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true);
        let mut child = command.spawn().map_err(ClientError::Spawn)?;

        let missing = || ClientError::Spawn(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "child stdio unavailable"));
        let stdin = child.stdin.take().ok_or_else(missing)?;
        let stdout = child.stdout.take().ok_or_else(missing)?;

        let mut client = Self::from_io(stdout, stdin, settings);
        client._child = Some(child);
        Ok(client)
    }

    /// Use an existing byte stream pair
    pub fn from_io<R, W>(reader: R, writer: W, settings: ClientSettings) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending: Arc<PendingMap> = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let (outgoing, mut rx) = mpsc::channel::<String>(OUTGOING_BUFFER);

        let writer = {
            let closed = Arc::clone(&closed);
            tokio::spawn(async move {
                let mut sink = FramedWrite::new(writer, LinesCodec::new());
                while let Some(frame) = rx.recv().await {
                    if let Err(err) = sink.send(frame).await {
                        warn!(error = %err, "Failed to send request");
                        break;
                    }
                }
                closed.store(true, Ordering::SeqCst);
            })
        };

        let reader = {
            let pending = Arc::clone(&pending);
            let closed = Arc::clone(&closed);
            tokio::spawn(async move {
                let mut frames = FramedRead::new(reader, LinesCodec::new());
                while let Some(frame) = frames.next().await {
                    let line = match frame {
                        Ok(line) => line,
                        Err(err) => {
                            warn!(error = %err, "Failed to read response");
                            break;
                        }
                    };
                    route(&pending, &line);
                }
                closed.store(true, Ordering::SeqCst);
                // Dropping the senders wakes every waiter with a closed error
                let dropped = pending.lock().drain().count();
                if dropped > 0 {
                    debug!(dropped, "Connection closed with requests in flight");
                }
            })
        };

        Self {
            outgoing,
            pending,
            closed,
            next_id: AtomicU64::new(1),
            settings,
            ready: OnceCell::new(),
            reader,
            writer,
            _child: None,
        }
    }

    /// Requests currently awaiting a response
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.pending.lock().len()
    }

    /// Send one request and wait for its response, without readiness polling
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::ConnectionClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            if pending.len() >= self.settings.max_pending {
                return Err(ClientError::TooManyPending(self.settings.max_pending));
            }
            pending.insert(id, tx);
        }
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };
        // The reader may have drained the map between the check and the insert
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::ConnectionClosed);
        }

        let request = RpcRequest {
            id: Value::from(id),
            method: method.to_string(),
            params,
        };
        let frame = serde_json::to_string(&request).map_err(|err| ClientError::Decode(err.to_string()))?;
        self.outgoing
            .send(frame)
            .await
            .map_err(|_| ClientError::ConnectionClosed)?;

        let timeout = self.settings.request_timeout();
        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(ClientError::ConnectionClosed),
            Err(_) => return Err(ClientError::Timeout(timeout)),
        };

        match response.error {
            Some(err) => Err(err.into()),
            None => Ok(response.result.unwrap_or(Value::Null)),
        }
    }

    /// Poll `health` until the service is ready. Runs once per client.
    pub async fn ensure_ready(&self) -> Result<(), ClientError> {
        self.ready.get_or_try_init(|| self.poll_ready()).await.map(|_| ())
    }

    async fn poll_ready(&self) -> Result<(), ClientError> {
        let deadline = Instant::now() + self.settings.ready_timeout();
        loop {
            let health = self.health().await?;
            match health.status {
                HealthStatus::Ready => return Ok(()),
                HealthStatus::Failed => {
                    return Err(ClientError::Rpc {
                        code: rpc::INTERNAL_ERROR,
                        message: "service failed to load its dataset".into(),
                    })
                }
                HealthStatus::Loading => {}
            }
            if Instant::now() >= deadline {
                return Err(ClientError::NotReady);
            }
            debug!("Service still loading");
            tokio::time::sleep(self.settings.poll_interval()).await;
        }
    }

    async fn request<P, T>(&self, method: Method, params: &P) -> Result<T, ClientError>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        self.ensure_ready().await?;
        let params = serde_json::to_value(params).map_err(|err| ClientError::Decode(err.to_string()))?;
        let result = self.call(method.as_str(), params).await?;
        serde_json::from_value(result).map_err(|err| ClientError::Decode(err.to_string()))
    }

    /// Service status; never waits for readiness
    pub async fn health(&self) -> Result<HealthReport, ClientError> {
        let result = self.call(Method::Health.as_str(), Value::Null).await?;
        serde_json::from_value(result).map_err(|err| ClientError::Decode(err.to_string()))
    }

    /// Method catalogue; never waits for readiness
    pub async fn list_methods(&self) -> Result<Vec<MethodInfo>, ClientError> {
        let result = self.call(Method::ListMethods.as_str(), Value::Null).await?;
        serde_json::from_value(result).map_err(|err| ClientError::Decode(err.to_string()))
    }

    /// A combo, or `None` when the id is unknown
    pub async fn combo(&self, combo_id: &str) -> Result<Option<ComboView>, ClientError> {
        self.request(Method::GetComboById, &ComboIdParams { combo_id: combo_id.into() })
            .await
    }

    /// Combos sharing a card with `combo_id`
    pub async fn distance1(&self, combo_id: &str) -> Result<Distance1Result, ClientError> {
        self.request(Method::GetDistance1Combos, &ComboIdParams { combo_id: combo_id.into() })
            .await
    }

    /// Combos two hops from `combo_id`
    pub async fn distance2(&self, combo_id: &str) -> Result<Distance2Result, ClientError> {
        self.request(Method::GetDistance2Combos, &ComboIdParams { combo_id: combo_id.into() })
            .await
    }

    /// Shared-card chains from `combo_id`
    pub async fn chains(&self, combo_id: &str, max_depth: i64) -> Result<ChainResult, ClientError> {
        let params = ChainParams {
            combo_id: combo_id.into(),
            max_depth,
        };
        self.request(Method::FindComboChainsFromCombo, &params).await
    }

    /// Effect-to-prerequisite chains from `combo_id`
    pub async fn enabling_chains(&self, combo_id: &str, max_depth: i64) -> Result<ChainResult, ClientError> {
        let params = ChainParams {
            combo_id: combo_id.into(),
            max_depth,
        };
        self.request(Method::FindEnablingChains, &params).await
    }

    /// Combos containing `card_name`
    pub async fn combos_by_card(&self, card_name: &str, limit: Option<usize>) -> Result<CardSearchResult, ClientError> {
        let params = CardSearchParams {
            card_name: card_name.into(),
            limit,
        };
        self.request(Method::SearchCombosByCard, &params).await
    }

    /// Centrality of one card, or the top cards
    pub async fn card_importance(
        &self,
        card_name: Option<&str>,
        limit: Option<usize>,
    ) -> Result<CardImportanceResult, ClientError> {
        let params = CardImportanceParams {
            card_name: card_name.map(str::to_string),
            limit,
        };
        self.request(Method::GetCardImportance, &params).await
    }

    /// Connected packages at a shared-card threshold
    pub async fn packages(&self, min_shared_cards: i64, limit: Option<usize>) -> Result<PackageList, ClientError> {
        let params = PackageParams {
            min_shared_cards,
            limit,
        };
        self.request(Method::FindComboPackages, &params).await
    }

    /// Package grown from seed combos
    pub async fn package_for(
        &self,
        combo_ids: &[String],
        min_shared_cards: i64,
        expand: bool,
    ) -> Result<SeededPackage, ClientError> {
        let params = SeededPackageParams {
            combo_ids: combo_ids.to_vec(),
            min_shared_cards,
            expand,
        };
        self.request(Method::GetComboPackageById, &params).await
    }

    /// Aggregate statistics
    pub async fn statistics(&self) -> Result<GraphStatistics, ClientError> {
        self.request(Method::GetGraphStatistics, &serde_json::Map::new()).await
    }

    /// Combos of one color identity
    pub async fn combos_by_color_identity(
        &self,
        color_identity: &str,
        limit: Option<usize>,
    ) -> Result<ColorIdentityResult, ClientError> {
        let params = ColorIdentityParams {
            color_identity: color_identity.into(),
            limit,
        };
        self.request(Method::GetCombosByColorIdentity, &params).await
    }

    /// Related combos ranked by overlap
    pub async fn related(&self, combo_id: &str, limit: i64) -> Result<RelatedResult, ClientError> {
        let params = RelatedParams {
            combo_id: combo_id.into(),
            limit,
        };
        self.request(Method::GetRelatedCombos, &params).await
    }
}

impl Drop for ComboGraphClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// Hand a response to its waiter; unknown ids are logged and dropped
fn route(pending: &PendingMap, line: &str) {
    let response: RpcResponse = match serde_json::from_str(line) {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "Discarding undecodable response");
            return;
        }
    };

    let Some(id) = response.id.as_u64() else {
        warn!(error = ?response.error, "Response without a request id");
        return;
    };

    match pending.lock().remove(&id) {
        Some(waiter) => {
            if waiter.send(response).is_err() {
                debug!(id, "Waiter gone before response arrived");
            }
        }
        None => debug!(id, "Response for an expired request"),
    }
}
