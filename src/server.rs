// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Service front-end
//!
//! Serves newline-delimited JSON frames over TCP or stdio. The listener is
//! up before the dataset finishes loading; queries arriving early wait for
//! readiness up to a bounded time, `health` is answered immediately.

use crate::config::{QuerySettings, ServerSettings, Settings};
use crate::query::QueryEngine;
use crate::rpc::{self, HealthReport, HealthStatus, Method, RpcError, RpcResponse};
use anyhow::{Context, Result};
use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, error, info, warn};

/// Requests slower than this are logged at warn level
const SLOW_REQUEST: Duration = Duration::from_secs(1);

/// Graph availability
#[derive(Clone)]
pub enum Readiness {
    /// Dataset load in progress
    Loading,
    /// Graph built and queryable
    Ready(Arc<QueryEngine>),
    /// Dataset load failed
    Failed(Arc<str>),
}

/// Shared state behind every connection
pub struct Service {
    readiness: watch::Sender<Readiness>,
    permits: Semaphore,
    settings: ServerSettings,
}

impl Service {
    /// A service that starts in the loading state
    #[must_use]
    pub fn new(settings: ServerSettings) -> Arc<Self> {
        let (readiness, _) = watch::channel(Readiness::Loading);
        Arc::new(Self {
            readiness,
            permits: Semaphore::new(settings.max_concurrent_requests.max(1)),
            settings,
        })
    }

    /// Front-end settings
    #[must_use]
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Publish a built engine; waiting requests proceed
    pub fn mark_ready(&self, engine: Arc<QueryEngine>) {
        self.readiness.send_replace(Readiness::Ready(engine));
    }

    /// Publish a load failure; waiting requests fail
    pub fn mark_failed(&self, reason: impl Into<Arc<str>>) {
        self.readiness.send_replace(Readiness::Failed(reason.into()));
    }

    /// Current readiness
    #[must_use]
    pub fn readiness(&self) -> Readiness {
        self.readiness.borrow().clone()
    }

    /// `health` result for the current state
    #[must_use]
    pub fn health(&self) -> HealthReport {
        match self.readiness() {
            Readiness::Loading => HealthReport::unavailable(HealthStatus::Loading),
            Readiness::Ready(engine) => HealthReport::ready(&engine),
            Readiness::Failed(_) => HealthReport::unavailable(HealthStatus::Failed),
        }
    }

    async fn wait_ready(&self) -> Result<Arc<QueryEngine>, RpcError> {
        let mut rx = self.readiness.subscribe();
        let deadline = tokio::time::sleep(self.settings.readiness_wait());
        tokio::pin!(deadline);

        loop {
            let state = rx.borrow_and_update().clone();
            match state {
                Readiness::Ready(engine) => return Ok(engine),
                Readiness::Failed(reason) => {
                    return Err(RpcError::internal(format!("dataset failed to load: {reason}")))
                }
                Readiness::Loading => {}
            }

            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Err(RpcError::not_ready());
                    }
                }
                () = &mut deadline => return Err(RpcError::not_ready()),
            }
        }
    }

    async fn execute(&self, method: Method, params: Value) -> Result<Value, RpcError> {
        match method {
            Method::Health => return rpc::to_value(&self.health()),
            Method::ListMethods => return rpc::to_value(&rpc::catalogue()),
            _ => {}
        }

        let engine = self.wait_ready().await?;
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| RpcError::internal("service is shutting down"))?;

        if method.is_expensive() {
            tokio::task::spawn_blocking(move || rpc::dispatch(&engine, method, params))
                .await
                .map_err(|err| RpcError::internal(format!("handler failed: {err}")))?
        } else {
            rpc::dispatch(&engine, method, params)
        }
    }

    /// Answer one frame
    pub async fn handle_frame(&self, line: &str) -> RpcResponse {
        let request = match rpc::parse_frame(line) {
            Ok(request) => request,
            Err(response) => {
                warn!("Rejected malformed frame");
                return response;
            }
        };

        let Some(method) = Method::from_name(&request.method) else {
            debug!(method = %request.method, "Unknown method");
            return RpcResponse::failure(request.id, RpcError::method_not_found(&request.method));
        };

        let started = Instant::now();
        let outcome = self.execute(method, request.params).await;
        let elapsed = started.elapsed();

        if elapsed >= SLOW_REQUEST {
            warn!(%method, elapsed_ms = elapsed.as_millis() as u64, "Slow request");
        } else {
            debug!(%method, elapsed_ms = elapsed.as_millis() as u64, ok = outcome.is_ok(), "Handled request");
        }

        RpcResponse::from_outcome(request.id, outcome)
    }
}

// =============================================================================
// Connections
// =============================================================================

/// A decoded input frame
enum Frame {
    Line(String),
    Oversized,
    NotUtf8,
}

/// Line codec that reports oversized and non-UTF-8 lines as frames instead
/// of errors, so the stream keeps yielding the lines after them. Both are
/// already consumed from the buffer when the inner codec rejects them.
struct FrameCodec {
    lines: LinesCodec,
}

impl FrameCodec {
    fn new(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
        }
    }

    fn map(result: Result<Option<String>, LinesCodecError>) -> Result<Option<Frame>, LinesCodecError> {
        match result {
            Ok(line) => Ok(line.map(Frame::Line)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Frame::Oversized)),
            Err(LinesCodecError::Io(err)) if err.kind() == std::io::ErrorKind::InvalidData => {
                Ok(Some(Frame::NotUtf8))
            }
            Err(err) => Err(err),
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = LinesCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, LinesCodecError> {
        Self::map(self.lines.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, LinesCodecError> {
        Self::map(self.lines.decode_eof(buf))
    }
}

/// Serve frames from one byte stream until it closes.
///
/// Each frame runs in its own task and responses are written in completion
/// order by a single writer task. At most `max_concurrent_requests` frames
/// are in flight per connection; further frames are not read until one
/// finishes, and a peer that stops reading stalls its own connection only.
pub async fn serve_connection<R, W>(service: Arc<Service>, reader: R, writer: W, peer: &str) -> Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let max_frame = service.settings.max_frame_bytes;
    let in_flight_limit = service.settings.max_concurrent_requests.max(1);
    let in_flight = Arc::new(Semaphore::new(in_flight_limit));
    let mut frames = FramedRead::new(reader, FrameCodec::new(max_frame));
    let mut sink = FramedWrite::new(writer, LinesCodec::new());

    let (tx, mut rx) = mpsc::channel::<String>(in_flight_limit);
    let writer_task: JoinHandle<Result<()>> = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            sink.send(line).await.context("Failed to write response")?;
        }
        Ok(())
    });

    while let Some(frame) = frames.next().await {
        let rejected = match frame {
            Ok(Frame::Line(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let permit = Arc::clone(&in_flight)
                    .acquire_owned()
                    .await
                    .context("Connection limiter closed")?;
                let service = Arc::clone(&service);
                let tx = tx.clone();
                tokio::spawn(async move {
                    let response = service.handle_frame(&line).await;
                    if tx.send(response.to_line()).await.is_err() {
                        debug!("Connection closed before response was written");
                    }
                    drop(permit);
                });
                continue;
            }
            Ok(Frame::Oversized) => {
                warn!(peer, max_frame, "Rejected oversized frame");
                RpcError::invalid_request(format!("frame exceeds {max_frame} bytes"))
            }
            Ok(Frame::NotUtf8) => {
                warn!(peer, "Rejected frame that is not UTF-8");
                RpcError::parse("frame is not valid UTF-8")
            }
            Err(err) => {
                warn!(peer, error = %err, "Read failed");
                break;
            }
        };

        let response = RpcResponse::failure(Value::Null, rejected);
        if tx.send(response.to_line()).await.is_err() {
            break;
        }
    }

    // In-flight tasks hold sender clones; the writer drains until they finish
    drop(tx);
    writer_task.await.context("Writer task panicked")?
}

/// Accept TCP connections until `shutdown` completes
pub async fn serve_listener<F>(listener: TcpListener, service: Arc<Service>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("Shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!(error = %err, "Accept failed");
                        continue;
                    }
                };
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    let peer = addr.to_string();
                    info!(peer = %peer, "Connection opened");
                    let (reader, writer) = stream.into_split();
                    if let Err(err) = serve_connection(service, reader, writer, &peer).await {
                        warn!(peer = %peer, error = %err, "Connection failed");
                    }
                    info!(peer = %peer, "Connection closed");
                });
            }
        }
    }
}

// =============================================================================
// Startup
// =============================================================================

/// Load the dataset on the blocking pool and publish the result
pub fn spawn_loader(service: Arc<Service>, path: PathBuf, settings: QuerySettings) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        let started = Instant::now();
        let loaded = tokio::task::spawn_blocking(move || {
            let engine = QueryEngine::open(&path, settings)?;
            // Statistics (including the largest component) are computed up front
            engine.statistics();
            Ok::<_, crate::error::LoadError>(engine)
        })
        .await;

        match loaded {
            Ok(Ok(engine)) => {
                info!(
                    combos = engine.graph().combo_count(),
                    cards = engine.graph().card_count(),
                    edges = engine.graph().edge_count(),
                    fingerprint = %engine.dataset().fingerprint,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Combo graph ready"
                );
                service.mark_ready(Arc::new(engine));
                Ok(())
            }
            Ok(Err(err)) => {
                error!(error = %err, "Dataset load failed");
                service.mark_failed(err.to_string());
                Err(err.into())
            }
            Err(err) => {
                service.mark_failed("dataset loader panicked");
                Err(anyhow::anyhow!("Dataset loader panicked: {err}"))
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Could not install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}

/// Run the service until shutdown, stdin EOF, or a failed load.
///
/// The stdio carrier leaves a blocking stdin read behind; the caller's
/// runtime must be shut down without waiting for it.
pub async fn run(settings: Settings, stdio: bool) -> Result<()> {
    let service = Service::new(settings.server.clone());

    let mut serving: std::pin::Pin<Box<dyn Future<Output = Result<()>> + Send>> = if stdio {
        info!("Serving on stdio");
        let service = Arc::clone(&service);
        Box::pin(async move {
            tokio::select! {
                result = serve_connection(service, tokio::io::stdin(), tokio::io::stdout(), "stdio") => result,
                () = shutdown_signal() => Ok(()),
            }
        })
    } else {
        let address = settings.server.address();
        let listener = TcpListener::bind(&address)
            .await
            .with_context(|| format!("Failed to bind {address}"))?;
        info!(address = %listener.local_addr()?, "Listening");
        Box::pin(serve_listener(listener, Arc::clone(&service), shutdown_signal()))
    };

    let mut loader = spawn_loader(Arc::clone(&service), settings.dataset.path.clone(), settings.query.clone());

    let first = tokio::select! {
        result = &mut serving => Finished::Serving(result),
        joined = &mut loader => Finished::Loader(joined),
    };

    match first {
        Finished::Serving(result) => {
            result?;
            if stdio {
                // The session may end before the load does; a failed load still fails the run
                loader_outcome(loader.await)
            } else {
                loader.abort();
                Ok(())
            }
        }
        Finished::Loader(joined) => {
            loader_outcome(joined)?;
            serving.await
        }
    }
}

/// Whichever of serving and loading completed first
enum Finished {
    Serving(Result<()>),
    Loader(Result<Result<()>, tokio::task::JoinError>),
}

fn loader_outcome(joined: Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    match joined {
        Ok(result) => result.context("Combo graph could not be loaded"),
        Err(err) => Err(anyhow::anyhow!("Dataset loader task failed: {err}")),
    }
}
