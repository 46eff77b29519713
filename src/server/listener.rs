//! Relay server listener
//!
//! Serves the ingest and view WebSocket routes over axum and spawns one
//! session per upgraded connection.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::Result;
use crate::registry::{RegistryConfig, StreamId, StreamRegistry};
use crate::session::{SessionContext, SessionRole};
use crate::sink::LogSink;
use crate::stats::RelayStats;

use super::config::ServerConfig;
use super::connection::WsConnection;
use super::ingest::IngestSession;
use super::view::{ViewSession, ViewTimeouts};

/// State shared by every request handler
struct Shared {
    config: ServerConfig,
    registry: Arc<StreamRegistry>,
    sink: LogSink,
    stats: Arc<RelayStats>,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

/// Media relay server
pub struct RelayServer {
    shared: Arc<Shared>,
}

impl RelayServer {
    /// Create a new server with broadcast-only delivery
    pub fn new(config: ServerConfig) -> Self {
        Self::with_parts(config, RegistryConfig::default(), LogSink::disabled())
    }

    /// Create a new server with custom registry configuration and log sink
    pub fn with_parts(config: ServerConfig, registry_config: RegistryConfig, sink: LogSink) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            shared: Arc::new(Shared {
                config,
                registry: Arc::new(StreamRegistry::with_config(registry_config)),
                sink,
                stats: Arc::new(RelayStats::new()),
                next_session_id: AtomicU64::new(1),
                connection_semaphore,
            }),
        }
    }

    /// Get a reference to the stream registry
    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.shared.registry
    }

    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.shared.stats
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.shared.config.bind_addr
    }

    /// Build the HTTP router
    pub fn router(&self) -> Router {
        let config = &self.shared.config;
        Router::new()
            .route("/", get(health))
            .route(&format!("{}/stats", config.route_prefix), get(stream_stats))
            .route(&config.ingest_route(), get(ingest))
            .route(&config.view_route(), get(view))
            .with_state(Arc::clone(&self.shared))
    }

    /// Run the server
    ///
    /// This method blocks until the server fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.shared.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already-bound listener
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!(
            addr = %listener.local_addr()?,
            ingest = %self.shared.config.ingest_route(),
            view = %self.shared.config.view_route(),
            log_sink = self.shared.sink.is_enabled(),
            "Relay server listening"
        );

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

        Ok(())
    }
}

impl Shared {
    /// Check the connection limit
    fn acquire_permit(&self, peer: SocketAddr) -> std::result::Result<Option<OwnedSemaphorePermit>, Response> {
        let Some(sem) = &self.connection_semaphore else {
            return Ok(None);
        };

        match Arc::clone(sem).try_acquire_owned() {
            Ok(permit) => Ok(Some(permit)),
            Err(_) => {
                self.stats.connection_rejected();
                tracing::warn!(peer = %peer, "Connection rejected: limit reached");
                Err((StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response())
            }
        }
    }

    /// Parse the path parameter and allocate a session context
    fn session_context(
        &self,
        stream_id: &str,
        peer: SocketAddr,
        role: SessionRole,
    ) -> std::result::Result<SessionContext, Response> {
        let stream = StreamId::parse(stream_id)
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()).into_response())?;
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            session_id = session_id,
            peer = %peer,
            stream = %stream,
            role = %role,
            "New connection"
        );

        Ok(SessionContext::new(session_id, stream, role).with_peer(peer))
    }
}

async fn ingest(
    ws: WebSocketUpgrade,
    Path(stream_id): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(shared): State<Arc<Shared>>,
) -> Response {
    let ctx = match shared.session_context(&stream_id, peer, SessionRole::Producer) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let permit = match shared.acquire_permit(peer) {
        Ok(permit) => permit,
        Err(response) => return response,
    };

    ws.max_message_size(shared.config.max_message_size)
        .on_upgrade(move |socket| async move {
            let _permit = permit;
            shared.stats.producer_opened();

            let session = IngestSession::new(
                ctx,
                WsConnection::new(socket),
                Arc::clone(&shared.registry),
                shared.sink.clone(),
                shared.config.idle_timeout,
            );
            session.run().await;

            shared.stats.producer_closed();
        })
}

async fn view(
    ws: WebSocketUpgrade,
    Path(stream_id): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(shared): State<Arc<Shared>>,
) -> Response {
    let ctx = match shared.session_context(&stream_id, peer, SessionRole::Consumer) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let permit = match shared.acquire_permit(peer) {
        Ok(permit) => permit,
        Err(response) => return response,
    };

    let timeouts = ViewTimeouts {
        idle: shared.config.idle_timeout,
        send: shared.config.send_timeout,
        ping: shared.config.ping_interval,
    };

    ws.max_message_size(shared.config.max_message_size)
        .on_upgrade(move |socket| async move {
            let _permit = permit;
            shared.stats.consumer_opened();

            let session = ViewSession::new(
                ctx,
                WsConnection::new(socket),
                Arc::clone(&shared.registry),
                timeouts,
            );
            session.run().await;

            shared.stats.consumer_closed();
        })
}

async fn health(State(shared): State<Arc<Shared>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "streams": shared.registry.stream_count().await,
        "connections": shared.stats.snapshot(),
        "log_sink": shared.sink.stats(),
    }))
}

async fn stream_stats(State(shared): State<Arc<Shared>>) -> impl IntoResponse {
    let streams: serde_json::Map<String, serde_json::Value> = shared
        .registry
        .all_stats()
        .await
        .into_iter()
        .map(|(id, stats)| {
            let value = serde_json::to_value(stats).unwrap_or(serde_json::Value::Null);
            (id.to_string(), value)
        })
        .collect();

    Json(serde_json::Value::Object(streams))
}
