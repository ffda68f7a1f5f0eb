//! HTTP server implementation using axum.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};
use tribeca_bus::MessageBus;

use crate::config::ConsoleConfig;
use crate::error::{ConsoleError, ConsoleResult};
use crate::protocol::ServerMessage;
use crate::session::Session;

/// Caps concurrent WebSocket connections.
pub struct ConnectionLimiter {
    current: AtomicUsize,
    max: usize,
}

impl ConnectionLimiter {
    pub fn new(max: usize) -> Self {
        Self {
            current: AtomicUsize::new(0),
            max,
        }
    }

    /// Take a slot, held until the returned guard is dropped.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionGuard> {
        loop {
            let current = self.current.load(Ordering::Acquire);
            if current >= self.max {
                return None;
            }
            if self
                .current
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(ConnectionGuard {
                    limiter: self.clone(),
                });
            }
        }
    }

    pub fn current_count(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }
}

pub struct ConnectionGuard {
    limiter: Arc<ConnectionLimiter>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.limiter.current.fetch_sub(1, Ordering::Release);
    }
}

/// Shared application state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    bus: MessageBus,
    connection_limiter: Arc<ConnectionLimiter>,
    config: ConsoleConfig,
}

impl AppState {
    pub fn new(bus: MessageBus, config: ConsoleConfig) -> Self {
        Self {
            bus,
            connection_limiter: Arc::new(ConnectionLimiter::new(config.max_connections)),
            config,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/metrics", get(metrics))
        .route("/health", get(|| async { "ok" }))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn metrics(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if state.config.auth_enabled() && !check_basic_auth(&headers, &state.config) {
        return unauthorized_response();
    }
    match tribeca_telemetry::gather_text() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if state.config.auth_enabled() && !check_basic_auth(&headers, &state.config) {
        return unauthorized_response();
    }

    let Some(guard) = state.connection_limiter.try_acquire() else {
        warn!(
            current = state.connection_limiter.current_count(),
            max = state.config.max_connections,
            "WebSocket connection limit reached"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    };

    info!(
        connections = state.connection_limiter.current_count(),
        "New operator connection"
    );
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state.bus, guard))
}

async fn handle_ws_connection(socket: WebSocket, bus: MessageBus, guard: ConnectionGuard) {
    let (mut sink, mut stream) = socket.split();
    let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let mut session = Session::new(bus, outgoing_tx);

    let mut writer = tokio::spawn(async move {
        while let Some(msg) = outgoing_rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "Failed to encode operator message");
                    continue;
                }
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                debug!("Failed to send message, client disconnected");
                break;
            }
        }
    });

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => session.on_text(text.as_str()),
                Some(Ok(Message::Close(_))) | None => {
                    debug!("Client closed connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "WebSocket receive error");
                    break;
                }
            },
            _ = &mut writer => break,
        }
    }

    drop(session);
    writer.abort();
    drop(guard);
    info!("Operator connection closed");
}

fn check_basic_auth(headers: &HeaderMap, config: &ConsoleConfig) -> bool {
    let Some(auth) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    else {
        return false;
    };
    let Some(encoded) = auth.strip_prefix("Basic ") else {
        return false;
    };
    let Some(decoded) = STANDARD
        .decode(encoded.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
    else {
        return false;
    };
    decoded == format!("{}:{}", config.username, config.password)
}

fn unauthorized_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"tribeca\"")],
        "Unauthorized",
    )
        .into_response()
}

/// Serve the console until `shutdown` resolves.
pub async fn run_server<F>(bus: MessageBus, config: ConsoleConfig, shutdown: F) -> ConsoleResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = config.socket_addr()?;
    let app = create_router(AppState::new(bus, config));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ConsoleError::Bind { addr, source })?;
    info!(%addr, "Starting operator console");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Operator console stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn config() -> ConsoleConfig {
        ConsoleConfig {
            username: "admin".into(),
            password: "secret".into(),
            ..Default::default()
        }
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_basic_auth() {
        let config = config();
        let good = format!("Basic {}", STANDARD.encode("admin:secret"));
        let bad = format!("Basic {}", STANDARD.encode("admin:wrong"));
        assert!(check_basic_auth(&headers(&good), &config));
        assert!(!check_basic_auth(&headers(&bad), &config));
        assert!(!check_basic_auth(&headers("Bearer abc"), &config));
        assert!(!check_basic_auth(&HeaderMap::new(), &config));
    }

    #[test]
    fn test_connection_limiter() {
        let limiter = Arc::new(ConnectionLimiter::new(2));
        let a = limiter.try_acquire();
        let b = limiter.try_acquire();
        assert!(a.is_some() && b.is_some());
        assert!(limiter.try_acquire().is_none());
        drop(a);
        assert_eq!(limiter.current_count(), 1);
        assert!(limiter.try_acquire().is_some());
    }

    #[test]
    fn test_auth_disabled_without_credentials() {
        assert!(!ConsoleConfig::default().auth_enabled());
        assert!(config().auth_enabled());
    }
}
