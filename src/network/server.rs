//! WebSocket Room Server
//!
//! One HTTP listener serves both the static client assets and the realtime
//! channel at `/ws`. Each websocket gets a connection id, an outbox drained
//! by a sender task, and a read loop that decodes frames and hands them to
//! the shared [`RoomRegistry`]. Timers the registry asks for are spawned as
//! sleeping tasks that call back into it.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, RwLock};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, instrument, warn};

use crate::core::rng::{EntropyRng, RandomSource};
use crate::network::protocol::{ClientMessage, ServerMessage};
use crate::room::{ConnectionId, RegistryConfig, RoomRegistry, Scheduled};

/// Path of the realtime channel.
pub const WS_PATH: &str = "/ws";
/// Liveness check.
pub const HEALTHZ_PATH: &str = "/healthz";

/// Registry shared by every connection task.
pub type SharedRegistry = Arc<RwLock<RoomRegistry>>;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Directory served for every non-websocket path.
    pub static_dir: PathBuf,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Delay before an empty room is deleted.
    pub grace_period: Duration,
    /// Roll latch hold time.
    pub roll_cooldown: Duration,
    /// Per-connection outbound queue length.
    pub outbox_capacity: usize,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            static_dir: PathBuf::from("public"),
            max_connections: 1000,
            grace_period: Duration::from_millis(5000),
            roll_cooldown: Duration::from_millis(3000),
            outbox_capacity: 64,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns per variable.
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(port) = parse_var::<u16>(&lookup, "PORT") {
            config.bind_addr = SocketAddr::from(([0, 0, 0, 0], port));
        }
        if let Some(addr) = parse_var::<SocketAddr>(&lookup, "DICE_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(dir) = lookup("DICE_STATIC_DIR").filter(|d| !d.is_empty()) {
            config.static_dir = PathBuf::from(dir);
        }
        if let Some(max) = parse_var::<usize>(&lookup, "DICE_MAX_CONNECTIONS") {
            config.max_connections = max;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "DICE_ROOM_GRACE_MS") {
            config.grace_period = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "DICE_ROLL_COOLDOWN_MS") {
            config.roll_cooldown = Duration::from_millis(ms);
        }

        config
    }

    /// The registry's slice of this configuration.
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            grace_period: self.grace_period,
            roll_cooldown: self.roll_cooldown,
            max_connections: self.max_connections,
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable environment value");
            None
        }
    }
}

/// Room server errors.
#[derive(Debug, thiserror::Error)]
pub enum RoomServerError {
    /// Failed to bind or serve.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Static asset directory is missing.
    #[error("static directory {0} does not exist")]
    MissingStaticDir(PathBuf),
}

#[derive(Clone)]
struct AppState {
    registry: SharedRegistry,
    outbox_capacity: usize,
    version: String,
    shutdown_tx: broadcast::Sender<()>,
}

/// The room server.
pub struct RoomServer {
    config: ServerConfig,
    registry: SharedRegistry,
    shutdown_tx: broadcast::Sender<()>,
}

impl RoomServer {
    /// Create a server whose rolls draw from OS entropy.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_rng(config, Box::new(EntropyRng::new()))
    }

    /// Create a server with an explicit random source.
    pub fn with_rng(config: ServerConfig, rng: Box<dyn RandomSource>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let registry = RoomRegistry::new(config.registry_config(), rng);
        Self {
            config,
            registry: Arc::new(RwLock::new(registry)),
            shutdown_tx,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Handle on the shared registry.
    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    /// HTTP routes: websocket, health check, static assets.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            outbox_capacity: self.config.outbox_capacity,
            version: self.config.version.clone(),
            shutdown_tx: self.shutdown_tx.clone(),
        };

        Router::new()
            .route(WS_PATH, get(ws_handler))
            .route(HEALTHZ_PATH, get(healthz))
            .fallback_service(ServeDir::new(&self.config.static_dir))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the configured address and serve until shutdown.
    #[instrument(skip(self), fields(addr = %self.config.bind_addr))]
    pub async fn run(&self) -> Result<(), RoomServerError> {
        if !self.config.static_dir.is_dir() {
            return Err(RoomServerError::MissingStaticDir(self.config.static_dir.clone()));
        }
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), RoomServerError> {
        info!("Room server listening on {}", listener.local_addr()?);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Shutdown signal received");
            })
            .await?;
        Ok(())
    }

    /// Ask [`RoomServer::serve`] and every connection to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.registry.read().await;
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
        "rooms": registry.room_count(),
        "connections": registry.connection_count(),
    }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one websocket from handshake to cleanup.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn = ConnectionId::new();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(state.outbox_capacity);

    // Register client
    let registered = state.registry.write().await.connect(conn, msg_tx);
    if let Err(e) = registered {
        warn!(%conn, "rejecting connection: {}", e);
        if let Ok(text) = e.to_message().to_json() {
            let _ = ws_sender.send(Message::Text(text)).await;
        }
        let _ = ws_sender.send(Message::Close(None)).await;
        return;
    }

    // Spawn message sender task. It ends once the registry drops the
    // outbox, which happens on disconnect or when the client falls behind.
    let mut sender_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            let text = match msg.to_json() {
                Ok(t) => t,
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut shutdown_rx = state.shutdown_tx.subscribe();

    // Handle incoming messages
    loop {
        tokio::select! {
            frame = ws_receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match ClientMessage::from_json(&text) {
                        Ok(msg) => {
                            debug!(%conn, request = msg.kind(), "message received");
                            let scheduled = state.registry.write().await.dispatch(conn, msg);
                            schedule(&state.registry, scheduled);
                        }
                        Err(e) => {
                            debug!(%conn, "invalid message: {}", e);
                            state.registry.write().await.reject_frame(conn);
                        }
                    },
                    Some(Ok(Message::Binary(_))) => state.registry.write().await.reject_frame(conn),
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(%conn, "client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!(%conn, "websocket error: {}", e);
                        break;
                    }
                    // Ping/pong frames are answered by the websocket layer.
                    Some(Ok(_)) => {}
                }
            }
            _ = &mut sender_task => {
                debug!(%conn, "outbound stream closed");
                break;
            }
            _ = shutdown_rx.recv() => break,
        }
    }

    // Cleanup
    let scheduled = state.registry.write().await.disconnect(conn);
    schedule(&state.registry, scheduled);
    sender_task.abort();
}

/// Spawn a sleeping task per timer that hands it back to the registry.
pub fn schedule(registry: &SharedRegistry, scheduled: Vec<Scheduled>) {
    for Scheduled { after, timer } in scheduled {
        let registry = registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            registry.write().await.fire(timer);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use crate::core::rng::DeterministicRng;
    use crate::room::Timer;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.static_dir, PathBuf::from("public"));
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.grace_period, Duration::from_secs(5));
        assert_eq!(config.roll_cooldown, Duration::from_secs(3));
        assert_eq!(config.outbox_capacity, 64);
    }

    #[test]
    fn test_port_override() {
        let config = ServerConfig::from_lookup(lookup(&[("PORT", "8088")]));
        assert_eq!(config.bind_addr, SocketAddr::from(([0, 0, 0, 0], 8088)));
    }

    #[test]
    fn test_bind_addr_wins_over_port() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("PORT", "8088"),
            ("DICE_BIND_ADDR", "127.0.0.1:9000"),
        ]));
        assert_eq!(config.bind_addr, SocketAddr::from(([127, 0, 0, 1], 9000)));
    }

    #[test]
    fn test_timing_overrides_and_bad_values() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("DICE_ROOM_GRACE_MS", "250"),
            ("DICE_ROLL_COOLDOWN_MS", "soon"),
            ("DICE_MAX_CONNECTIONS", "12"),
            ("DICE_STATIC_DIR", "assets"),
        ]));
        assert_eq!(config.grace_period, Duration::from_millis(250));
        assert_eq!(config.roll_cooldown, Duration::from_millis(3000));
        assert_eq!(config.max_connections, 12);
        assert_eq!(config.static_dir, PathBuf::from("assets"));

        let registry = config.registry_config();
        assert_eq!(registry.grace_period, Duration::from_millis(250));
        assert_eq!(registry.max_connections, 12);
    }

    #[tokio::test]
    async fn test_missing_static_dir_is_reported() {
        let config = ServerConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            static_dir: PathBuf::from("definitely/not/here"),
            ..ServerConfig::default()
        };
        let server = RoomServer::with_rng(config, Box::new(DeterministicRng::new(1)));
        assert!(matches!(server.run().await, Err(RoomServerError::MissingStaticDir(_))));
    }

    #[tokio::test]
    async fn test_schedule_fires_after_delay() {
        let server = RoomServer::with_rng(ServerConfig::default(), Box::new(DeterministicRng::new(1)));
        let registry = server.registry();
        let conn = ConnectionId::new();
        let (tx, _rx) = mpsc::channel(8);
        {
            let mut reg = registry.write().await;
            reg.connect(conn, tx).unwrap();
            reg.create_room(conn, "t", "").unwrap();
        }
        let generation = registry.read().await.room("t").unwrap().drain.unwrap();

        schedule(&registry, vec![Scheduled {
            after: Duration::from_millis(10),
            timer: Timer::DrainRoom { room: "t".into(), generation },
        }]);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(registry.read().await.room("t").is_none());
    }
}
