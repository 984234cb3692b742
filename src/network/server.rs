//! WebSocket Coordinator Server
//!
//! Async WebSocket server handling authentication, room admission, and
//! game message routing. This module is intentionally **not**
//! deterministic — all simulation state lives in `sim::`.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock, broadcast};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};

use crate::error::CoordinatorError;
use crate::network::auth::{AuthConfig, validate_token};
use crate::network::protocol::{close_codes, decode_input_bytes, info_codes, ClientMessage, Outbound, ServerMessage, StateSnapshot};
use crate::network::room::{Room, RoomConfig, RoomError, RoomManager, RoomState};
use crate::core::fixed::{to_fixed, Fixed};

fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Top-level server configuration (§6 operational surface).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub max_connections: usize,
    /// How long a connection may sit idle (no message received) before
    /// it's closed (§5 heartbeat, default 20s).
    pub connection_timeout: Duration,
    /// How long a connection has to send `auth` before it's closed
    /// with [`close_codes::AUTH_TIMEOUT`] (§5, default 5s).
    pub auth_timeout: Duration,
    pub tick_rate: u32,
    pub room: RoomConfig,
    pub auth: AuthConfig,
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            max_connections: 1000,
            connection_timeout: Duration::from_secs(20),
            auth_timeout: Duration::from_secs(5),
            tick_rate: 30,
            room: RoomConfig::default(),
            auth: AuthConfig::from_env(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// How long an empty room survives before [`GameServer::run_cleanup_loop`]
/// drops it (§5).
const EMPTY_ROOM_GRACE: Duration = Duration::from_secs(60);

/// Speed applied to a bound entity's movement input when a committed
/// frame is replayed into the room's authoritative state.
const MOVE_SPEED: Fixed = to_fixed(5.0);

/// Per-connection state tracked by the accept loop.
struct ConnectedClient {
    authenticated: bool,
    room_id: Option<String>,
    player_id: Option<u16>,
    connected_at: Instant,
    last_activity: Instant,
    sender: mpsc::Sender<Outbound>,
}

/// The coordinator server.
pub struct GameServer {
    config: ServerConfig,
    rooms: Arc<RoomManager>,
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            rooms: Arc::new(RoomManager::new()),
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Signal every connection and the accept loop to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), CoordinatorError> {
        let listener = TcpListener::bind(&self.config.bind_addr)
            .await
            .map_err(CoordinatorError::BindFailed)?;
        info!("coordinator listening on {}", self.config.bind_addr);

        let cleanup_rooms = self.rooms.clone();
        let cleanup_clients = self.clients.clone();
        let auth_timeout = self.config.auth_timeout;
        let heartbeat_timeout = self.config.connection_timeout;
        let tick_config = self.config.room.clone();
        let tick_rooms = self.rooms.clone();

        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_rooms, cleanup_clients, auth_timeout, heartbeat_timeout).await;
        });
        let tick_handle = tokio::spawn(async move {
            Self::run_tick_loop(tick_rooms, tick_config).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.clients.read().await.len() >= self.config.max_connections {
                                warn!("connection limit reached, rejecting {}", addr);
                                continue;
                            }
                            info!("new connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => error!("accept error: {}", e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        cleanup_handle.abort();
        tick_handle.abort();
        Ok(())
    }

    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let rooms = self.rooms.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<Outbound>(64);

            {
                let mut clients = clients.write().await;
                clients.insert(addr, ConnectedClient {
                    authenticated: false,
                    room_id: None,
                    player_id: None,
                    connected_at: Instant::now(),
                    last_activity: Instant::now(),
                    sender: msg_tx.clone(),
                });
            }

            let sender_task = tokio::spawn(async move {
                while let Some(event) = msg_rx.recv().await {
                    match event {
                        Outbound::Message(msg) => {
                            let text = match msg.to_json() {
                                Ok(t) => t,
                                Err(e) => {
                                    error!("failed to serialize outbound message: {}", e);
                                    continue;
                                }
                            };
                            if ws_sender.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Outbound::Close { code, reason } => {
                            let frame = tokio_tungstenite::tungstenite::protocol::CloseFrame {
                                code: tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode::from(code),
                                reason: reason.into(),
                            };
                            let _ = ws_sender.send(Message::Close(Some(frame))).await;
                            break;
                        }
                    }
                }
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                if text.len() > config.room.max_message_bytes {
                                    let _ = msg_tx.send(Outbound::msg(ServerMessage::Error {
                                        code: info_codes::OVERSIZED_MESSAGE,
                                        message: "message exceeds size limit".into(),
                                    })).await;
                                    continue;
                                }
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("malformed message from {}: {}", addr, e);
                                        let _ = msg_tx.send(Outbound::msg(ServerMessage::Error {
                                            code: info_codes::MALFORMED_ENVELOPE,
                                            message: "could not parse message".into(),
                                        })).await;
                                        continue;
                                    }
                                };

                                {
                                    let mut clients = clients.write().await;
                                    if let Some(client) = clients.get_mut(&addr) {
                                        client.last_activity = Instant::now();
                                    }
                                }

                                Self::handle_client_message(addr, client_msg, &clients, &rooms, &config, &msg_tx).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("websocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(Outbound::msg(ServerMessage::Error {
                            code: info_codes::SERVER_SHUTDOWN,
                            message: "server is shutting down".into(),
                        })).await;
                        break;
                    }
                }
            }

            sender_task.abort();

            let removed = clients.write().await.remove(&addr);
            if let Some(client) = removed {
                if let (Some(room_id), Some(player_id)) = (client.room_id, client.player_id) {
                    if let Some(room) = rooms.get(&room_id).await {
                        let mut room = room.write().await;
                        let _ = room.mark_disconnected(player_id);
                        room.broadcast(ServerMessage::PlayerLeft { player_id }).await;
                    }
                }
            }

            info!("client {} cleaned up", addr);
        });
    }

    async fn handle_client_message(
        addr: SocketAddr,
        msg: ClientMessage,
        clients: &Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
        rooms: &Arc<RoomManager>,
        config: &ServerConfig,
        sender: &mpsc::Sender<Outbound>,
    ) {
        match msg {
            ClientMessage::Auth { token } => {
                Self::handle_auth(addr, token, clients, config, sender).await;
            }
            ClientMessage::Join { room_id, player_id } => {
                Self::handle_join(addr, room_id, player_id, clients, rooms, config, sender).await;
            }
            ClientMessage::Reconnect { room_id, player_id, last_frame_id } => {
                Self::handle_reconnect(addr, room_id, player_id, last_frame_id, clients, rooms, sender).await;
            }
            ClientMessage::Input { record } => {
                Self::handle_input(addr, record, clients, rooms, sender).await;
            }
            ClientMessage::Leave => {
                Self::handle_leave(addr, clients, rooms).await;
            }
        }
    }

    async fn handle_auth(
        addr: SocketAddr,
        token: String,
        clients: &Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
        config: &ServerConfig,
        sender: &mpsc::Sender<Outbound>,
    ) {
        if config.auth.is_configured() {
            if let Err(e) = validate_token(&token, &config.auth) {
                let _ = sender.send(Outbound::msg(ServerMessage::Error {
                    code: close_codes::AUTH_FAILED as i32,
                    message: format!("authentication failed: {e}"),
                })).await;
                let _ = sender.send(Outbound::Close {
                    code: close_codes::AUTH_FAILED,
                    reason: "authentication failed".into(),
                }).await;
                return;
            }
        }

        let mut clients = clients.write().await;
        if let Some(client) = clients.get_mut(&addr) {
            client.authenticated = true;
        }
    }

    async fn handle_join(
        addr: SocketAddr,
        room_id: String,
        player_id: u16,
        clients: &Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
        rooms: &Arc<RoomManager>,
        config: &ServerConfig,
        sender: &mpsc::Sender<Outbound>,
    ) {
        if !Self::require_auth(addr, clients, sender).await {
            return;
        }

        let room = rooms.get_or_create(&room_id, config.room.clone(), now_millis()).await;
        let ready = {
            let mut room_guard = room.write().await;
            match room_guard.add_player(player_id, sender.clone()) {
                Ok(()) => {}
                Err(e) => {
                    let room_full = e == RoomError::RoomFull;
                    Self::send_error(sender, e).await;
                    if room_full {
                        let _ = sender.send(Outbound::Close {
                            code: close_codes::ROOM_FULL,
                            reason: "room is full".into(),
                        }).await;
                    }
                    return;
                }
            }
            room_guard.broadcast(ServerMessage::PlayerJoined { player_id }).await;
            room_guard.is_ready_to_start()
        };

        {
            let mut clients = clients.write().await;
            if let Some(client) = clients.get_mut(&addr) {
                client.room_id = Some(room_id.clone());
                client.player_id = Some(player_id);
            }
        }

        let _ = sender.send(Outbound::msg(ServerMessage::JoinSuccess { player_id, room_id: room_id.clone() })).await;

        if ready {
            let mut room_guard = room.write().await;
            if room_guard.start().is_ok() {
                let seed = room_guard.game_state.rng.state();
                let player_count = config.room.player_count;
                let tick_rate = config.room.tick_rate;
                room_guard.broadcast(ServerMessage::GameStart { seed, player_count, tick_rate }).await;
            }
        }
    }

    async fn handle_reconnect(
        addr: SocketAddr,
        room_id: String,
        player_id: u16,
        last_frame_id: u32,
        clients: &Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
        rooms: &Arc<RoomManager>,
        sender: &mpsc::Sender<Outbound>,
    ) {
        if !Self::require_auth(addr, clients, sender).await {
            return;
        }

        let Some(room) = rooms.get(&room_id).await else {
            let _ = sender.send(Outbound::msg(ServerMessage::Error {
                code: info_codes::ROOM_NOT_FOUND,
                message: "no such room".into(),
            })).await;
            return;
        };

        let mut room_guard = room.write().await;
        if let Err(e) = room_guard.reconnect_player(player_id, sender.clone()) {
            Self::send_error(sender, e).await;
            return;
        }

        {
            let mut clients = clients.write().await;
            if let Some(client) = clients.get_mut(&addr) {
                client.room_id = Some(room_id.clone());
                client.player_id = Some(player_id);
            }
        }

        match room_guard.engine.frames_since(last_frame_id) {
            Some(frames) => {
                let payload = frames.iter().map(|f| {
                    (f.frame_id, f.confirmed, f.inputs.iter()
                        .map(|(pid, bytes)| (*pid, crate::network::codec::HexBytes(bytes.to_vec())))
                        .collect())
                }).collect();
                let _ = sender.send(Outbound::msg(ServerMessage::SyncFrames { frames: payload })).await;
            }
            None => {
                let _ = sender.send(Outbound::msg(ServerMessage::ResyncFull {
                    frame_id: room_guard.engine.current_frame(),
                    state_hash: room_guard.game_state.compute_state_hash(),
                    snapshot: StateSnapshot::from_state(&room_guard.game_state),
                })).await;
            }
        }
    }

    async fn handle_input(
        addr: SocketAddr,
        record: crate::network::codec::HexBytes,
        clients: &Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
        rooms: &Arc<RoomManager>,
        sender: &mpsc::Sender<Outbound>,
    ) {
        let (room_id, player_id) = {
            let clients = clients.read().await;
            match clients.get(&addr) {
                Some(c) if c.room_id.is_some() && c.player_id.is_some() => {
                    (c.room_id.clone().unwrap(), c.player_id.unwrap())
                }
                _ => {
                    let _ = sender.send(Outbound::msg(ServerMessage::Error {
                        code: info_codes::NOT_IN_ROOM,
                        message: "join a room before sending input".into(),
                    })).await;
                    return;
                }
            }
        };

        let Some(bytes) = decode_input_bytes(&record) else {
            let _ = sender.send(Outbound::msg(ServerMessage::Error {
                code: info_codes::INVALID_INPUT,
                message: "input record has the wrong length".into(),
            })).await;
            return;
        };

        if let Some(room) = rooms.get(&room_id).await {
            let mut room_guard = room.write().await;
            if let Err(e) = room_guard.submit_input(player_id, bytes) {
                let disconnect = e == RoomError::PolicyViolation;
                Self::send_error(sender, e).await;
                if disconnect {
                    room_guard.close_player(player_id, close_codes::POLICY_VIOLATION, "input violation limit exceeded").await;
                }
            }
        }
    }

    async fn handle_leave(
        addr: SocketAddr,
        clients: &Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
        rooms: &Arc<RoomManager>,
    ) {
        let removed = {
            let mut clients = clients.write().await;
            clients.get_mut(&addr).map(|c| (c.room_id.take(), c.player_id.take()))
        };

        if let Some((Some(room_id), Some(player_id))) = removed {
            if let Some(room) = rooms.get(&room_id).await {
                let mut room_guard = room.write().await;
                room_guard.remove_player(player_id);
                room_guard.broadcast(ServerMessage::PlayerLeft { player_id }).await;
            }
        }
    }

    async fn require_auth(
        addr: SocketAddr,
        clients: &Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
        sender: &mpsc::Sender<Outbound>,
    ) -> bool {
        let authenticated = clients.read().await.get(&addr).map(|c| c.authenticated).unwrap_or(false);
        if !authenticated {
            let _ = sender.send(Outbound::msg(ServerMessage::Error {
                code: info_codes::NOT_AUTHENTICATED,
                message: "authenticate before joining a room".into(),
            })).await;
        }
        authenticated
    }

    /// Serialize a [`RoomError`] into an `error` message, closing the
    /// connection first isn't this function's job — callers that need
    /// a close (room full, policy violation) send it themselves.
    async fn send_error(sender: &mpsc::Sender<Outbound>, e: RoomError) {
        let _ = sender.send(Outbound::msg(error_message(e))).await;
    }

    /// Advance every `Playing` room by one tick on the server's fixed
    /// clock, applying the committed frame's inputs to the room's
    /// authoritative state before broadcasting it.
    async fn run_tick_loop(rooms: Arc<RoomManager>, config: RoomConfig) {
        let period = Duration::from_secs_f64(1.0 / config.tick_rate as f64);
        let mut ticker = interval(period);
        let frame_timeout_ticks = ((config.frame_timeout_ms * config.tick_rate as u64) / 1000).max(1) as u32;
        let mut stalled_since: BTreeMap<String, u32> = BTreeMap::new();

        loop {
            ticker.tick().await;
            let room_ids = rooms.rooms_snapshot().await;

            for room_id in room_ids {
                let Some(room) = rooms.get(&room_id).await else { continue };
                let mut room_guard = room.write().await;
                if room_guard.state != RoomState::Playing {
                    continue;
                }

                let timestamp = now_millis();
                let frame = match room_guard.engine.tick(timestamp) {
                    Some(frame) => {
                        stalled_since.remove(&room_id);
                        Some(frame)
                    }
                    None => {
                        let stalls = stalled_since.entry(room_id.clone()).or_insert(0);
                        *stalls += 1;
                        if *stalls >= frame_timeout_ticks {
                            let ids = room_guard.connected_player_ids();
                            stalled_since.remove(&room_id);
                            Some(room_guard.engine.force_tick(&ids, timestamp))
                        } else {
                            None
                        }
                    }
                };

                if let Some(frame) = frame {
                    Self::apply_frame(&mut room_guard.game_state, &frame, period.as_millis() as i64);
                    room_guard.broadcast(ServerMessage::from_frame(&frame)).await;
                }
            }
        }
    }

    /// Apply one committed frame's inputs to the room's authoritative
    /// state and advance physics, so `game_state` stays a real mirror
    /// of what every client reconstructs from the same frame stream
    /// (§4.4) instead of an empty shell.
    fn apply_frame(state: &mut crate::sim::state::GameState, frame: &crate::sim::frame::Frame, dt_ms: i64) {
        for (player_id, bytes) in &frame.inputs {
            let Some(record) = crate::sim::input::InputRecord::from_bytes(bytes) else { continue };
            let Some(&entity_id) = state.player_binding.get(player_id) else { continue };
            if let Some(entity) = state.entities.get_mut(&entity_id) {
                entity.apply_input(record.flags & crate::sim::entity::input_flags::ALL, MOVE_SPEED);
            }
        }
        crate::sim::physics::update(&mut state.entities, dt_ms, &crate::sim::physics::PhysicsConfig::default());
        state.advance_frame();
    }

    /// Drop rooms past cleanup eligibility, close connections that
    /// never authenticated within `auth_timeout`, and close idle
    /// connections past `heartbeat_timeout` (§5).
    async fn run_cleanup_loop(
        rooms: Arc<RoomManager>,
        clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
        auth_timeout: Duration,
        heartbeat_timeout: Duration,
    ) {
        let mut ticker = interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            rooms.cleanup(EMPTY_ROOM_GRACE).await;

            let now = Instant::now();
            let expired: Vec<(mpsc::Sender<Outbound>, u16, &'static str)> = {
                let clients = clients.read().await;
                clients
                    .values()
                    .filter_map(|client| {
                        if !client.authenticated && now.duration_since(client.connected_at) > auth_timeout {
                            Some((client.sender.clone(), close_codes::AUTH_TIMEOUT, "authentication deadline exceeded"))
                        } else if now.duration_since(client.last_activity) > heartbeat_timeout {
                            Some((client.sender.clone(), 1000, "heartbeat timeout"))
                        } else {
                            None
                        }
                    })
                    .collect()
            };

            for (sender, code, reason) in expired {
                debug!("closing idle/unauthenticated connection: {}", reason);
                let _ = sender.send(Outbound::Close { code, reason: reason.into() }).await;
            }
        }
    }
}

fn error_message(e: RoomError) -> ServerMessage {
    let code = match e {
        RoomError::RoomFull => close_codes::ROOM_FULL as i32,
        RoomError::AlreadyJoined => info_codes::ALREADY_JOINED,
        RoomError::MatchInProgress => info_codes::MATCH_IN_PROGRESS,
        RoomError::MatchNotInProgress => info_codes::MATCH_NOT_IN_PROGRESS,
        RoomError::PlayerNotFound => info_codes::PLAYER_NOT_FOUND,
        RoomError::ReconnectExpired => info_codes::RECONNECT_EXPIRED,
        RoomError::MessageTooLarge => info_codes::OVERSIZED_MESSAGE,
        RoomError::RateLimited => close_codes::RATE_LIMITED as i32,
        RoomError::InvalidInput => info_codes::INVALID_INPUT,
        RoomError::PolicyViolation => close_codes::POLICY_VIOLATION as i32,
    };
    ServerMessage::Error { code, message: e.to_string() }
}
