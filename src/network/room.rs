//! Room Lifecycle and Admission
//!
//! A [`Room`] is one running match: a [`FrameEngine`] collecting
//! input, the [`GameState`] it drives, and the connected players'
//! message channels. [`RoomManager`] owns the table of rooms and the
//! admission sequence new connections go through (§4.7): auth first,
//! then join validation, capacity check, and broadcast of the join.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{mpsc, RwLock};

use crate::network::protocol::{Outbound, ServerMessage};
use crate::sim::engine::{derive_room_seed, FrameEngine};
use crate::sim::input::InputValidator;
use crate::sim::state::GameState;

/// Room identifier, chosen by the first player to join it.
pub type RoomId = String;

/// Lifecycle state of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    /// Waiting for `config.player_count` players to join.
    Lobby,
    /// Simulation running.
    Playing,
    /// Room finished or abandoned; eligible for cleanup.
    Closed,
}

/// Connection state for reconnect support (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected { since_frame: u32 },
}

/// Tuning for one room.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Number of players required before the match starts.
    pub player_count: u16,
    /// Simulation tick rate (Hz), echoed to clients in `game_start`.
    pub tick_rate: u32,
    /// Frames a disconnected player may be absent before elimination.
    pub reconnect_timeout_frames: u32,
    /// Input-message rate limit per connection, messages/second.
    pub rate_limit_per_sec: u32,
    /// Maximum accepted message size, in bytes.
    pub max_message_bytes: usize,
    /// World bounds / coordinate range fed to each player's
    /// [`InputValidator`].
    pub coord_min: i32,
    pub coord_max: i32,
    /// Milliseconds a frame may sit incomplete before `force_tick`
    /// fills the gaps (§4.6/§6, default 1s).
    pub frame_timeout_ms: u64,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            player_count: 2,
            tick_rate: 30,
            reconnect_timeout_frames: 900, // 30s @ 30Hz
            rate_limit_per_sec: 100,
            max_message_bytes: 10 * 1024,
            coord_min: -1_000_000,
            coord_max: 1_000_000,
            frame_timeout_ms: 1_000,
        }
    }
}

/// Sliding-window rate limiter, one per connection.
#[derive(Debug)]
pub struct RateLimiter {
    limit_per_sec: u32,
    window_start: Instant,
    count_in_window: u32,
}

impl RateLimiter {
    pub fn new(limit_per_sec: u32) -> Self {
        Self {
            limit_per_sec,
            window_start: Instant::now(),
            count_in_window: 0,
        }
    }

    /// Record one request; returns `false` if it exceeds the limit for
    /// the current one-second window.
    pub fn check(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= Duration::from_secs(1) {
            self.window_start = now;
            self.count_in_window = 0;
        }
        self.count_in_window += 1;
        self.count_in_window <= self.limit_per_sec
    }
}

/// A connected player within a room.
pub struct RoomPlayer {
    pub player_id: u16,
    pub connection_state: ConnectionState,
    pub validator: InputValidator,
    pub rate_limiter: RateLimiter,
    pub sender: mpsc::Sender<Outbound>,
}

impl RoomPlayer {
    pub fn is_connected(&self) -> bool {
        matches!(self.connection_state, ConnectionState::Connected)
    }
}

/// Errors raised while admitting or operating on a room.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RoomError {
    #[error("room is full")]
    RoomFull,
    #[error("player already in room")]
    AlreadyJoined,
    #[error("match already in progress")]
    MatchInProgress,
    #[error("match not in progress")]
    MatchNotInProgress,
    #[error("player not found in room")]
    PlayerNotFound,
    #[error("reconnect window has expired")]
    ReconnectExpired,
    #[error("message exceeds the configured size limit")]
    MessageTooLarge,
    #[error("connection exceeded its request rate limit")]
    RateLimited,
    #[error("input record failed validation")]
    InvalidInput,
    #[error("connection crossed the input violation limit")]
    PolicyViolation,
}

/// One running (or lobby-phase) match.
pub struct Room {
    pub id: RoomId,
    pub state: RoomState,
    pub config: RoomConfig,
    players: BTreeMap<u16, RoomPlayer>,
    pub engine: FrameEngine,
    pub game_state: GameState,
    /// When the room's last member left, if it currently has none.
    /// Cleared the moment a player joins. A room empty for more than
    /// 60s (§5) is dropped by [`RoomManager::cleanup`].
    empty_since: Option<Instant>,
}

impl Room {
    /// Create a room in `Lobby` state, deriving its PRNG seed from the
    /// room id and the current wall clock (§9 Open Question 4).
    pub fn new(id: RoomId, config: RoomConfig, start_time_millis: u64) -> Self {
        let seed = derive_room_seed(id.as_bytes(), start_time_millis);
        Self {
            engine: FrameEngine::new(config.player_count as usize),
            game_state: GameState::new(seed),
            players: BTreeMap::new(),
            state: RoomState::Lobby,
            empty_since: None,
            id,
            config,
        }
    }

    /// Admit a new player. Rejects once the room has left `Lobby` or
    /// is already at capacity.
    pub fn add_player(&mut self, player_id: u16, sender: mpsc::Sender<Outbound>) -> Result<(), RoomError> {
        if self.state != RoomState::Lobby {
            return Err(RoomError::MatchInProgress);
        }
        if self.players.len() >= self.config.player_count as usize {
            return Err(RoomError::RoomFull);
        }
        if self.players.contains_key(&player_id) {
            return Err(RoomError::AlreadyJoined);
        }

        self.players.insert(player_id, RoomPlayer {
            player_id,
            connection_state: ConnectionState::Connected,
            validator: InputValidator::new(player_id, self.config.coord_min, self.config.coord_max, 20),
            rate_limiter: RateLimiter::new(self.config.rate_limit_per_sec),
            sender,
        });
        self.empty_since = None;

        Ok(())
    }

    /// Whether this room has had no members for longer than `grace`
    /// (§5: destroyed after 60s empty).
    pub fn empty_for(&self, grace: Duration) -> bool {
        self.empty_since.map(|since| since.elapsed() > grace).unwrap_or(false)
    }

    /// Whether the room has exactly `config.player_count` players and
    /// can start.
    pub fn is_ready_to_start(&self) -> bool {
        self.state == RoomState::Lobby && self.players.len() == self.config.player_count as usize
    }

    /// Transition from `Lobby` to `Playing`, spawning each player's
    /// entity.
    pub fn start(&mut self) -> Result<(), RoomError> {
        if !self.is_ready_to_start() {
            return Err(RoomError::MatchInProgress);
        }
        self.spawn_entities();
        self.state = RoomState::Playing;
        Ok(())
    }

    /// Deterministic spawn layout: one entity per player, in roster
    /// (ascending player id) order, positioned from the room's seeded
    /// PRNG so every conforming client reconstructs the same initial
    /// state from `seed` alone (§9 Open Question 3).
    fn spawn_entities(&mut self) {
        use crate::core::fixed::{from_int, to_fixed};
        use crate::sim::entity::Entity;

        const SPAWN_HP: i32 = 100;
        const ENTITY_EXTENT: f64 = 1.0;
        const SPAWN_SPAN: u32 = 19;

        let player_ids: Vec<u16> = self.players.keys().copied().collect();
        for (index, player_id) in player_ids.into_iter().enumerate() {
            let entity_id = index as i32;
            let offset = self.game_state.rng.range(0, SPAWN_SPAN) as i32 - (SPAWN_SPAN as i32 / 2);
            let entity = Entity::new(
                entity_id,
                from_int(offset),
                from_int(0),
                to_fixed(ENTITY_EXTENT),
                to_fixed(ENTITY_EXTENT),
                SPAWN_HP,
            );
            self.game_state.add_entity(entity);
            self.game_state.bind_player(player_id, entity_id);
        }
    }

    /// Mark a player disconnected without removing their room slot, so
    /// they can reconnect within the configured window.
    pub fn mark_disconnected(&mut self, player_id: u16) -> Result<(), RoomError> {
        let frame_id = self.engine.current_frame();
        let player = self.players.get_mut(&player_id).ok_or(RoomError::PlayerNotFound)?;
        player.connection_state = ConnectionState::Disconnected { since_frame: frame_id };
        Ok(())
    }

    /// Reconnect a previously disconnected player with a fresh sender.
    /// Fails if the reconnect window has already elapsed.
    pub fn reconnect_player(&mut self, player_id: u16, sender: mpsc::Sender<Outbound>) -> Result<(), RoomError> {
        let current_frame = self.engine.current_frame();
        let timeout = self.config.reconnect_timeout_frames;
        let player = self.players.get_mut(&player_id).ok_or(RoomError::PlayerNotFound)?;

        if let ConnectionState::Disconnected { since_frame } = player.connection_state {
            if current_frame.saturating_sub(since_frame) > timeout {
                return Err(RoomError::ReconnectExpired);
            }
        }

        player.connection_state = ConnectionState::Connected;
        player.sender = sender;
        Ok(())
    }

    /// Players whose reconnect window has expired; the caller should
    /// remove them and broadcast `player_left`.
    pub fn check_reconnect_timeouts(&self) -> Vec<u16> {
        let current_frame = self.engine.current_frame();
        let timeout = self.config.reconnect_timeout_frames;
        self.players
            .values()
            .filter_map(|p| match p.connection_state {
                ConnectionState::Disconnected { since_frame }
                    if current_frame.saturating_sub(since_frame) > timeout =>
                {
                    Some(p.player_id)
                }
                _ => None,
            })
            .collect()
    }

    /// Remove a player entirely (voluntary leave, or post-timeout
    /// eviction). Marks the room's emptiness onset once the last
    /// player is gone (§3, §5).
    pub fn remove_player(&mut self, player_id: u16) -> Option<RoomPlayer> {
        let removed = self.players.remove(&player_id);
        if self.players.is_empty() {
            self.empty_since.get_or_insert_with(Instant::now);
        }
        removed
    }

    /// Validate and buffer one player's input for the frame engine,
    /// enforcing the connection's rate limit and the input validator
    /// in sequence. A malformed record or a failed validation both
    /// count as an [`RoomError::InvalidInput`]; once the player's
    /// violation count crosses its limit this escalates to
    /// [`RoomError::PolicyViolation`] so the caller closes the
    /// connection (§4.5).
    pub fn submit_input(&mut self, player_id: u16, data: [u8; crate::sim::input::INPUT_WIRE_SIZE]) -> Result<(), RoomError> {
        let current_frame = self.engine.current_frame();
        let player = self.players.get_mut(&player_id).ok_or(RoomError::PlayerNotFound)?;

        if !player.rate_limiter.check() {
            return Err(RoomError::RateLimited);
        }

        let Some(record) = crate::sim::input::InputRecord::from_bytes(&data) else {
            return Err(RoomError::InvalidInput);
        };
        if player.validator.validate(&record, current_frame).is_err() {
            return Err(if player.validator.should_disconnect() {
                RoomError::PolicyViolation
            } else {
                RoomError::InvalidInput
            });
        }

        self.engine.add_input(record.frame_id, player_id, data);
        Ok(())
    }

    /// Connected (not disconnected) player ids, ascending.
    pub fn connected_player_ids(&self) -> Vec<u16> {
        self.players.values().filter(|p| p.is_connected()).map(|p| p.player_id).collect()
    }

    /// All player ids currently holding a room slot, ascending.
    pub fn player_ids(&self) -> Vec<u16> {
        self.players.keys().copied().collect()
    }

    /// Broadcast one message to every connected player's channel.
    pub async fn broadcast(&self, message: ServerMessage) {
        for player in self.players.values() {
            if player.is_connected() {
                let _ = player.sender.send(Outbound::Message(message.clone())).await;
            }
        }
    }

    /// Close one player's connection with a close code, regardless of
    /// connection state.
    pub async fn close_player(&self, player_id: u16, code: u16, reason: impl Into<String>) {
        if let Some(player) = self.players.get(&player_id) {
            let _ = player.sender.send(Outbound::Close { code, reason: reason.into() }).await;
        }
    }
}

/// Owns the table of active rooms.
pub struct RoomManager {
    rooms: RwLock<BTreeMap<RoomId, Arc<RwLock<Room>>>>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self { rooms: RwLock::new(BTreeMap::new()) }
    }

    /// Get an existing room, or create it in `Lobby` state.
    pub async fn get_or_create(&self, id: &str, config: RoomConfig, start_time_millis: u64) -> Arc<RwLock<Room>> {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(Room::new(id.to_string(), config, start_time_millis))))
            .clone()
    }

    pub async fn get(&self, id: &str) -> Option<Arc<RwLock<Room>>> {
        self.rooms.read().await.get(id).cloned()
    }

    /// Snapshot of every current room id, for callers (e.g. the tick
    /// loop) that must not hold the manager lock while they work.
    pub async fn rooms_snapshot(&self) -> Vec<RoomId> {
        self.rooms.read().await.keys().cloned().collect()
    }

    pub async fn remove(&self, id: &str) {
        self.rooms.write().await.remove(id);
    }

    /// Drop every room in `Closed` state, or that has had no members
    /// for more than `empty_grace` (§5).
    pub async fn cleanup(&self, empty_grace: Duration) {
        let mut rooms = self.rooms.write().await;
        let mut to_remove = Vec::new();
        for (id, room) in rooms.iter() {
            let room = room.read().await;
            if room.state == RoomState::Closed || room.empty_for(empty_grace) {
                to_remove.push(id.clone());
            }
        }
        for id in to_remove {
            rooms.remove(&id);
        }
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}
