//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket. Every
//! message is serialized as JSON (no binary codec variant — the
//! fixed-layout input record carried inside [`ClientMessage::Input`]
//! is itself already a specified byte layout, hex-encoded for JSON
//! transport by [`crate::network::codec`]).

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use crate::network::codec::HexBytes;
use crate::sim::entity::Entity;
use crate::sim::input::INPUT_WIRE_SIZE;
use crate::sim::state::GameState;

/// WebSocket close codes (§6/§7). Also used as the `error` message's
/// `code` field when the connection is about to be closed for the same
/// reason.
pub mod close_codes {
    /// Auth message rejected (bad or expired token).
    pub const AUTH_FAILED: u16 = 4001;
    /// No `auth` message arrived within the admission deadline.
    pub const AUTH_TIMEOUT: u16 = 4002;
    /// Connection sustained a rate-limit breach.
    pub const RATE_LIMITED: u16 = 4003;
    /// Room was already at capacity.
    pub const ROOM_FULL: u16 = 4004;
    /// Input validator's violation count crossed its limit.
    pub const POLICY_VIOLATION: u16 = 4005;
}

/// `error.code` values for conditions that are reported to the client
/// but don't imply closing the connection. Distinct from
/// [`close_codes`], which doubles as both a close code and an error
/// code for the conditions that do.
pub mod info_codes {
    pub const ALREADY_JOINED: i32 = 4100;
    pub const MATCH_IN_PROGRESS: i32 = 4101;
    pub const MATCH_NOT_IN_PROGRESS: i32 = 4102;
    pub const PLAYER_NOT_FOUND: i32 = 4103;
    pub const RECONNECT_EXPIRED: i32 = 4104;
    pub const OVERSIZED_MESSAGE: i32 = 4105;
    pub const MALFORMED_ENVELOPE: i32 = 4106;
    pub const ROOM_NOT_FOUND: i32 = 4107;
    pub const NOT_IN_ROOM: i32 = 4108;
    pub const INVALID_INPUT: i32 = 4109;
    pub const SERVER_SHUTDOWN: i32 = 4110;
    /// Room/input operation attempted before `auth` succeeded.
    pub const NOT_AUTHENTICATED: i32 = 4111;
}

/// Messages sent from client to server (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate the connection before any room operation.
    Auth { token: String },

    /// Join (or create) a named room.
    Join { room_id: String, player_id: u16 },

    /// Resume a room after a dropped connection.
    Reconnect { room_id: String, player_id: u16, last_frame_id: u32 },

    /// One player's input record for a frame, hex-encoded.
    Input { record: HexBytes },

    /// Leave the room voluntarily.
    Leave,
}

/// Messages sent from server to client (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication/join accepted; echoes back the assigned identity.
    JoinSuccess { player_id: u16, room_id: String },

    /// Another player joined the room.
    PlayerJoined { player_id: u16 },

    /// A player left or was dropped after the reconnect window expired.
    PlayerLeft { player_id: u16 },

    /// The room has enough players and the simulation is starting.
    /// The client constructs its own initial state from `seed`; no
    /// snapshot is sent (§9 Open Question 3).
    GameStart { seed: u32, player_count: u16, tick_rate: u32 },

    /// One committed frame, broadcast to every player in the room.
    GameFrame {
        frame_id: u32,
        confirmed: bool,
        inputs: Vec<(u16, HexBytes)>,
    },

    /// Frames committed since a reconnecting client's `last_frame_id`
    /// (§4.9 catch-up), when still within retained history.
    SyncFrames { frames: Vec<(u32, bool, Vec<(u16, HexBytes)>)> },

    /// A reconnecting client's requested frame has aged out of
    /// history; carries a full state snapshot the client restores from
    /// instead of replaying frames (§4.9).
    ResyncFull { frame_id: u32, state_hash: String, snapshot: StateSnapshot },

    /// The request could not be satisfied; see §7 for error kinds.
    /// `code` is one of [`close_codes`] or [`info_codes`].
    Error { code: i32, message: String },
}

/// A point-in-time copy of [`GameState`], serialized into a
/// `resync_full` message so a reconnecting client can rebuild its
/// simulation without replaying frame history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub frame_id: u32,
    pub entities: BTreeMap<i32, Entity>,
    pub player_binding: BTreeMap<u16, i32>,
    pub rng_state: u32,
}

impl StateSnapshot {
    /// Capture a snapshot of a room's authoritative state.
    pub fn from_state(state: &GameState) -> Self {
        Self {
            frame_id: state.frame_id,
            entities: state.entities.clone(),
            player_binding: state.player_binding.clone(),
            rng_state: state.rng.state(),
        }
    }

    /// Overwrite `state` with this snapshot's contents.
    pub fn restore_into(&self, state: &mut GameState) {
        state.frame_id = self.frame_id;
        state.entities = self.entities.clone();
        state.player_binding = self.player_binding.clone();
        state.rng.set_state(self.rng_state);
    }
}

/// One item placed on a connection's outbound channel: either a
/// message to serialize and send, or an instruction to close the
/// socket with a specific close code.
#[derive(Debug, Clone)]
pub enum Outbound {
    Message(ServerMessage),
    Close { code: u16, reason: String },
}

impl Outbound {
    /// Shorthand for the common case of enqueuing a message.
    pub fn msg(message: ServerMessage) -> Self {
        Self::Message(message)
    }
}

impl ClientMessage {
    /// Serialize for WebSocket text frames.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a WebSocket text frame.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize for WebSocket text frames.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a WebSocket text frame.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Build a [`ServerMessage::GameFrame`] from a committed
    /// [`crate::sim::frame::Frame`].
    pub fn from_frame(frame: &crate::sim::frame::Frame) -> Self {
        Self::GameFrame {
            frame_id: frame.frame_id,
            confirmed: frame.confirmed,
            inputs: frame
                .inputs
                .iter()
                .map(|(player_id, bytes)| (*player_id, HexBytes(bytes.to_vec())))
                .collect(),
        }
    }
}

/// Decode a hex-encoded input record back to its fixed 16-byte layout.
/// Returns `None` if the decoded length doesn't match
/// [`INPUT_WIRE_SIZE`].
pub fn decode_input_bytes(hex: &HexBytes) -> Option<[u8; INPUT_WIRE_SIZE]> {
    if hex.0.len() != INPUT_WIRE_SIZE {
        return None;
    }
    let mut buf = [0u8; INPUT_WIRE_SIZE];
    buf.copy_from_slice(&hex.0);
    Some(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::entity::input_flags;
    use crate::sim::input::InputRecord;

    #[test]
    fn test_client_message_roundtrip_json() {
        let msg = ClientMessage::Join { room_id: "arena-1".into(), player_id: 3 };
        let json = msg.to_json().unwrap();
        let decoded = ClientMessage::from_json(&json).unwrap();
        match decoded {
            ClientMessage::Join { room_id, player_id } => {
                assert_eq!(room_id, "arena-1");
                assert_eq!(player_id, 3);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_server_message_tag_is_snake_case() {
        let msg = ServerMessage::PlayerJoined { player_id: 1 };
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"player_joined\""));
    }

    #[test]
    fn test_input_record_roundtrips_through_hex_envelope() {
        let record = InputRecord {
            frame_id: 7,
            player_id: 2,
            flags: input_flags::SKILL_1,
            target_x: 10,
            target_y: -10,
        };
        let hex = HexBytes(record.to_bytes().to_vec());
        let json = serde_json::to_string(&hex).unwrap();
        let back: HexBytes = serde_json::from_str(&json).unwrap();
        let decoded_bytes = decode_input_bytes(&back).unwrap();
        assert_eq!(InputRecord::from_bytes(&decoded_bytes).unwrap(), record);
    }

    #[test]
    fn test_game_frame_from_frame_preserves_confirmed_flag() {
        let mut inputs = std::collections::BTreeMap::new();
        inputs.insert(1u16, [0u8; INPUT_WIRE_SIZE]);
        let frame = crate::sim::frame::Frame::forced(5, inputs, 1234);
        let msg = ServerMessage::from_frame(&frame);
        match msg {
            ServerMessage::GameFrame { confirmed, frame_id, .. } => {
                assert!(!confirmed);
                assert_eq!(frame_id, 5);
            }
            _ => panic!("wrong variant"),
        }
    }
}
