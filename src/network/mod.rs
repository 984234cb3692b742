//! Network Layer
//!
//! WebSocket server for real-time multiplayer communication. This
//! layer is **non-deterministic** — all game logic runs through `sim::`.

pub mod auth;
pub mod codec;
pub mod protocol;
pub mod room;
pub mod server;

pub use auth::{AuthConfig, TokenClaims, AuthError, validate_token};
pub use codec::HexBytes;
pub use protocol::{ClientMessage, ServerMessage};
pub use room::{Room, RoomConfig, RoomError, RoomId, RoomManager, RoomState};
pub use server::{GameServer, ServerConfig};
