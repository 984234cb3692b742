//! Simulation Module
//!
//! The deterministic game substrate. 100% reproducible given the same
//! seed and input trace.
//!
//! ## Module Structure
//!
//! - `entity`: Physics bodies and input flag bits
//! - `physics`: Per-tick integration and spatial-hash collision
//! - `input`: Input wire format and validation
//! - `frame`: Committed tick records
//! - `state`: Authoritative game state, snapshot/rollback
//! - `engine`: Input buffering and all-or-nothing frame commit

pub mod entity;
pub mod physics;
pub mod input;
pub mod frame;
pub mod state;
pub mod engine;

pub use entity::Entity;
pub use physics::PhysicsConfig;
pub use input::{InputRecord, InputValidator, InputViolation, INPUT_WIRE_SIZE, MAX_FRAME_AHEAD};
pub use frame::Frame;
pub use state::{GameState, Snapshot};
pub use engine::{FrameEngine, MAX_FRAME_HISTORY, derive_room_seed};
