//! # Lockstep Coordinator
//!
//! An authoritative coordinator for lockstep multiplayer: every
//! connected client submits input for a frame number, the server waits
//! for all players (or forces the tick after a timeout), and the
//! resulting frame is broadcast so every client's local simulation
//! advances from the same inputs.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    LOCKSTEP COORDINATOR                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── fixed.rs    - Q16.16 fixed-point arithmetic             │
//! │  ├── vec2.rs     - 2D vector with fixed-point                │
//! │  ├── rng.rs      - Deterministic LCG PRNG                    │
//! │  └── hash.rs     - State hashing for desync detection        │
//! │                                                              │
//! │  sim/            - Simulation (deterministic)                │
//! │  ├── entity.rs   - Physics bodies and input flags            │
//! │  ├── physics.rs  - Integration and broad-phase collision     │
//! │  ├── input.rs    - Input wire format and validation          │
//! │  ├── frame.rs    - Per-tick committed input records          │
//! │  ├── state.rs    - Authoritative state, snapshots, rollback  │
//! │  └── engine.rs   - Frame commit/force-tick scheduling         │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── server.rs   - WebSocket server and tick loop            │
//! │  ├── protocol.rs - Client/server message envelopes           │
//! │  ├── codec.rs    - Hex encoding for binary input payloads    │
//! │  ├── room.rs     - Per-room admission, reconnect, broadcast  │
//! │  └── auth.rs     - JWT validation                            │
//! │                                                              │
//! │  predictor.rs    - Client-side speculative execution         │
//! │  config.rs       - CLI configuration                         │
//! │  error.rs        - Crate-wide error taxonomy                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `sim/` modules are **100% deterministic**:
//! - No floating-point arithmetic in simulation logic
//! - No `HashMap` (uses `BTreeMap` for sorted iteration)
//! - No system time dependencies
//! - All randomness from a seeded linear congruential generator
//!
//! Given identical inputs and room seed, the simulation produces
//! **identical results** on any platform.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod predictor;
pub mod sim;

// Re-export commonly used types
pub use core::fixed::{Fixed, FIXED_ONE, FIXED_HALF, FIXED_SCALE};
pub use core::rng::DeterministicRng;
pub use core::vec2::FixedVec2;
pub use error::CoordinatorError;
pub use predictor::ClientPredictor;
pub use sim::engine::FrameEngine;
pub use sim::entity::Entity;
pub use sim::state::GameState;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default simulation tick rate (Hz).
pub const TICK_RATE: u32 = 30;
