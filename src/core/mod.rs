//! Core deterministic primitives.
//!
//! Every type in this module is designed for perfect cross-platform
//! determinism: fixed-point arithmetic instead of floats, a specified
//! PRNG recurrence, and a canonical hash builder for desync detection.

pub mod fixed;
pub mod vec2;
pub mod rng;
pub mod hash;

// Re-export core types
pub use fixed::{Fixed, FIXED_ONE, FIXED_HALF, FIXED_SCALE, ArithmeticError};
pub use vec2::FixedVec2;
pub use rng::DeterministicRng;
pub use hash::StateHasher;
