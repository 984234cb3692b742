//! Deterministic Random Number Generator
//!
//! A single 32-bit linear congruential generator. Every conforming
//! implementation of this wire protocol must reproduce the exact same
//! sequence from the same seed, so the recurrence itself is part of
//! the contract, not an implementation detail: `state = state *
//! 1664525 + 1013904223 (mod 2^32)` — Numerical Recipes' constants.

use serde::{Serialize, Deserialize};

/// Deterministic PRNG state: a single 32-bit word.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: u32,
}

impl DeterministicRng {
    const MULTIPLIER: u32 = 1664525;
    const INCREMENT: u32 = 1013904223;

    /// Create a generator from a 32-bit seed.
    #[inline]
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Advance the generator and return the new state.
    ///
    /// Note this returns the state *after* advancing, not before —
    /// `next_uint32()` never returns the seed itself.
    #[inline]
    pub fn next_uint32(&mut self) -> u32 {
        self.state = self.state
            .wrapping_mul(Self::MULTIPLIER)
            .wrapping_add(Self::INCREMENT);
        self.state
    }

    /// Draw a uniform double in `[0, 1]`.
    ///
    /// This is **not** guaranteed bit-identical across platforms (float
    /// division rounding can differ); callers that need deterministic
    /// gameplay randomness must use [`range`](Self::range) instead.
    #[inline]
    pub fn uniform(&mut self) -> f64 {
        self.next_uint32() as f64 / u32::MAX as f64
    }

    /// Draw an integer uniformly in `[a, b]` inclusive.
    #[inline]
    pub fn range(&mut self, a: u32, b: u32) -> u32 {
        let span = b - a + 1;
        a + (self.next_uint32() % span)
    }

    /// Fisher-Yates shuffle in place, descending index order, drawing
    /// the swap index from [`range`](Self::range).
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        if slice.len() < 2 {
            return;
        }
        for i in (1..slice.len()).rev() {
            let j = self.range(0, i as u32) as usize;
            slice.swap(i, j);
        }
    }

    /// Get the current raw state (for snapshot inclusion).
    #[inline]
    pub fn state(&self) -> u32 {
        self.state
    }

    /// Restore from a previously saved raw state.
    #[inline]
    pub fn set_state(&mut self, state: u32) {
        self.state = state;
    }
}
