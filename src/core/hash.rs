//! Deterministic State Hashing
//!
//! Builds the canonical byte representation of simulation state used
//! for desync detection (§4.4): entities sorted by id, fields
//! serialized as decimal integer text in a fixed order, joined by a
//! separator byte that cannot appear in decimal text, digested with
//! MD5. Only deterministic-sim state may enter this hash — wall-clock
//! timestamps, render-only data, and transport state must never be fed
//! into a [`StateHasher`].

/// Separator byte between canonicalized fields. `0x1F` (ASCII unit
/// separator) never appears in decimal integer text.
const FIELD_SEPARATOR: u8 = 0x1F;

/// Incremental builder for the canonical byte form hashed into a
/// state digest.
#[derive(Debug, Default)]
pub struct StateHasher {
    buf: Vec<u8>,
}

impl StateHasher {
    /// Start a new canonical byte buffer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Append a signed integer as decimal text, followed by the field
    /// separator.
    pub fn push_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(v.to_string().as_bytes());
        self.buf.push(FIELD_SEPARATOR);
    }

    /// Append a signed 32-bit integer as decimal text.
    pub fn push_i32(&mut self, v: i32) {
        self.push_i64(v as i64);
    }

    /// Append an unsigned 32-bit integer as decimal text.
    pub fn push_u32(&mut self, v: u32) {
        self.push_i64(v as i64);
    }

    /// Finalize and return the digest as a lowercase hex string.
    pub fn finalize(self) -> String {
        let digest = md5::compute(&self.buf);
        format!("{:x}", digest)
    }
}
