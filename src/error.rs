//! Crate-Wide Error Taxonomy
//!
//! One flat enum covering every failure mode named in the error
//! handling design, unifying what the teacher splits across
//! `GameServerError`/`SessionError`/`AuthError` into a single type
//! since this system specifies one error taxonomy rather than one
//! enum per subsystem.

use thiserror::Error;

use crate::core::fixed::ArithmeticError;
use crate::network::auth::AuthError;
use crate::network::room::RoomError;

/// Top-level coordinator error.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Failed to bind the listening socket.
    #[error("failed to bind: {0}")]
    BindFailed(#[source] std::io::Error),

    /// A WebSocket envelope could not be parsed.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// An inbound message exceeded the configured size limit.
    #[error("oversized message")]
    OversizedMessage,

    /// A connection exceeded its request rate limit.
    #[error("rate limited")]
    RateLimited,

    /// An input record failed validation (§4.6).
    #[error("invalid input")]
    InvalidInput,

    /// A room has no open slot for a new player.
    #[error("room full")]
    RoomFull,

    /// A connection did not authenticate within the allotted window.
    #[error("authentication timed out")]
    AuthTimeout,

    /// A frame could not be committed within the allotted window and
    /// had to be forced.
    #[error("frame timed out")]
    FrameTimeout,

    /// A reconnecting client's requested frame has aged out of
    /// retained history.
    #[error("requested frame is no longer retained")]
    SnapshotMiss,

    /// The underlying transport closed unexpectedly.
    #[error("transport broken: {0}")]
    TransportBroken(String),

    /// Two copies of the simulation produced different state hashes
    /// for the same frame.
    #[error("desync detected at frame {0}")]
    DesyncDetected(u32),

    /// Wraps a room-admission error.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// Wraps a token-validation error.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Wraps a fixed-point arithmetic error.
    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_error_converts_via_from() {
        let err: CoordinatorError = RoomError::RoomFull.into();
        assert!(matches!(err, CoordinatorError::Room(RoomError::RoomFull)));
    }

    #[test]
    fn test_arithmetic_error_converts_via_from() {
        let err: CoordinatorError = ArithmeticError::DivisionByZero.into();
        assert!(matches!(err, CoordinatorError::Arithmetic(_)));
    }

    #[test]
    fn test_display_messages_are_non_empty() {
        assert!(!CoordinatorError::RoomFull.to_string().is_empty());
        assert!(!CoordinatorError::DesyncDetected(7).to_string().is_empty());
    }
}
