//! Error types and wire-status mapping.
//!
//! Filament defines one error enum for the whole crate. Cache validation
//! failures, protocol framing errors, and connection-level failures all
//! surface as [`FilamentError`]; the mapping to wire statuses happens at
//! the node boundary via [`FilamentError::wire_status`].

use crate::proto::Status;
use thiserror::Error;

/// Common Filament error conditions.
#[derive(Debug, Error)]
pub enum FilamentError {
    /// A cache operation was given an empty key.
    #[error("key is empty")]
    KeyEmpty,

    /// A SET was given an empty value.
    #[error("value is empty")]
    ValueEmpty,

    /// A SET was given a zero or negative TTL.
    #[error("ttl must be positive, got {ttl_seconds}s")]
    InvalidTtl { ttl_seconds: i64 },

    /// Key not found.
    #[error("key not found")]
    KeyNotFound,

    /// A mutating command was sent to a node that does not own writes.
    #[error("not the leader")]
    NotLeader,

    /// A frame on the wire could not be decoded. The connection that
    /// produced it must be closed; its stream position is untrustworthy.
    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: String },

    /// The peer closed the connection mid-frame.
    #[error("connection closed mid-frame")]
    ConnectionClosed,

    /// A follower lost its upstream leader connection. Terminal for the
    /// follower process.
    #[error("lost connection to leader {addr}")]
    LeaderConnectionLost { addr: String },

    /// The server reported a generic error status.
    #[error("server reported an error")]
    ServerError,

    /// The server returned a status the client did not expect for the
    /// command it sent.
    #[error("unexpected response status {status}")]
    UnexpectedStatus { status: Status },

    /// Invalid configuration.
    #[error("invalid config: {message}")]
    Config { message: String },

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FilamentError {
    /// Create an InvalidFrame error.
    pub fn invalid_frame(reason: impl Into<String>) -> Self {
        Self::InvalidFrame {
            reason: reason.into(),
        }
    }

    /// Create a Config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Map this error to the wire status a handler should respond with.
    ///
    /// Validation failures surface as [`Status::Error`]; misses as
    /// [`Status::KeyNotFound`]; role violations as [`Status::NotLeader`].
    pub fn wire_status(&self) -> Status {
        match self {
            Self::KeyNotFound => Status::KeyNotFound,
            Self::NotLeader => Status::NotLeader,
            _ => Status::Error,
        }
    }

    /// Whether this error ends the connection it occurred on.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidFrame { .. } | Self::ConnectionClosed | Self::Io(_)
        )
    }
}

/// Result type using FilamentError.
pub type FilamentResult<T> = Result<T, FilamentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_status_mapping() {
        assert_eq!(
            FilamentError::KeyNotFound.wire_status(),
            Status::KeyNotFound
        );
        assert_eq!(FilamentError::NotLeader.wire_status(), Status::NotLeader);
        assert_eq!(FilamentError::KeyEmpty.wire_status(), Status::Error);
        assert_eq!(FilamentError::ValueEmpty.wire_status(), Status::Error);
        assert_eq!(
            FilamentError::InvalidTtl { ttl_seconds: 0 }.wire_status(),
            Status::Error
        );
    }

    #[test]
    fn connection_fatal() {
        assert!(FilamentError::invalid_frame("bad tag").is_connection_fatal());
        assert!(FilamentError::ConnectionClosed.is_connection_fatal());
        assert!(!FilamentError::KeyNotFound.is_connection_fatal());
        assert!(!FilamentError::NotLeader.is_connection_fatal());
    }

    #[test]
    fn error_display() {
        let err = FilamentError::InvalidTtl { ttl_seconds: -5 };
        assert_eq!(err.to_string(), "ttl must be positive, got -5s");

        let err = FilamentError::LeaderConnectionLost {
            addr: "10.0.0.1:7600".to_string(),
        };
        assert_eq!(err.to_string(), "lost connection to leader 10.0.0.1:7600");
    }
}
