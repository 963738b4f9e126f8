//! Wire protocol types and framing.
//!
//! Every command and response is a self-delimited binary frame,
//! little-endian throughout. Commands may be pipelined back-to-back on a
//! single connection; each command is answered by exactly one response
//! frame on the same stream, in order.
//!
//! # Command Frame
//!
//! ```text
//! ┌──────┬─────────────────────────────────────────────────────────┐
//! │ u8   │ command tag                                             │
//! ├──────┼─────────────────────────────────────────────────────────┤
//! │ SET  │ keyLen:i32, key, valLen:i32, val, ttlSeconds:i32        │
//! │ GET  │ keyLen:i32, key                                         │
//! │ DEL  │ keyLen:i32, key                                         │
//! │ JOIN │ (no payload)                                            │
//! └──────┴─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Response Frame
//!
//! ```text
//! ┌──────┬─────────────────────────────────────────────────────────┐
//! │ u8   │ status tag                                              │
//! ├──────┼─────────────────────────────────────────────────────────┤
//! │ SET  │ (status only)                                           │
//! │ GET  │ valLen:i32, val  (len 0 and empty on non-OK)            │
//! │ DEL  │ (status only)                                           │
//! └──────┴─────────────────────────────────────────────────────────┘
//! ```
//!
//! Length prefixes are i32 interpreted as unsigned in [0, 2^31); a
//! negative length is an invalid frame and the connection carrying it
//! must be closed.

pub mod codec;

use bytes::Bytes;

/// Command tag values on the wire.
pub const TAG_NONE: u8 = 0;
pub const TAG_SET: u8 = 1;
pub const TAG_GET: u8 = 2;
pub const TAG_DELETE: u8 = 3;
pub const TAG_JOIN: u8 = 4;

/// A parsed command frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Store a value under a key with a time-to-live in seconds.
    Set {
        key: Bytes,
        value: Bytes,
        ttl_seconds: i32,
    },
    /// Read the value under a key.
    Get { key: Bytes },
    /// Remove the entry under a key.
    Delete { key: Bytes },
    /// Register the sending connection as a replication follower.
    Join,
}

impl Command {
    /// The wire tag for this command.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Set { .. } => TAG_SET,
            Self::Get { .. } => TAG_GET,
            Self::Delete { .. } => TAG_DELETE,
            Self::Join => TAG_JOIN,
        }
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Set { .. } => "SET",
            Self::Get { .. } => "GET",
            Self::Delete { .. } => "DELETE",
            Self::Join => "JOIN",
        }
    }

    /// Whether this command mutates cache state and is subject to
    /// write-locality and propagation.
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::Set { .. } | Self::Delete { .. })
    }
}

/// Response status tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    None = 0,
    Ok = 1,
    Error = 2,
    KeyNotFound = 3,
    NotLeader = 4,
}

impl Status {
    /// Decode a status from its wire tag.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::None),
            1 => Some(Self::Ok),
            2 => Some(Self::Error),
            3 => Some(Self::KeyNotFound),
            4 => Some(Self::NotLeader),
            _ => None,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "NONE",
            Self::Ok => "OK",
            Self::Error => "ERROR",
            Self::KeyNotFound => "KEY_NOT_FOUND",
            Self::NotLeader => "NOT_LEADER",
        };
        write!(f, "{}", s)
    }
}

/// Response to a GET: status plus the value bytes. On non-OK statuses the
/// value is always empty (the frame still carries a zero length so the
/// stream stays aligned).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetResponse {
    pub status: Status,
    pub value: Bytes,
}

impl GetResponse {
    /// An OK response carrying a value.
    pub fn ok(value: Bytes) -> Self {
        Self {
            status: Status::Ok,
            value,
        }
    }

    /// A non-OK response with an empty value.
    pub fn status(status: Status) -> Self {
        Self {
            status,
            value: Bytes::new(),
        }
    }
}

/// Result of decoding a frame from a stream buffer.
#[derive(Debug)]
pub enum DecodeResult<T> {
    /// A complete frame was decoded and consumed from the buffer.
    Complete(T),
    /// The buffer ends before a frame boundary; read more bytes.
    Incomplete,
    /// The bytes are not a valid frame. The stream position is no longer
    /// trustworthy and the connection must be closed.
    Invalid(String),
}
