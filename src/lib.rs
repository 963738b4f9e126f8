//! Filament - TTL key-value cache with single-leader replication.
//!
//! Filament is a single-binary, network-accessible key-value cache.
//! Clients speak a little-endian binary frame protocol over TCP; every
//! entry carries a time-to-live. A node runs either as the leader,
//! which owns all writes and fans them out to attached followers, or as
//! a follower, which joins a leader, serves reads from its replicated
//! cache, and refuses direct writes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            Clients                              │
//! │          binary frames: SET / GET / DELETE ↔ status             │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                              Node                               │
//! │   accept loop │ per-connection parse │ dispatch │ propagation   │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                             Cache                               │
//! │        RwLock map │ generation stamps │ expiry reaper           │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//!                     leader ──► follower fan-out
//!                 (JOIN registry, best-effort frames)
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::error`] - Error types and wire-status mapping
//!
//! ## Protocol
//! - [`proto`] - Command/status/response types and frame layout
//! - [`proto::codec`] - Encoders and the streaming decoder
//!
//! ## Storage
//! - [`cache`] - The `Cache` trait and the in-memory implementation
//!
//! ## Networking
//! - [`node`] - Listener, connections, dispatch, replication
//! - [`client`] - Async client for the wire protocol
//!
//! ## CLI
//! - [`cli::commands`] - CLI command implementations
//!
//! # Key Invariants
//!
//! - A leader has no upstream connection; a follower has exactly one,
//!   and losing it is terminal for the process.
//! - Only the leader owns a follower registry.
//! - A replacement SET can never be deleted by the expiry scheduled for
//!   the entry it replaced.
//! - Writes to a single connection never interleave at the byte level;
//!   responses pair with requests in order.

// Core infrastructure
pub mod core;

// Wire protocol
pub mod proto;

// Keyed TTL storage
pub mod cache;

// The networked actor
pub mod node;

// Client wrapper
pub mod client;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, error};
pub use self::core::error::{FilamentError, FilamentResult};
pub use self::cache::{Cache, MemoryCache};
pub use self::client::Client;
pub use self::node::Node;
