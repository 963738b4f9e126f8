//! Follower registry and propagation plumbing.
//!
//! Each registered follower gets an unbounded frame channel drained by a
//! dedicated forwarder task, so propagated mutations reach a given
//! follower in the order the leader applied them, and socket writes
//! never happen under the registry lock. The registry itself is a plain
//! mutex-guarded map; fan-out iterates a snapshot taken under the lock.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;

/// The leader's view of one attached follower.
#[derive(Clone)]
pub struct FollowerHandle {
    conn_id: u64,
    peer: SocketAddr,
    frames: mpsc::UnboundedSender<Bytes>,
}

impl FollowerHandle {
    /// Create a handle around the follower's frame channel.
    pub fn new(conn_id: u64, peer: SocketAddr, frames: mpsc::UnboundedSender<Bytes>) -> Self {
        Self {
            conn_id,
            peer,
            frames,
        }
    }

    /// The connection this follower joined on.
    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    /// The follower's remote address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Enqueue a frame for this follower. Returns false once the
    /// follower's connection (and with it the forwarder) is gone.
    pub fn send(&self, frame: Bytes) -> bool {
        self.frames.send(frame).is_ok()
    }
}

/// Leader-side state: the registry of live followers.
///
/// Shared between the accept loop, per-connection close handlers, and
/// propagation; every touch goes through the mutex.
pub struct LeaderState {
    followers: Mutex<HashMap<u64, FollowerHandle>>,
}

impl LeaderState {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            followers: Mutex::new(HashMap::new()),
        }
    }

    /// Register a follower under its connection id. A re-JOIN on the
    /// same connection replaces the previous handle.
    pub fn register(&self, handle: FollowerHandle) {
        self.followers.lock().insert(handle.conn_id(), handle);
    }

    /// Remove the follower registered under `conn_id`, if any. Returns
    /// whether one was present.
    pub fn deregister(&self, conn_id: u64) -> bool {
        self.followers.lock().remove(&conn_id).is_some()
    }

    /// Current number of registered followers.
    pub fn follower_count(&self) -> usize {
        self.followers.lock().len()
    }

    /// Snapshot the current handles so fan-out can run without holding
    /// the lock across network writes.
    pub fn snapshot(&self) -> Vec<FollowerHandle> {
        self.followers.lock().values().cloned().collect()
    }
}

impl Default for LeaderState {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain a follower's frame channel onto its connection.
///
/// The write half is shared with the connection's response writer; the
/// mutex keeps frames from interleaving at the byte level. A write
/// failure ends forwarding for this follower: propagation is
/// best-effort and the registry entry is cleaned up when the connection
/// closes.
pub(crate) async fn forward_frames(
    mut frames: mpsc::UnboundedReceiver<Bytes>,
    writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
    peer: SocketAddr,
) {
    while let Some(frame) = frames.recv().await {
        let mut writer = writer.lock().await;
        if let Err(e) = writer.write_all(&frame).await {
            tracing::error!(follower = %peer, error = %e, "propagation write failed");
            return;
        }
    }
}
