//! Per-connection parse loop and command dispatch.
//!
//! Each connection runs two tasks. The read loop below fills a stream
//! buffer and drains every complete frame out of it (commands may
//! arrive pipelined), handing each command to the connection's
//! dispatcher over an unbounded queue, so a slow handler never stalls
//! the parser. The dispatcher applies commands strictly in arrival
//! order: responses pair with requests on the wire, a pipelined GET
//! observes the SET before it, and replicated writes land in the order
//! the leader issued them.
//!
//! The write half sits behind an async mutex shared with the follower
//! forwarder (if the peer JOINs), so responses and propagated frames
//! never interleave at the byte level.

use super::{Node, Role};
use crate::proto::codec::{
    encode_delete_response, encode_get_response, encode_set_response,
};
use crate::proto::{codec, Command, DecodeResult, GetResponse, Status};
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};

const READ_BUFFER_CAPACITY: usize = 64 * 1024;

/// Where a connection came from, from this node's point of view.
///
/// A follower treats its dialed upstream-leader link as the replication
/// stream: mutations arriving there are applied, mutations arriving on
/// any accepted connection are refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOrigin {
    /// An accepted inbound connection: a client, or a follower-to-be.
    Client,
    /// The outbound connection a follower holds to its leader.
    UpstreamLeader,
}

/// Why a read loop ended.
enum CloseReason {
    /// Peer closed at a frame boundary.
    CleanEof,
    /// Peer closed mid-frame.
    Truncated,
    /// Undecodable bytes; the stream position is untrustworthy.
    InvalidFrame(String),
    /// Read failure.
    Io(std::io::Error),
    /// The node is shutting down; not a peer failure.
    ShutdownRequested,
}

/// Drive one connection from open to close.
pub(crate) async fn handle_connection(
    node: Arc<Node>,
    stream: TcpStream,
    peer: SocketAddr,
    conn_id: u64,
    origin: ConnectionOrigin,
    upstream_lost: Option<mpsc::Sender<()>>,
) {
    let (mut reader, write_half) = stream.into_split();
    let writer = Arc::new(Mutex::new(write_half));

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_dispatcher(
        node.clone(),
        writer.clone(),
        peer,
        conn_id,
        origin,
        cmd_rx,
    ));

    let mut shutdown_rx = node.shutdown_signal();
    let mut buffer = BytesMut::with_capacity(READ_BUFFER_CAPACITY);
    let close_reason = 'read: loop {
        let read = tokio::select! {
            read = reader.read_buf(&mut buffer) => read,
            _ = shutdown_rx.changed() => break CloseReason::ShutdownRequested,
        };

        match read {
            Ok(0) => {
                break if buffer.is_empty() {
                    CloseReason::CleanEof
                } else {
                    CloseReason::Truncated
                };
            }
            Ok(_) => loop {
                match codec::decode_command(&mut buffer) {
                    DecodeResult::Complete(cmd) => {
                        node.metrics().command_dispatched();
                        tracing::debug!(
                            peer = %peer,
                            conn = conn_id,
                            command = cmd.name(),
                            "dispatching command"
                        );
                        let _ = cmd_tx.send(cmd);
                    }
                    DecodeResult::Incomplete => break,
                    DecodeResult::Invalid(reason) => {
                        break 'read CloseReason::InvalidFrame(reason)
                    }
                }
            },
            Err(e) => break CloseReason::Io(e),
        }
    };

    match &close_reason {
        CloseReason::CleanEof => {
            tracing::debug!(peer = %peer, conn = conn_id, "peer closed connection")
        }
        CloseReason::Truncated => {
            tracing::warn!(peer = %peer, conn = conn_id, "connection closed mid-frame")
        }
        CloseReason::InvalidFrame(reason) => {
            tracing::warn!(
                peer = %peer,
                conn = conn_id,
                reason = %reason,
                "invalid frame; closing connection"
            )
        }
        CloseReason::Io(e) => {
            tracing::warn!(peer = %peer, conn = conn_id, error = %e, "read failed")
        }
        CloseReason::ShutdownRequested => {
            tracing::debug!(peer = %peer, conn = conn_id, "closing connection for shutdown")
        }
    }

    if let Role::Leader(state) = node.role() {
        if state.deregister(conn_id) {
            tracing::info!(follower = %peer, conn = conn_id, "follower detached");
        }
    }

    node.metrics().connection_closed();
    tracing::info!(peer = %peer, conn = conn_id, "closed connection");

    // Losing the upstream link is terminal for a follower, but a close
    // the node itself asked for is not a loss.
    if !matches!(close_reason, CloseReason::ShutdownRequested) {
        if let Some(tx) = upstream_lost {
            let _ = tx.send(()).await;
        }
    }
}

/// Apply this connection's commands in arrival order. Exits when the
/// parser closes the queue or a response write fails.
async fn run_dispatcher(
    node: Arc<Node>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    peer: SocketAddr,
    conn_id: u64,
    origin: ConnectionOrigin,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    while let Some(cmd) = commands.recv().await {
        let (response, fanout) = execute(&node, &writer, peer, conn_id, origin, cmd);

        if let Some(frame) = response {
            let mut writer = writer.lock().await;
            if let Err(e) = writer.write_all(&frame).await {
                tracing::error!(peer = %peer, conn = conn_id, error = %e, "failed to write response");
                return;
            }
        }

        // Fan-out happens after the response is on its way; the client
        // is never blocked on replication.
        if let Some(cmd) = fanout {
            node.propagate(cmd);
        }
    }
}

/// Apply one command. Returns the response frame owed to the peer (if
/// any) and the mutation to fan out to followers (if it took effect on
/// the leader).
fn execute(
    node: &Node,
    writer: &Arc<Mutex<OwnedWriteHalf>>,
    peer: SocketAddr,
    conn_id: u64,
    origin: ConnectionOrigin,
    cmd: Command,
) -> (Option<Bytes>, Option<Command>) {
    match cmd {
        Command::Get { key } => (Some(handle_get(node, peer, &key)), None),

        Command::Set {
            key,
            value,
            ttl_seconds,
        } => {
            if !node.may_mutate(origin) {
                tracing::warn!(peer = %peer, "refusing SET from non-leader peer");
                return (Some(encode_set_response(Status::NotLeader)), None);
            }

            let (status, applied) = apply_set(node, peer, &key, &value, ttl_seconds);

            // Replicated writes get no response frame: the leader never
            // reads from the link.
            let response =
                (origin == ConnectionOrigin::Client).then(|| encode_set_response(status));
            let fanout = applied.then(|| Command::Set {
                key,
                value,
                ttl_seconds,
            });
            (response, fanout)
        }

        Command::Delete { key } => {
            if !node.may_mutate(origin) {
                tracing::warn!(peer = %peer, "refusing DELETE from non-leader peer");
                return (Some(encode_delete_response(Status::NotLeader)), None);
            }

            let (status, applied) = apply_delete(node, peer, &key);

            let response =
                (origin == ConnectionOrigin::Client).then(|| encode_delete_response(status));
            let fanout = applied.then(|| Command::Delete { key });
            (response, fanout)
        }

        Command::Join => {
            handle_join(node, writer.clone(), peer, conn_id);
            (None, None)
        }
    }
}

fn handle_get(node: &Node, peer: SocketAddr, key: &Bytes) -> Bytes {
    tracing::info!(
        peer = %peer,
        key = %String::from_utf8_lossy(key),
        "received GET"
    );

    let response = match node.cache().get(key) {
        Ok(value) => GetResponse::ok(value),
        Err(e) => {
            let status = e.wire_status();
            if status == Status::Error {
                tracing::error!(
                    key = %String::from_utf8_lossy(key),
                    error = %e,
                    "cache get failed"
                );
            }
            GetResponse::status(status)
        }
    };

    encode_get_response(&response)
}

/// Apply a SET locally. Returns the wire status and whether the write
/// took effect (and should therefore fan out on a leader).
fn apply_set(
    node: &Node,
    peer: SocketAddr,
    key: &Bytes,
    value: &Bytes,
    ttl_seconds: i32,
) -> (Status, bool) {
    tracing::info!(
        peer = %peer,
        key = %String::from_utf8_lossy(key),
        ttl_seconds,
        "received SET"
    );

    // The wire carries an i32; non-positive values reach the cache as a
    // zero duration and fail its TTL validation.
    let ttl = Duration::from_secs(ttl_seconds.max(0) as u64);

    match node.cache().set(key.clone(), value.clone(), ttl) {
        Ok(()) => (Status::Ok, true),
        Err(e) => {
            tracing::error!(
                key = %String::from_utf8_lossy(key),
                error = %e,
                "cache set failed"
            );
            (Status::Error, false)
        }
    }
}

/// Apply a DELETE locally. The cache is idempotent, but the wire
/// reports a miss: deleting an absent key answers KEY_NOT_FOUND, as
/// does any cache failure.
fn apply_delete(node: &Node, peer: SocketAddr, key: &Bytes) -> (Status, bool) {
    tracing::info!(
        peer = %peer,
        key = %String::from_utf8_lossy(key),
        "received DELETE"
    );

    match node.cache().delete(key) {
        Ok(true) => (Status::Ok, true),
        Ok(false) => (Status::KeyNotFound, true),
        Err(e) => {
            tracing::error!(
                key = %String::from_utf8_lossy(key),
                error = %e,
                "cache delete failed"
            );
            (Status::KeyNotFound, false)
        }
    }
}

/// Register the connection as a follower. No response frame is owed.
fn handle_join(
    node: &Node,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    peer: SocketAddr,
    conn_id: u64,
) {
    match node.role() {
        Role::Leader(state) => {
            let (frames_tx, frames_rx) = mpsc::unbounded_channel();
            tokio::spawn(super::replication::forward_frames(frames_rx, writer, peer));

            state.register(super::FollowerHandle::new(conn_id, peer, frames_tx));
            node.metrics().follower_joined();
            tracing::info!(follower = %peer, conn = conn_id, "follower joined the cluster");
        }
        Role::Follower(_) => {
            tracing::warn!(peer = %peer, "ignoring JOIN: this node is not the leader");
        }
    }
}
