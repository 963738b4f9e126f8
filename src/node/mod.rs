//! The networked actor: listener, connections, dispatch, replication.
//!
//! A node owns the listening socket and glues decoded commands to the
//! cache. Its role is fixed at construction: a leader accepts all writes
//! and fans them out to registered followers; a follower dials the
//! configured leader, joins its replication stream, serves local reads,
//! and refuses direct writes.
//!
//! The role is a sum type rather than a struct with optional fields:
//! only a leader carries a follower registry, and only a follower
//! carries an upstream address. Losing the upstream connection is
//! terminal for a follower: [`Node::serve`] returns
//! [`FilamentError::LeaderConnectionLost`] and the process is expected
//! to exit non-zero.

pub mod connection;
pub mod replication;

pub use self::replication::{FollowerHandle, LeaderState};

use self::connection::ConnectionOrigin;
use crate::cache::Cache;
use crate::core::config::NodeConfig;
use crate::core::error::{FilamentError, FilamentResult};
use crate::proto::codec::encode_command;
use crate::proto::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

/// Which side of the replication topology this node is on.
pub enum Role {
    /// Accepts all writes and owns the follower registry.
    Leader(LeaderState),
    /// Replicates from an upstream leader and serves local reads.
    Follower(FollowerState),
}

impl Role {
    fn from_config(config: &NodeConfig) -> Self {
        match config.upstream() {
            Some(addr) => Role::Follower(FollowerState {
                leader_addr: addr.to_string(),
            }),
            None => Role::Leader(LeaderState::new()),
        }
    }

    /// Whether this node owns writes.
    pub fn is_leader(&self) -> bool {
        matches!(self, Role::Leader(_))
    }

    /// Role name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Role::Leader(_) => "leader",
            Role::Follower(_) => "follower",
        }
    }
}

/// Follower-side state: the upstream to dial.
pub struct FollowerState {
    /// Address of the leader this node replicates from.
    pub leader_addr: String,
}

/// Per-node counters.
#[derive(Debug, Default)]
pub struct NodeMetrics {
    connections_accepted: AtomicU64,
    connections_closed: AtomicU64,
    commands_dispatched: AtomicU64,
    followers_joined: AtomicU64,
    propagation_failures: AtomicU64,
}

impl NodeMetrics {
    /// Record an accepted connection.
    pub fn connection_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a closed connection.
    pub fn connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dispatched command.
    pub fn command_dispatched(&self) {
        self.commands_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a follower registration.
    pub fn follower_joined(&self) {
        self.followers_joined.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed propagation write.
    pub fn propagation_failure(&self) {
        self.propagation_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Total connections accepted.
    pub fn connections_accepted_total(&self) -> u64 {
        self.connections_accepted.load(Ordering::Relaxed)
    }

    /// Connections currently open.
    pub fn connections_active(&self) -> u64 {
        self.connections_accepted_total()
            .saturating_sub(self.connections_closed.load(Ordering::Relaxed))
    }

    /// Total commands dispatched to handlers.
    pub fn commands_dispatched_total(&self) -> u64 {
        self.commands_dispatched.load(Ordering::Relaxed)
    }

    /// Total followers that ever joined.
    pub fn followers_joined_total(&self) -> u64 {
        self.followers_joined.load(Ordering::Relaxed)
    }

    /// Total propagation failures.
    pub fn propagation_failures_total(&self) -> u64 {
        self.propagation_failures.load(Ordering::Relaxed)
    }
}

/// A cache node serving the wire protocol over TCP.
pub struct Node {
    listen_addr: String,
    role: Role,
    cache: Arc<dyn Cache>,
    metrics: Arc<NodeMetrics>,
    next_conn_id: AtomicU64,
    shutdown_rx: watch::Receiver<bool>,
}

impl Node {
    /// Create a node from its configuration. The role is derived from
    /// the presence of a leader address.
    pub fn new(
        config: &NodeConfig,
        cache: Arc<dyn Cache>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            listen_addr: config.listen_addr.clone(),
            role: Role::from_config(config),
            cache,
            metrics: Arc::new(NodeMetrics::default()),
            next_conn_id: AtomicU64::new(1),
            shutdown_rx,
        }
    }

    /// This node's role.
    pub fn role(&self) -> &Role {
        &self.role
    }

    /// This node's counters.
    pub fn metrics(&self) -> &Arc<NodeMetrics> {
        &self.metrics
    }

    /// The cache this node serves.
    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    /// Bind the listening socket. Returned separately from [`serve`] so
    /// callers binding port 0 can learn the assigned address.
    pub async fn bind(&self) -> FilamentResult<TcpListener> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "listening");
        Ok(listener)
    }

    /// Bind and serve until shutdown or a terminal failure.
    pub async fn run(self: Arc<Self>) -> FilamentResult<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serve connections on an already-bound listener.
    ///
    /// A follower first dials its leader and sends JOIN on that
    /// connection; losing it later makes this return
    /// [`FilamentError::LeaderConnectionLost`].
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> FilamentResult<()> {
        let (upstream_lost_tx, mut upstream_lost_rx) = mpsc::channel::<()>(1);

        if let Role::Follower(state) = &self.role {
            let mut stream = TcpStream::connect(&state.leader_addr).await?;
            stream
                .write_all(&encode_command(&Command::Join))
                .await?;
            let peer = stream.peer_addr()?;
            tracing::info!(leader = %state.leader_addr, "connected to leader");

            let conn_id = self.next_conn_id();
            tokio::spawn(connection::handle_connection(
                self.clone(),
                stream,
                peer,
                conn_id,
                ConnectionOrigin::UpstreamLeader,
                Some(upstream_lost_tx.clone()),
            ));
        }

        tracing::info!(
            listen = %self.listen_addr,
            role = self.role.name(),
            "node is running"
        );

        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let conn_id = self.next_conn_id();
                        self.metrics.connection_accepted();
                        tracing::info!(peer = %peer, conn = conn_id, "accepted connection");
                        tokio::spawn(connection::handle_connection(
                            self.clone(),
                            stream,
                            peer,
                            conn_id,
                            ConnectionOrigin::Client,
                            None,
                        ));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
                _ = upstream_lost_rx.recv() => {
                    let addr = match &self.role {
                        Role::Follower(state) => state.leader_addr.clone(),
                        Role::Leader(_) => String::new(),
                    };
                    tracing::error!(leader = %addr, "lost connection to leader; shutting down");
                    return Err(FilamentError::LeaderConnectionLost { addr });
                }
                _ = shutdown_rx.changed() => {
                    tracing::info!("shutdown requested");
                    return Ok(());
                }
            }
        }
    }

    /// Whether a mutating command arriving over `origin` may execute on
    /// this node: the leader takes writes from anyone, a follower only
    /// from its own upstream link.
    pub(crate) fn may_mutate(&self, origin: ConnectionOrigin) -> bool {
        match &self.role {
            Role::Leader(_) => true,
            Role::Follower(_) => origin == ConnectionOrigin::UpstreamLeader,
        }
    }

    /// Fan a successfully applied mutation out to every current
    /// follower. Best-effort: enqueue failures are counted and logged,
    /// never surfaced to the originating client.
    pub(crate) fn propagate(&self, cmd: Command) {
        let Role::Leader(state) = &self.role else {
            return;
        };

        let targets = state.snapshot();
        if targets.is_empty() {
            return;
        }

        let frame = encode_command(&cmd);
        tracing::debug!(
            command = cmd.name(),
            followers = targets.len(),
            "propagating mutation"
        );

        for follower in targets {
            if !follower.send(frame.clone()) {
                self.metrics.propagation_failure();
                tracing::error!(
                    follower = %follower.peer(),
                    command = cmd.name(),
                    "propagation failed: follower connection gone"
                );
            }
        }
    }

    /// A receiver on the node's shutdown signal, for per-connection
    /// loops.
    pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    fn next_conn_id(&self) -> u64 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }
}
