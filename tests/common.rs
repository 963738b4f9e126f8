//! Common test utilities.
//!
//! Shared helpers for integration tests. Import with `mod common;` in
//! test files.

#![allow(dead_code)]

use filament::cache::{Cache, MemoryCache};
use filament::core::config::{Config, NodeConfig};
use filament::core::error::FilamentResult;
use filament::node::{Node, Role};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A node running in the test process on an ephemeral port.
pub struct TestNode {
    /// The address the node actually bound.
    pub addr: String,
    /// Handle on the node itself, for inspecting role and metrics.
    pub node: Arc<Node>,
    /// Send `true` to stop the serve loop.
    pub shutdown: watch::Sender<bool>,
    /// The serve task; resolves when the node stops.
    pub serve: JoinHandle<FilamentResult<()>>,
}

/// Spawn a node on port 0 with a fresh cache.
pub async fn spawn_node(leader_addr: Option<String>) -> TestNode {
    let config = NodeConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        leader_addr,
    };
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
    let (shutdown, shutdown_rx) = watch::channel(false);
    let node = Arc::new(Node::new(&config, cache, shutdown_rx));

    let listener = node.bind().await.expect("bind test node");
    let addr = listener.local_addr().expect("local addr").to_string();
    let serve = tokio::spawn(node.clone().serve(listener));

    TestNode {
        addr,
        node,
        shutdown,
        serve,
    }
}

/// Spawn a leader node.
pub async fn spawn_leader() -> TestNode {
    spawn_node(None).await
}

/// Spawn a follower attached to `leader` and wait until the leader has
/// registered it.
pub async fn spawn_follower(leader: &TestNode) -> TestNode {
    let before = follower_count(&leader.node);
    let follower = spawn_node(Some(leader.addr.clone())).await;

    let leader_node = leader.node.clone();
    wait_for("follower registration", move || {
        follower_count(&leader_node) > before
    })
    .await;

    follower
}

/// The number of followers a leader currently has registered.
pub fn follower_count(node: &Arc<Node>) -> usize {
    match node.role() {
        Role::Leader(state) => state.follower_count(),
        Role::Follower(_) => 0,
    }
}

/// Poll `cond` until it holds or a 5 second deadline passes.
pub async fn wait_for(what: &str, cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// Open a raw TCP connection for byte-level protocol tests.
pub async fn raw_connect(addr: &str) -> TcpStream {
    TcpStream::connect(addr).await.expect("raw connect")
}

/// Read exactly `n` bytes from a raw stream.
pub async fn read_exact(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    stream.read_exact(&mut buf).await.expect("read_exact");
    buf
}

/// Write a TOML config to a temp file.
pub fn write_config_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(content.as_bytes()).expect("write config");
    file
}

/// Load a config from a temp file.
pub fn load_config(file: &NamedTempFile) -> Config {
    Config::from_file(file.path()).expect("load config")
}
