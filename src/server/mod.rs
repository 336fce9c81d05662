//! TCP server, shared state, and the accept loop.

pub mod config;
mod connection;
pub mod replication;

pub use config::Config;
pub use connection::{ConnHandle, PeerRole};

use crate::error::Result;
use crate::protocol::Frame;
use crate::storage::{KvStore, StreamStore};
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, trace};

/// This node's replication role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepts writes and propagates them to replicas
    Primary,
    /// Syncs from a primary
    Replica,
}

impl Role {
    /// Wire name used in the INFO payload.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Primary => "master",
            Role::Replica => "slave",
        }
    }
}

/// Replication counters, updated atomically with propagation writes so the
/// offset always equals the bytes sent to replicas.
#[derive(Debug, Default)]
struct ReplState {
    offset: u64,
    need_acks: bool,
}

/// The server: shared stores, replication state, and the connection list.
#[derive(Debug)]
pub struct Server {
    config: Config,
    role: Role,
    repl_id: String,
    repl: tokio::sync::Mutex<ReplState>,
    conns: RwLock<Vec<Arc<ConnHandle>>>,
    kv: KvStore,
    streams: StreamStore,
    next_conn_id: AtomicU64,
}

impl Server {
    /// Create a server from configuration. The role follows `--replicaof`.
    pub fn new(config: Config) -> Self {
        let role = if config.replicaof.is_some() {
            Role::Replica
        } else {
            Role::Primary
        };
        Self {
            config,
            role,
            repl_id: replication::generate_repl_id(),
            repl: tokio::sync::Mutex::new(ReplState::default()),
            conns: RwLock::new(Vec::new()),
            kv: KvStore::new(),
            streams: StreamStore::new(),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// This node's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The 40-character replication id, stable for the life of the run.
    pub fn repl_id(&self) -> &str {
        &self.repl_id
    }

    /// The key/value store.
    pub fn kv(&self) -> &KvStore {
        &self.kv
    }

    /// The stream store.
    pub fn streams(&self) -> &StreamStore {
        &self.streams
    }

    /// Current replication offset.
    pub async fn offset(&self) -> u64 {
        self.repl.lock().await.offset
    }

    /// Advance the offset by `n` bytes of inbound replication traffic.
    pub async fn add_offset(&self, n: u64) {
        self.repl.lock().await.offset += n;
    }

    /// Reset the offset after a full resync.
    pub async fn reset_offset(&self) {
        self.repl.lock().await.offset = 0;
    }

    /// Record that a write happened since the last WAIT.
    pub async fn set_need_acks(&self) {
        self.repl.lock().await.need_acks = true;
    }

    /// Whether any write happened since the last WAIT.
    pub async fn need_acks(&self) -> bool {
        self.repl.lock().await.need_acks
    }

    /// Forget outstanding writes once WAIT has gathered its acks.
    pub async fn clear_need_acks(&self) {
        self.repl.lock().await.need_acks = false;
    }

    /// Live connections whose peer is an attached replica.
    pub fn replica_conns(&self) -> Vec<Arc<ConnHandle>> {
        self.conns
            .read()
            .iter()
            .filter(|c| c.role() == PeerRole::Replica && !c.is_terminated())
            .cloned()
            .collect()
    }

    /// Propagate a write command to every attached replica.
    ///
    /// Serialization and the offset bump happen under the replication lock
    /// so offset and byte stream stay in lockstep.
    pub async fn propagate(&self, frame: &Frame) {
        let replicas = self.replica_conns();
        if replicas.is_empty() {
            return;
        }
        let bytes = frame.to_bytes();
        self.propagate_bytes(&bytes, &replicas).await;
    }

    /// Write pre-marshalled bytes to the given replicas, advancing the
    /// offset by their length.
    pub async fn propagate_bytes(&self, bytes: &[u8], replicas: &[Arc<ConnHandle>]) {
        if replicas.is_empty() {
            return;
        }
        let mut repl = self.repl.lock().await;
        for conn in replicas {
            if let Err(e) = conn.write_bytes(bytes).await {
                trace!(conn = conn.id(), error = %e, "propagation write failed");
            }
        }
        repl.offset += bytes.len() as u64;
        trace!(bytes = bytes.len(), offset = repl.offset, "propagated");
    }

    /// Register an accepted stream and return its handle plus read half.
    fn register(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> (Arc<ConnHandle>, tokio::net::tcp::OwnedReadHalf) {
        let (read, write) = stream.into_split();
        let conn = self.register_split(write, peer_addr, PeerRole::Client);
        (conn, read)
    }

    /// Register a connection from an already-split stream.
    pub fn register_split(
        &self,
        write: OwnedWriteHalf,
        peer_addr: SocketAddr,
        role: PeerRole,
    ) -> Arc<ConnHandle> {
        let id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let conn = Arc::new(ConnHandle::new(id, peer_addr, write, role));
        self.conns.write().push(conn.clone());
        conn
    }

    /// Accept connections forever, one reader task per link.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!(
            port = listener.local_addr()?.port(),
            role = self.role.as_str(),
            "listening"
        );
        loop {
            let (stream, peer_addr) = listener.accept().await?;
            let (conn, read) = self.register(stream, peer_addr);
            tokio::spawn(connection::run_client(self.clone(), conn, read));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_follows_replicaof() {
        let server = Server::new(Config::default());
        assert_eq!(server.role(), Role::Primary);
        assert_eq!(server.role().as_str(), "master");

        let mut cfg = Config::default();
        cfg.replicaof = Some(("localhost".to_string(), 6379));
        let server = Server::new(cfg);
        assert_eq!(server.role(), Role::Replica);
        assert_eq!(server.role().as_str(), "slave");
    }

    #[tokio::test]
    async fn offset_bookkeeping() {
        let server = Server::new(Config::default());
        assert_eq!(server.offset().await, 0);
        server.add_offset(31).await;
        server.add_offset(37).await;
        assert_eq!(server.offset().await, 68);
        server.reset_offset().await;
        assert_eq!(server.offset().await, 0);
    }

    #[tokio::test]
    async fn need_acks_flag() {
        let server = Server::new(Config::default());
        assert!(!server.need_acks().await);
        server.set_need_acks().await;
        assert!(server.need_acks().await);
        server.clear_need_acks().await;
        assert!(!server.need_acks().await);
    }
}
