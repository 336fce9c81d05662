//! Per-connection state and reader loops.
//!
//! One task drives each link, reading frames in arrival order. A frame is
//! either dispatched directly or, when the read-redirect flag is on,
//! delivered to the connection's inbound channel for whichever operator
//! (MULTI or WAIT) currently owns the input stream. Traffic arriving on
//! the link to the primary is replication input: replies are suppressed
//! and the byte count of every frame advances the local offset.

use crate::commands::dispatch;
use crate::protocol::{Frame, RespParser};
use crate::server::Server;
use crate::storage::Fifo;
use bytes::BytesMut;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Buffer size for socket reads.
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Capacity of the inbound redirect channel.
const INBOUND_CHANNEL_SIZE: usize = 64;

/// What the remote end of a connection is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    /// An ordinary client
    Client,
    /// A replica that has completed PSYNC and receives propagated writes
    Replica,
    /// The primary this replica node syncs from
    Primary,
}

/// Atomic cell for `PeerRole`.
#[derive(Debug)]
struct AtomicRole(AtomicU8);

impl AtomicRole {
    fn new(role: PeerRole) -> Self {
        Self(AtomicU8::new(role as u8))
    }

    fn load(&self) -> PeerRole {
        match self.0.load(Ordering::Relaxed) {
            1 => PeerRole::Replica,
            2 => PeerRole::Primary,
            _ => PeerRole::Client,
        }
    }

    fn store(&self, role: PeerRole) {
        self.0.store(role as u8, Ordering::Relaxed);
    }
}

/// Shared per-link record.
///
/// The writer is shared because replies originate from several tasks: the
/// reader itself, the MULTI operator, XREAD helper tasks, and propagation
/// from other connections.
#[derive(Debug)]
pub struct ConnHandle {
    id: u64,
    peer_addr: SocketAddr,
    role: AtomicRole,
    redirect_read: AtomicBool,
    writer: tokio::sync::Mutex<BufWriter<OwnedWriteHalf>>,
    inbound_tx: mpsc::Sender<Frame>,
    /// Receiving side of the inbound channel, taken over by operators.
    pub inbound_rx: tokio::sync::Mutex<mpsc::Receiver<Frame>>,
    /// Transaction buffer for MULTI.
    pub txn: Mutex<Fifo<Frame>>,
    terminated: AtomicBool,
}

impl ConnHandle {
    /// Create a handle over the write half of an accepted stream.
    pub fn new(id: u64, peer_addr: SocketAddr, write: OwnedWriteHalf, role: PeerRole) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_SIZE);
        Self {
            id,
            peer_addr,
            role: AtomicRole::new(role),
            redirect_read: AtomicBool::new(false),
            writer: tokio::sync::Mutex::new(BufWriter::new(write)),
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            txn: Mutex::new(Fifo::new()),
            terminated: AtomicBool::new(false),
        }
    }

    /// Connection id, unique per server.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remote address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Role of the remote endpoint.
    pub fn role(&self) -> PeerRole {
        self.role.load()
    }

    /// Change the remote endpoint's role (PSYNC flips a client to replica).
    pub fn set_role(&self, role: PeerRole) {
        self.role.store(role);
    }

    /// Whether inbound frames are being diverted to the inbound channel.
    pub fn redirect_read(&self) -> bool {
        self.redirect_read.load(Ordering::Acquire)
    }

    /// Toggle the read-redirect flag.
    pub fn set_redirect(&self, on: bool) {
        self.redirect_read.store(on, Ordering::Release);
    }

    /// Deliver a frame to whichever operator owns the inbound channel.
    pub async fn forward(&self, frame: Frame) {
        if self.inbound_tx.send(frame).await.is_err() {
            trace!(conn = self.id, "inbound channel closed");
        }
    }

    /// Serialize and write one frame.
    pub async fn write_frame(&self, frame: &Frame) -> std::io::Result<()> {
        let mut buf = BytesMut::new();
        frame.serialize(&mut buf);
        self.write_bytes(&buf).await
    }

    /// Write pre-marshalled bytes.
    pub async fn write_bytes(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await
    }

    /// Mark the link as gone. The record stays in the server's list; it is
    /// not compacted.
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::Release);
    }

    /// Whether the link has closed.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }
}

/// Reader loop for an accepted connection.
pub async fn run_client(server: Arc<Server>, conn: Arc<ConnHandle>, mut read: OwnedReadHalf) {
    let mut parser = RespParser::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    debug!(conn = conn.id(), peer = %conn.peer_addr(), "connection open");

    'outer: loop {
        let n = match read.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(conn = conn.id(), error = %e, "read failed");
                break;
            }
        };
        parser.extend(&buf[..n]);

        loop {
            match parser.parse() {
                Ok(Some((frame, _))) => {
                    if conn.redirect_read() {
                        conn.forward(frame).await;
                    } else {
                        for reply in dispatch(&server, &conn, frame).await {
                            if conn.write_frame(&reply).await.is_err() {
                                break 'outer;
                            }
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(conn = conn.id(), error = %e, "protocol error");
                    let _ = conn.write_frame(&Frame::error(format!("ERR {e}"))).await;
                    break 'outer;
                }
            }
        }
    }

    conn.terminate();
    debug!(conn = conn.id(), "connection closed");
}

/// Reader loop for the link to the primary, entered after the handshake.
///
/// Every frame is replication input: it is dispatched with replies
/// suppressed, then its exact wire size advances the local offset. A
/// `REPLCONF GETACK` is answered inside its handler with the offset as it
/// stood before the GETACK's own bytes are counted.
pub async fn run_primary_link(
    server: Arc<Server>,
    conn: Arc<ConnHandle>,
    mut read: OwnedReadHalf,
    mut parser: RespParser,
) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        // Bytes may already be buffered from the handshake read.
        loop {
            match parser.parse() {
                Ok(Some((frame, nbytes))) => {
                    let _ = dispatch(&server, &conn, frame).await;
                    server.add_offset(nbytes as u64).await;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "protocol error on primary link");
                    conn.terminate();
                    return;
                }
            }
        }

        match read.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => parser.extend(&buf[..n]),
            Err(e) => {
                debug!(error = %e, "primary link read failed");
                break;
            }
        }
    }

    conn.terminate();
    debug!("primary link closed");
}
