//! Primary/replica replication.
//!
//! A replica initiates the handshake on startup: PING, two REPLCONF
//! configuration exchanges, then PSYNC, answered by `+FULLRESYNC <replid>
//! <offset>` with an inline snapshot blob. From then on the primary socket
//! is an inbound command stream whose byte counts drive the replica's
//! offset. On the primary, every accepted write is propagated to all
//! replica connections under the offset lock, so the offset and the byte
//! stream stay in lockstep. WAIT gathers acknowledgements by diverting the
//! replica links' input into their inbound channels for the duration.

use crate::error::{CommandError, Error, Result};
use crate::persistence;
use crate::protocol::{Frame, RespParser};
use crate::server::connection::{run_primary_link, PeerRole};
use crate::server::{ConnHandle, Server};
use bytes::Bytes;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// How often WAIT polls the replica inbound channels.
const ACK_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Generate a 40-character alphanumeric replication id. Stability across a
/// run is all that matters.
pub fn generate_repl_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(40)
        .map(char::from)
        .collect()
}

/// Run the replica-initiated handshake against the configured primary and
/// hand the established link to a reader task. Fatal on failure.
pub async fn establish(server: &Arc<Server>) -> Result<()> {
    let Some((host, port)) = server.config().replicaof.clone() else {
        return Err(Error::Config("no primary configured".into()));
    };

    info!(%host, port, "connecting to primary");
    let mut stream = TcpStream::connect((host.as_str(), port)).await?;
    let mut parser = RespParser::new();

    send(&mut stream, &Frame::command(["PING"])).await?;
    expect_simple(&mut stream, &mut parser, "PONG").await?;

    let listening_port = server.config().port.to_string();
    send(
        &mut stream,
        &Frame::command(["REPLCONF", "listening-port", listening_port.as_str()]),
    )
    .await?;
    expect_simple(&mut stream, &mut parser, "OK").await?;

    send(&mut stream, &Frame::command(["REPLCONF", "capa", "psync2"])).await?;
    expect_simple(&mut stream, &mut parser, "OK").await?;

    send(&mut stream, &Frame::command(["PSYNC", "?", "-1"])).await?;
    let blob = read_full_resync(&mut stream, &mut parser).await?;
    if let Frame::Raw(data) = &blob {
        match persistence::load_bytes(data, server.kv()) {
            Ok(stats) => debug!(keys = stats.keys, "handshake snapshot applied"),
            Err(e) => warn!(error = %e, "handshake snapshot rejected"),
        }
    }

    server.reset_offset().await;

    let peer_addr = stream.peer_addr()?;
    let (read, write) = stream.into_split();
    let conn = server.register_split(write, peer_addr, PeerRole::Primary);
    tokio::spawn(run_primary_link(server.clone(), conn, read, parser));

    info!("replication link established");
    Ok(())
}

async fn send(stream: &mut TcpStream, frame: &Frame) -> Result<()> {
    stream.write_all(&frame.to_bytes()).await?;
    Ok(())
}

/// Read one frame, pulling more bytes from the socket as needed.
async fn read_reply(stream: &mut TcpStream, parser: &mut RespParser) -> Result<Frame> {
    let mut buf = [0u8; 4096];
    loop {
        if let Some((frame, _)) = parser.parse()? {
            return Ok(frame);
        }
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(Error::Handshake("primary closed the connection".into()));
        }
        parser.extend(&buf[..n]);
    }
}

async fn expect_simple(
    stream: &mut TcpStream,
    parser: &mut RespParser,
    expected: &str,
) -> Result<()> {
    let reply = read_reply(stream, parser).await?;
    match reply {
        Frame::Simple(ref s) if s == expected => Ok(()),
        other => Err(Error::Handshake(format!(
            "expected +{expected}, got {other:?}"
        ))),
    }
}

/// Read the FULLRESYNC preamble plus its trailing snapshot blob.
async fn read_full_resync(stream: &mut TcpStream, parser: &mut RespParser) -> Result<Frame> {
    let mut buf = [0u8; 4096];
    loop {
        if let Some((frame, _)) = parser.parse_full_resync()? {
            return Ok(frame);
        }
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(Error::Handshake("primary closed during full resync".into()));
        }
        parser.extend(&buf[..n]);
    }
}

/// `REPLCONF` handling; replies are written directly so the replica-side
/// GETACK response reflects the offset before the GETACK bytes are
/// counted, and `ACK` produces no frame at all.
pub async fn replconf(server: &Arc<Server>, conn: &Arc<ConnHandle>, args: &[String]) {
    if args.len() != 2 {
        let _ = conn
            .write_frame(&Frame::error(
                CommandError::wrong_arity("replconf").to_string(),
            ))
            .await;
        return;
    }

    let sub = args[0].to_uppercase();
    if sub == "GETACK" && args[1] == "*" {
        // Primary is asking this replica for its offset.
        let offset = server.offset().await.to_string();
        let ack = Frame::command(["REPLCONF", "ACK", offset.as_str()]);
        trace!(%offset, "answering GETACK");
        let _ = conn.write_frame(&ack).await;
    } else if sub == "ACK" {
        // Acknowledgement receipt; WAIT consumes these via the inbound
        // channel while the redirect is on.
        trace!(conn = conn.id(), "ack received outside WAIT");
    } else {
        // listening-port / capa configuration during the handshake.
        let _ = conn.write_frame(&Frame::ok()).await;
    }
}

/// `PSYNC` on the primary: flag the connection as a replica and reply with
/// FULLRESYNC plus the embedded empty snapshot.
pub async fn psync(server: &Arc<Server>, conn: &Arc<ConnHandle>) -> Vec<Frame> {
    conn.set_role(PeerRole::Replica);
    let offset = server.offset().await;
    info!(conn = conn.id(), peer = %conn.peer_addr(), "replica attached");
    vec![
        Frame::simple(format!("FULLRESYNC {} {}", server.repl_id(), offset)),
        Frame::Raw(Bytes::from_static(persistence::EMPTY_SNAPSHOT)),
    ]
}

/// `WAIT numreplicas timeoutMs`
///
/// With no writes outstanding the reply is simply the replica count.
/// Otherwise every replica link is put on read-redirect, a `REPLCONF
/// GETACK *` goes out to each, and acknowledgements are counted off the
/// inbound channels until the target or the deadline is reached. Any ACK
/// counts; the reported offset is not compared.
pub async fn wait_cmd(server: &Arc<Server>, args: &[String]) -> Frame {
    if args.len() != 2 {
        return Frame::error(CommandError::wrong_arity("wait").to_string());
    }
    let (Ok(need), Ok(timeout_ms)) = (args[0].parse::<usize>(), args[1].parse::<u64>()) else {
        return Frame::error(CommandError::NotInteger.to_string());
    };

    let replicas = server.replica_conns();
    if !server.need_acks().await {
        return Frame::Integer(replicas.len() as i64);
    }

    let getack = Frame::command(["REPLCONF", "GETACK", "*"]).to_bytes();
    for conn in &replicas {
        conn.set_redirect(true);
    }
    server.propagate_bytes(&getack, &replicas).await;

    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    let mut acks = 0usize;

    'gather: while acks < need && Instant::now() < deadline {
        for conn in &replicas {
            let mut inbound = conn.inbound_rx.lock().await;
            while let Ok(frame) = inbound.try_recv() {
                if is_ack(&frame) {
                    acks += 1;
                    trace!(acks, "ack gathered");
                    if acks >= need {
                        break 'gather;
                    }
                }
            }
        }
        tokio::time::sleep(ACK_POLL_INTERVAL).await;
    }

    server.clear_need_acks().await;
    for conn in &replicas {
        conn.set_redirect(false);
    }
    debug!(acks, need, "wait finished");
    Frame::Integer(acks as i64)
}

fn is_ack(frame: &Frame) -> bool {
    let Some(items) = frame.as_array() else {
        return false;
    };
    items.len() == 3
        && items[0]
            .as_str()
            .is_some_and(|s| s.eq_ignore_ascii_case("REPLCONF"))
        && items[1].as_str().is_some_and(|s| s.eq_ignore_ascii_case("ACK"))
}
