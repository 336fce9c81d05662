//! Command dispatch.
//!
//! An incoming array frame is routed by the uppercased name in its first
//! element. Operations that mutate KV state are propagated to replicas
//! before the client sees a reply, so the primary's offset counter grows
//! monotonically. The raw snapshot blob received during a replication
//! handshake is routed to the snapshot decoder.

pub mod server_cmds;
pub mod streams;
pub mod strings;
pub mod transactions;

use crate::error::CommandError;
use crate::persistence;
use crate::protocol::Frame;
use crate::server::{replication, ConnHandle, Server};
use std::sync::Arc;
use tracing::{info, trace, warn};

/// Dispatch one decoded frame, returning the reply frames in order.
///
/// Most operations reply with exactly one frame. `PSYNC` replies with two,
/// and operations that write their reply from a helper task (`XREAD`) or
/// directly (`REPLCONF`) reply with none.
pub async fn dispatch(server: &Arc<Server>, conn: &Arc<ConnHandle>, frame: Frame) -> Vec<Frame> {
    match &frame {
        Frame::Array(items) => {
            let Some(name) = frame.command_name() else {
                return vec![Frame::error("ERR malformed command")];
            };
            let args: Vec<String> = items[1..]
                .iter()
                .map(|f| f.as_str().unwrap_or_default().to_string())
                .collect();
            trace!(command = %name, args = args.len(), "dispatch");
            route(server, conn, &frame, &name, &args).await
        }
        Frame::Raw(data) => match persistence::load_bytes(data, server.kv()) {
            Ok(stats) => {
                info!(keys = stats.keys, "snapshot applied from primary");
                vec![Frame::ok()]
            }
            Err(e) => {
                warn!(error = %e, "failed to decode inbound snapshot");
                vec![Frame::error(format!("ERR {e}"))]
            }
        },
        _ => vec![Frame::error("ERR unhandled frame type")],
    }
}

async fn route(
    server: &Arc<Server>,
    conn: &Arc<ConnHandle>,
    frame: &Frame,
    name: &str,
    args: &[String],
) -> Vec<Frame> {
    match name {
        "PING" => vec![server_cmds::ping(args)],
        "ECHO" => vec![server_cmds::echo(args)],
        "SET" => {
            server.propagate(frame).await;
            vec![strings::set(server, args).await]
        }
        "GET" => vec![strings::get(server, args)],
        "INCR" => vec![strings::incr(server, args)],
        "KEYS" => vec![strings::keys(server, args)],
        "TYPE" => vec![strings::type_cmd(server, args)],
        "XADD" => vec![streams::xadd(server, args)],
        "XRANGE" => vec![streams::xrange(server, args)],
        "XREAD" => {
            // XREAD may block; it computes and writes its reply from its
            // own task so this reader can keep draining the socket.
            let server = server.clone();
            let conn = conn.clone();
            let args = args.to_vec();
            tokio::spawn(async move {
                let reply = streams::xread(&server, &args).await;
                if let Err(e) = conn.write_frame(&reply).await {
                    trace!(error = %e, "xread reply dropped");
                }
            });
            Vec::new()
        }
        "INFO" => vec![server_cmds::info(server, args).await],
        "CONFIG" => vec![server_cmds::config(server, args)],
        "COMMAND" => vec![Frame::Null],
        "MULTI" => transactions::begin(server, conn),
        "EXEC" => vec![Frame::error(CommandError::ExecWithoutMulti.to_string())],
        "DISCARD" => vec![Frame::error(CommandError::DiscardWithoutMulti.to_string())],
        "REPLCONF" => {
            replication::replconf(server, conn, args).await;
            Vec::new()
        }
        "PSYNC" => replication::psync(server, conn).await,
        "WAIT" => vec![replication::wait_cmd(server, args).await],
        other => vec![Frame::error(
            CommandError::UnknownCommand(other.to_string()).to_string(),
        )],
    }
}
