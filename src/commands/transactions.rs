//! MULTI/EXEC/DISCARD transaction batching.
//!
//! MULTI turns on the connection's read-redirect flag and spawns an
//! operator task that takes over the connection's inbound channel. Every
//! frame other than EXEC or DISCARD is enqueued without validation and
//! answered with QUEUED. EXEC dispatches the buffered frames in order and
//! gathers every reply into one array; DISCARD drops the buffer. Either
//! way the operator clears the redirect flag and exits, handing input back
//! to the main dispatcher.

use crate::commands::dispatch;
use crate::protocol::Frame;
use crate::server::{ConnHandle, Server};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, trace};

/// Enter transaction mode on this connection. Replies `+OK`.
pub fn begin(server: &Arc<Server>, conn: &Arc<ConnHandle>) -> Vec<Frame> {
    conn.set_redirect(true);
    let operator: Pin<Box<dyn Future<Output = ()> + Send>> =
        Box::pin(run_operator(server.clone(), conn.clone()));
    tokio::spawn(operator);
    vec![Frame::ok()]
}

/// The transaction operator: owns the inbound channel while the redirect
/// flag is on. The flag and this task's lifetime stay paired: every exit
/// path clears the flag first.
async fn run_operator(server: Arc<Server>, conn: Arc<ConnHandle>) {
    debug!(conn = conn.id(), "transaction started");
    let mut inbound = conn.inbound_rx.lock().await;

    loop {
        let Some(frame) = inbound.recv().await else {
            // Connection gone; its pending queue dies with it.
            conn.txn.lock().clear();
            conn.set_redirect(false);
            return;
        };

        match frame.command_name().as_deref() {
            Some("EXEC") => break,
            Some("DISCARD") => {
                conn.txn.lock().clear();
                let _ = conn.write_frame(&Frame::ok()).await;
                conn.set_redirect(false);
                debug!(conn = conn.id(), "transaction discarded");
                return;
            }
            _ => {
                conn.txn.lock().enqueue(frame);
                let _ = conn.write_frame(&Frame::queued()).await;
            }
        }
    }

    // EXEC: run the batch in order, one array reply for the lot.
    let queued: Vec<Frame> = conn.txn.lock().drain().collect();
    trace!(conn = conn.id(), commands = queued.len(), "exec");
    let mut results = Vec::with_capacity(queued.len());
    for frame in queued {
        results.extend(dispatch(&server, &conn, frame).await);
    }
    let _ = conn.write_frame(&Frame::Array(results)).await;
    conn.set_redirect(false);
    debug!(conn = conn.id(), "transaction committed");
}
