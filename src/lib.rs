//! # rivulet
//!
//! A single-node in-memory data store speaking the RESP wire protocol,
//! with:
//! - primary/replica replication: handshake, write propagation with
//!   byte-accurate offset tracking, and WAIT acknowledgement gathering
//! - an append-only stream type with time-ordered ids, range queries, and
//!   blocking reads
//! - MULTI/EXEC transaction batching
//! - binary snapshot loading at startup
//!
//! ## Example
//!
//! ```no_run
//! use rivulet::{Config, Server};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> rivulet::Result<()> {
//!     let config = Config::default();
//!     let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
//!     Arc::new(Server::new(config)).serve(listener).await
//! }
//! ```

#![warn(rust_2018_idioms, trivial_casts, unused_lifetimes)]

/// Command parsing and dispatch.
pub mod commands;
/// Error types and result alias.
pub mod error;
/// Snapshot loading.
pub mod persistence;
/// RESP protocol implementation.
pub mod protocol;
/// TCP server, connections, replication.
pub mod server;
/// In-memory stores and containers.
pub mod storage;

pub use error::{Error, Result};
pub use protocol::{Frame, RespParser};
pub use server::{Config, Server};
pub use storage::{KvStore, StreamStore};

/// Crate version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default server port.
pub const DEFAULT_PORT: u16 = 6379;

/// Maximum bulk string size (512 MiB).
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of elements in one array frame.
pub const MAX_ARGUMENTS: usize = 1_000_000;
