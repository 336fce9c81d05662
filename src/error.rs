//! Error types for rivulet.
//!
//! Errors that reach a client are rendered as RESP error frames; the
//! `CommandError` messages below are the exact strings that appear on the
//! wire.

use std::io;
use thiserror::Error;

/// Result type alias for rivulet operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for rivulet.
#[derive(Error, Debug)]
pub enum Error {
    /// Protocol parsing errors
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Command execution errors
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// Snapshot decoding errors
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Replication handshake failures
    #[error("handshake error: {0}")]
    Handshake(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),
}

/// Protocol-level errors during RESP decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The leading byte is not a known frame marker
    #[error("invalid type marker: {0:?}")]
    InvalidTypeMarker(u8),

    /// A length or integer header could not be parsed
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a line-oriented frame
    #[error("invalid UTF-8 in string")]
    InvalidUtf8,

    /// Missing CRLF terminator after a bulk payload
    #[error("missing CRLF terminator")]
    MissingCrlf,

    /// Bulk string exceeds the configured limit
    #[error("bulk string too large: {len} bytes (max: {max})")]
    BulkTooLarge {
        /// Actual bulk string length in bytes
        len: usize,
        /// Maximum allowed length
        max: usize,
    },

    /// Too many array elements
    #[error("too many array elements: {count} (max: {max})")]
    TooManyElements {
        /// Actual element count
        count: usize,
        /// Maximum allowed count
        max: usize,
    },

    /// The stream ended mid-frame
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// The full-resync preamble was not a FULLRESYNC simple string
    #[error("invalid full-resync preamble")]
    InvalidFullResync,

    /// Incomplete frame - need more data
    #[error("incomplete frame, need more data")]
    Incomplete,
}

/// Command execution errors. `Display` output is the wire message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command
    #[error("ERR Unknown command {0}")]
    UnknownCommand(String),

    /// Wrong number of arguments
    #[error("ERR wrong number of arguments for '{command}' command")]
    WrongArity {
        /// Command name that received wrong arity
        command: String,
    },

    /// Syntax error (e.g. unknown SET option word)
    #[error("ERR syntax error")]
    SyntaxError,

    /// Not an integer
    #[error("ERR value is not an integer or out of range")]
    NotInteger,

    /// Stream ID 0-0 rejected
    #[error("ERR The ID specified in XADD must be greater than 0-0")]
    StreamIdZero,

    /// Stream ID is equal or smaller than the stream top
    #[error("ERR The ID specified in XADD is equal or smaller than the target stream top item")]
    StreamIdTooSmall,

    /// Malformed stream ID
    #[error("ERR Invalid stream ID specified as stream command argument")]
    StreamInvalidId,

    /// Stream key does not exist
    #[error("ERR stream not found")]
    StreamNotFound,

    /// EXEC without MULTI
    #[error("ERR EXEC without MULTI")]
    ExecWithoutMulti,

    /// DISCARD without MULTI
    #[error("ERR DISCARD without MULTI")]
    DiscardWithoutMulti,

    /// CONFIG subcommand not recognized
    #[error("ERR unknown subcommand or wrong number of arguments")]
    UnknownSubcommand,
}

impl CommandError {
    /// Wrong-arity error for the given command name.
    pub fn wrong_arity(command: &str) -> Self {
        Self::WrongArity {
            command: command.to_lowercase(),
        }
    }
}

/// Snapshot decoding errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Structural corruption in the snapshot stream
    #[error("corrupted snapshot: {0}")]
    Corrupted(String),

    /// Magic bytes did not match
    #[error("not a snapshot file")]
    BadMagic,

    /// Compressed string encoding is not supported
    #[error("compressed string encoding is not supported")]
    CompressedString,

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
