//! RESP wire protocol implementation.
//!
//! The protocol is a length-prefixed, type-tagged line protocol. Frames are
//! decoded incrementally from a byte buffer; the decoder reports how many
//! bytes each frame consumed, which replication uses for offset accounting.

mod frame;
mod parser;
pub mod responses;

pub use frame::Frame;
pub use parser::RespParser;

/// Frame type markers.
pub mod markers {
    /// Simple string: `+...\r\n`
    pub const SIMPLE_STRING: u8 = b'+';
    /// Error: `-...\r\n`
    pub const ERROR: u8 = b'-';
    /// Integer: `:...\r\n`
    pub const INTEGER: u8 = b':';
    /// Bulk string: `$<len>\r\n<data>\r\n`
    pub const BULK_STRING: u8 = b'$';
    /// Array: `*<len>\r\n<frames>`
    pub const ARRAY: u8 = b'*';
}
