//! Pre-marshalled byte strings for the most common replies.

/// `+OK\r\n`
pub const OK: &[u8] = b"+OK\r\n";

/// `+PONG\r\n`
pub const PONG: &[u8] = b"+PONG\r\n";

/// `+QUEUED\r\n`
pub const QUEUED: &[u8] = b"+QUEUED\r\n";

/// Null bulk string, also the marshalled form of `Frame::Null`.
pub const NULL_BULK: &[u8] = b"$-1\r\n";
