//! RESP frame types.
//!
//! A `Frame` represents a complete protocol message that can be sent or
//! received. Frames are cheap to clone (`Bytes` payloads) and serialize by
//! direct writes into a `BytesMut`.

use super::responses;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// A RESP frame representing a complete protocol message.
#[derive(Clone, PartialEq)]
pub enum Frame {
    /// Simple string (no newlines allowed)
    Simple(String),

    /// Error message
    Error(String),

    /// 64-bit signed integer
    Integer(i64),

    /// Bulk string (binary-safe)
    Bulk(Bytes),

    /// Null bulk string
    Null,

    /// Array of frames
    Array(Vec<Frame>),

    /// Bulk-like payload with no trailing CRLF. Used only for the inline
    /// snapshot blob exchanged during the replication handshake.
    Raw(Bytes),
}

impl Frame {
    /// Create a simple string frame.
    #[inline]
    pub fn simple(s: impl Into<String>) -> Self {
        Self::Simple(s.into())
    }

    /// Create an error frame.
    #[inline]
    pub fn error(s: impl Into<String>) -> Self {
        Self::Error(s.into())
    }

    /// Create a bulk string frame.
    #[inline]
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Self::Bulk(data.into())
    }

    /// Create an array frame.
    #[inline]
    pub fn array(frames: Vec<Frame>) -> Self {
        Self::Array(frames)
    }

    /// Create an array of bulk strings from command words.
    pub fn command<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Array(
            words
                .into_iter()
                .map(|w| Self::Bulk(Bytes::from(w.into())))
                .collect(),
        )
    }

    /// Create an OK response.
    #[inline]
    pub fn ok() -> Self {
        Self::Simple("OK".to_string())
    }

    /// Create a PONG response.
    #[inline]
    pub fn pong() -> Self {
        Self::Simple("PONG".to_string())
    }

    /// Create a QUEUED response (for transactions).
    #[inline]
    pub fn queued() -> Self {
        Self::Simple("QUEUED".to_string())
    }

    /// Check if this is a null frame.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Try to view the frame as text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Simple(s) | Self::Error(s) => Some(s),
            Self::Bulk(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Try to get the frame as an array.
    pub fn as_array(&self) -> Option<&[Frame]> {
        match self {
            Self::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Name of the command this frame carries, uppercased, if it is a
    /// non-empty array whose first element is textual.
    pub fn command_name(&self) -> Option<String> {
        let items = self.as_array()?;
        Some(items.first()?.as_str()?.to_uppercase())
    }

    /// Serialize the frame into a buffer.
    ///
    /// Marshalled forms are bit-exact: common replies use pre-marshalled
    /// byte strings, `Null` encodes as the null bulk `$-1\r\n`, and `Raw`
    /// is a bulk header plus payload with no trailing CRLF.
    pub fn serialize(&self, buf: &mut BytesMut) {
        match self {
            Self::Simple(s) => match s.as_str() {
                "OK" => buf.put_slice(responses::OK),
                "PONG" => buf.put_slice(responses::PONG),
                "QUEUED" => buf.put_slice(responses::QUEUED),
                _ => {
                    buf.put_u8(b'+');
                    buf.put_slice(s.as_bytes());
                    buf.put_slice(b"\r\n");
                }
            },
            Self::Error(s) => {
                buf.put_u8(b'-');
                buf.put_slice(s.as_bytes());
                buf.put_slice(b"\r\n");
            }
            Self::Integer(n) => {
                buf.put_u8(b':');
                buf.put_slice(n.to_string().as_bytes());
                buf.put_slice(b"\r\n");
            }
            Self::Bulk(data) => {
                buf.put_u8(b'$');
                buf.put_slice(data.len().to_string().as_bytes());
                buf.put_slice(b"\r\n");
                buf.put_slice(data);
                buf.put_slice(b"\r\n");
            }
            Self::Null => {
                buf.put_slice(responses::NULL_BULK);
            }
            Self::Array(frames) => {
                buf.put_u8(b'*');
                buf.put_slice(frames.len().to_string().as_bytes());
                buf.put_slice(b"\r\n");
                for frame in frames {
                    frame.serialize(buf);
                }
            }
            Self::Raw(data) => {
                buf.put_u8(b'$');
                buf.put_slice(data.len().to_string().as_bytes());
                buf.put_slice(b"\r\n");
                buf.put_slice(data);
            }
        }
    }

    /// Marshal the frame into owned bytes.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.serialize(&mut buf);
        buf.freeze()
    }

    /// Marshal the frame into a `Vec<u8>` for convenience.
    pub fn to_vec(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple(s) => write!(f, "Simple({s:?})"),
            Self::Error(s) => write!(f, "Error({s:?})"),
            Self::Integer(n) => write!(f, "Integer({n})"),
            Self::Bulk(b) => {
                if let Ok(s) = std::str::from_utf8(b) {
                    write!(f, "Bulk({s:?})")
                } else {
                    write!(f, "Bulk(<{} bytes>)", b.len())
                }
            }
            Self::Null => write!(f, "Null"),
            Self::Array(arr) => f.debug_list().entries(arr).finish(),
            Self::Raw(b) => write!(f, "Raw(<{} bytes>)", b.len()),
        }
    }
}

impl From<&str> for Frame {
    fn from(s: &str) -> Self {
        Self::Bulk(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Frame {
    fn from(s: String) -> Self {
        Self::Bulk(Bytes::from(s))
    }
}

impl From<i64> for Frame {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_string_serialize() {
        assert_eq!(Frame::simple("OK").to_vec(), b"+OK\r\n");
        assert_eq!(Frame::simple("hello").to_vec(), b"+hello\r\n");
    }

    #[test]
    fn error_serialize() {
        let frame = Frame::error("ERR Unknown command FOO");
        assert_eq!(frame.to_vec(), b"-ERR Unknown command FOO\r\n");
    }

    #[test]
    fn integer_serialize() {
        assert_eq!(Frame::Integer(42).to_vec(), b":42\r\n");
        assert_eq!(Frame::Integer(-1).to_vec(), b":-1\r\n");
        assert_eq!(Frame::Integer(0).to_vec(), b":0\r\n");
    }

    #[test]
    fn bulk_string_serialize() {
        assert_eq!(Frame::bulk("hello").to_vec(), b"$5\r\nhello\r\n");
        assert_eq!(Frame::bulk("").to_vec(), b"$0\r\n\r\n");
    }

    #[test]
    fn null_serialize() {
        assert_eq!(Frame::Null.to_vec(), b"$-1\r\n");
    }

    #[test]
    fn array_serialize() {
        let frame = Frame::command(["SET", "key", "value"]);
        assert_eq!(
            frame.to_vec(),
            b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n"
        );
    }

    #[test]
    fn raw_serialize_has_no_trailing_crlf() {
        let frame = Frame::Raw(Bytes::from_static(b"abc"));
        assert_eq!(frame.to_vec(), b"$3\r\nabc");
    }

    #[test]
    fn nested_array_serialize() {
        let frame = Frame::array(vec![
            Frame::Integer(1),
            Frame::array(vec![Frame::Integer(2), Frame::Integer(3)]),
        ]);
        assert_eq!(frame.to_vec(), b"*2\r\n:1\r\n*2\r\n:2\r\n:3\r\n");
    }

    #[test]
    fn command_name_uppercases() {
        let frame = Frame::command(["set", "k", "v"]);
        assert_eq!(frame.command_name().as_deref(), Some("SET"));
        assert_eq!(Frame::Null.command_name(), None);
    }
}
