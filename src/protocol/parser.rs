//! Streaming RESP decoder.
//!
//! The decoder accumulates socket reads in an internal buffer and yields one
//! frame at a time together with the exact number of bytes the frame
//! occupied on the wire. Parsing is checkpointed: a partially received frame
//! consumes nothing, so callers can simply feed more data and retry.

use super::frame::Frame;
use super::markers;
use crate::error::ProtocolError;
use crate::{MAX_ARGUMENTS, MAX_BULK_SIZE};
use bytes::{Buf, Bytes, BytesMut};
use memchr::memchr;

/// Streaming RESP parser.
///
/// ```ignore
/// let mut parser = RespParser::new();
/// parser.extend(&data);
/// while let Some((frame, nbytes)) = parser.parse()? {
///     // nbytes feeds replication offset accounting
/// }
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    buffer: BytesMut,
}

impl RespParser {
    /// Create a new parser.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add data to the parser buffer.
    #[inline]
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Returns true if the buffer holds no pending bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Number of buffered bytes not yet consumed by a frame.
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Try to decode one complete frame from the buffer.
    ///
    /// Returns `Ok(Some((frame, nbytes)))` when a frame was decoded,
    /// `Ok(None)` when more data is needed, and `Err` on malformed input.
    pub fn parse(&mut self) -> Result<Option<(Frame, usize)>, ProtocolError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let mut cur = Cursor::new(&self.buffer);
        match read_frame(&mut cur) {
            Ok(frame) => {
                let consumed = cur.pos;
                self.buffer.advance(consumed);
                Ok(Some((frame, consumed)))
            }
            Err(ProtocolError::Incomplete) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Decode the FULLRESYNC reply of a replication handshake: a simple
    /// string starting with `FULLRESYNC`, immediately followed by a snapshot
    /// blob marshalled as a bulk header and payload with no trailing CRLF.
    ///
    /// Returns the blob as a `Frame::Raw` plus the total byte count of both
    /// parts. This form appears exactly once per handshake.
    pub fn parse_full_resync(&mut self) -> Result<Option<(Frame, usize)>, ProtocolError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let mut cur = Cursor::new(&self.buffer);
        let result = (|| {
            if cur.read_byte()? != markers::SIMPLE_STRING {
                return Err(ProtocolError::InvalidFullResync);
            }
            let line = cur.read_line()?;
            if !line.starts_with(b"FULLRESYNC") {
                return Err(ProtocolError::InvalidFullResync);
            }
            read_raw_bulk(&mut cur)
        })();

        match result {
            Ok(frame) => {
                let consumed = cur.pos;
                self.buffer.advance(consumed);
                Ok(Some((frame, consumed)))
            }
            Err(ProtocolError::Incomplete) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Read position over the parser buffer. Nothing is consumed until the
/// whole frame has been read, which makes partial input restartable.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn read_byte(&mut self) -> Result<u8, ProtocolError> {
        let b = *self.buf.get(self.pos).ok_or(ProtocolError::Incomplete)?;
        self.pos += 1;
        Ok(b)
    }

    /// Read up to (not including) the next CRLF, consuming the terminator.
    fn read_line(&mut self) -> Result<&'a [u8], ProtocolError> {
        let rest = &self.buf[self.pos..];
        match find_crlf(rest) {
            Some(at) => {
                let line = &rest[..at];
                self.pos += at + 2;
                Ok(line)
            }
            None => Err(ProtocolError::Incomplete),
        }
    }

    fn read_exact(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        if self.buf.len() - self.pos < len {
            return Err(ProtocolError::Incomplete);
        }
        let data = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(data)
    }
}

fn read_frame(cur: &mut Cursor<'_>) -> Result<Frame, ProtocolError> {
    let marker = cur.read_byte()?;
    match marker {
        markers::SIMPLE_STRING => {
            let line = cur.read_line()?;
            Ok(Frame::Simple(as_utf8(line)?.to_string()))
        }
        markers::ERROR => {
            let line = cur.read_line()?;
            Ok(Frame::Error(as_utf8(line)?.to_string()))
        }
        markers::INTEGER => {
            let line = cur.read_line()?;
            Ok(Frame::Integer(parse_int(line)?))
        }
        markers::BULK_STRING => read_bulk(cur),
        markers::ARRAY => read_array(cur),
        other => Err(ProtocolError::InvalidTypeMarker(other)),
    }
}

fn read_bulk(cur: &mut Cursor<'_>) -> Result<Frame, ProtocolError> {
    let len = parse_int(cur.read_line()?)?;
    if len < 0 {
        return Ok(Frame::Null);
    }
    let len = len as usize;
    if len > MAX_BULK_SIZE {
        return Err(ProtocolError::BulkTooLarge {
            len,
            max: MAX_BULK_SIZE,
        });
    }

    let data = Bytes::copy_from_slice(cur.read_exact(len)?);
    let trailer = cur.read_exact(2)?;
    if trailer != b"\r\n" {
        return Err(ProtocolError::MissingCrlf);
    }
    Ok(Frame::Bulk(data))
}

fn read_array(cur: &mut Cursor<'_>) -> Result<Frame, ProtocolError> {
    let len = parse_int(cur.read_line()?)?;
    if len < 0 {
        return Ok(Frame::Null);
    }
    let len = len as usize;
    if len > MAX_ARGUMENTS {
        return Err(ProtocolError::TooManyElements {
            count: len,
            max: MAX_ARGUMENTS,
        });
    }

    let mut frames = Vec::with_capacity(len.min(1024));
    for _ in 0..len {
        frames.push(read_frame(cur)?);
    }
    Ok(Frame::Array(frames))
}

/// A bulk header and payload without the trailing CRLF: the snapshot blob.
fn read_raw_bulk(cur: &mut Cursor<'_>) -> Result<Frame, ProtocolError> {
    if cur.read_byte()? != markers::BULK_STRING {
        return Err(ProtocolError::InvalidFullResync);
    }
    let len = parse_int(cur.read_line()?)?;
    if len < 0 || len as usize > MAX_BULK_SIZE {
        return Err(ProtocolError::InvalidFullResync);
    }
    let data = Bytes::copy_from_slice(cur.read_exact(len as usize)?);
    Ok(Frame::Raw(data))
}

fn as_utf8(line: &[u8]) -> Result<&str, ProtocolError> {
    std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8)
}

fn parse_int(line: &[u8]) -> Result<i64, ProtocolError> {
    as_utf8(line)?
        .parse()
        .map_err(|_| ProtocolError::InvalidInteger(String::from_utf8_lossy(line).into_owned()))
}

/// Find CRLF in a byte slice via a SIMD `\r` scan, verifying `\n` follows.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    let mut offset = 0;
    while offset + 1 < buf.len() {
        match memchr(b'\r', &buf[offset..]) {
            Some(pos) => {
                let at = offset + pos;
                if at + 1 < buf.len() && buf[at + 1] == b'\n' {
                    return Some(at);
                }
                offset = at + 1;
            }
            None => return None,
        }
    }
    None
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    /// Frames without `Raw` (which is only ever hand-encoded) and without
    /// CR/LF inside line-oriented variants.
    fn arb_frame() -> impl Strategy<Value = Frame> {
        let leaf = prop_oneof![
            "[a-zA-Z0-9 ]{0,64}".prop_map(Frame::Simple),
            "[a-zA-Z0-9 ]{0,64}".prop_map(Frame::Error),
            any::<i64>().prop_map(Frame::Integer),
            proptest::collection::vec(any::<u8>(), 0..256)
                .prop_map(|v| Frame::Bulk(Bytes::from(v))),
            Just(Frame::Null),
        ];
        leaf.prop_recursive(3, 24, 8, |inner| {
            proptest::collection::vec(inner, 0..8).prop_map(Frame::Array)
        })
    }

    proptest! {
        /// decode(encode(f)) == f, and the reported byte count is exact.
        #[test]
        fn roundtrip(frame in arb_frame()) {
            let wire = frame.to_vec();
            let mut parser = RespParser::new();
            parser.extend(&wire);
            let (decoded, n) = parser.parse().unwrap().unwrap();
            prop_assert_eq!(decoded, frame);
            prop_assert_eq!(n, wire.len());
            prop_assert!(parser.is_empty());
        }

        /// Parser never panics on arbitrary input.
        #[test]
        fn never_panics(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let mut parser = RespParser::new();
            parser.extend(&data);
            let _ = parser.parse();
        }

        /// Splitting the input at any point yields the same frame.
        #[test]
        fn chunked_input_equivalent(split in 0usize..31) {
            let wire = b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n";
            let split = split.min(wire.len());

            let mut parser = RespParser::new();
            parser.extend(&wire[..split]);
            let early = parser.parse().unwrap();
            if let Some((_, n)) = &early {
                prop_assert_eq!(*n, wire.len());
            }
            parser.extend(&wire[split..]);
            if early.is_none() {
                let (frame, n) = parser.parse().unwrap().unwrap();
                prop_assert_eq!(frame, Frame::command(["SET", "foo", "bar"]));
                prop_assert_eq!(n, wire.len());
            }
        }
    }
}
