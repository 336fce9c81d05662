//! Binary snapshot decoder.
//!
//! # Format
//!
//! ```text
//! +-------+---------+-----------------+-----------------------+------+
//! | REDIS | version | 0xFA metadata…  | 0xFE database section… | 0xFF |
//! +-------+---------+-----------------+-----------------------+------+
//! ```
//!
//! The 9-byte header carries the ASCII magic `REDIS` and a 4-byte version
//! that is accepted without validation. Metadata records are pairs of
//! length-prefixed strings, both discarded. A database section is the
//! database index, an 0xFB hash-table size hint (key count and expiry
//! count), then the keys: an optional expiration (0xFC milliseconds or
//! 0xFD seconds), a one-byte value type (only strings are supported), key
//! string, value string.

use crate::error::StorageError;
use crate::storage::KvStore;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, warn};

const MAGIC: &[u8; 5] = b"REDIS";

const OPCODE_META: u8 = 0xFA;
const OPCODE_RESIZE: u8 = 0xFB;
const OPCODE_EXPIRE_MS: u8 = 0xFC;
const OPCODE_EXPIRE_SEC: u8 = 0xFD;
const OPCODE_SELECTDB: u8 = 0xFE;
const OPCODE_EOF: u8 = 0xFF;

/// Value type byte for plain strings, the only type this decoder accepts.
const TYPE_STRING: u8 = 0;

/// Special string encodings (length byte with both top bits set).
const ENC_INT8: u8 = 0xC0;
const ENC_INT16: u8 = 0xC1;
const ENC_INT32: u8 = 0xC2;
const ENC_COMPRESSED: u8 = 0xC3;

/// The canonical empty snapshot: served verbatim after FULLRESYNC when a
/// replica requests a full sync and the primary has nothing to transfer.
pub const EMPTY_SNAPSHOT: &[u8] = &[
    0x52, 0x45, 0x44, 0x49, 0x53, 0x30, 0x30, 0x31, 0x31, 0xfa, 0x09, 0x72,
    0x65, 0x64, 0x69, 0x73, 0x2d, 0x76, 0x65, 0x72, 0x05, 0x37, 0x2e, 0x32,
    0x2e, 0x30, 0xfa, 0x0a, 0x72, 0x65, 0x64, 0x69, 0x73, 0x2d, 0x62, 0x69,
    0x74, 0x73, 0xc0, 0x40, 0xfa, 0x05, 0x63, 0x74, 0x69, 0x6d, 0x65, 0xc2,
    0x6d, 0x08, 0xbc, 0x65, 0xfa, 0x08, 0x75, 0x73, 0x65, 0x64, 0x2d, 0x6d,
    0x65, 0x6d, 0xc2, 0xb0, 0xc4, 0x10, 0x00, 0xfa, 0x08, 0x61, 0x6f, 0x66,
    0x2d, 0x62, 0x61, 0x73, 0x65, 0xc0, 0x00, 0xff, 0xf0, 0x6e, 0x3b, 0xfe,
    0xc0, 0xff, 0x5a, 0xa2,
];

/// What a successful load put into the store.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoadStats {
    /// Keys loaded
    pub keys: usize,
    /// Keys that carried an expiration
    pub expires: usize,
}

/// Decode a snapshot file into the store.
pub fn load_file(path: &Path, kv: &KvStore) -> Result<LoadStats, StorageError> {
    let file = File::open(path)?;
    let mut decoder = Decoder::new(BufReader::new(file));
    decoder.run(kv)
}

/// Decode an in-memory snapshot blob (replication handshake) into the store.
pub fn load_bytes(data: &[u8], kv: &KvStore) -> Result<LoadStats, StorageError> {
    let mut decoder = Decoder::new(data);
    decoder.run(kv)
}

/// Reader with one byte of lookahead over the snapshot stream.
struct Decoder<R> {
    reader: R,
    peeked: Option<u8>,
}

impl<R: Read> Decoder<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            peeked: None,
        }
    }

    fn run(&mut self, kv: &KvStore) -> Result<LoadStats, StorageError> {
        self.read_header()?;
        self.skip_metadata()?;

        let mut stats = LoadStats::default();
        loop {
            match self.peek_u8()? {
                Some(OPCODE_EOF) | None => break,
                Some(OPCODE_SELECTDB) => self.read_section(kv, &mut stats)?,
                Some(other) => {
                    return Err(StorageError::Corrupted(format!(
                        "unexpected opcode 0x{other:02x}"
                    )))
                }
            }
        }

        debug!(keys = stats.keys, expires = stats.expires, "snapshot decoded");
        Ok(stats)
    }

    fn read_header(&mut self) -> Result<(), StorageError> {
        let mut header = [0u8; 9];
        self.reader
            .read_exact(&mut header)
            .map_err(|_| StorageError::Corrupted("truncated header".into()))?;
        if &header[..5] != MAGIC {
            return Err(StorageError::BadMagic);
        }
        // Bytes 5..9 carry the format version; accepted without validation.
        Ok(())
    }

    /// Metadata records: 0xFA, key string, value string. Both discarded.
    fn skip_metadata(&mut self) -> Result<(), StorageError> {
        while self.peek_u8()? == Some(OPCODE_META) {
            self.read_u8()?;
            self.read_string()?;
            self.read_string()?;
        }
        Ok(())
    }

    fn read_section(&mut self, kv: &KvStore, stats: &mut LoadStats) -> Result<(), StorageError> {
        self.read_u8()?; // 0xFE
        let index = self.read_length()?;
        if index != 0 {
            warn!(index, "snapshot selects a database beyond 0; loading anyway");
        }

        if self.read_u8()? != OPCODE_RESIZE {
            return Err(StorageError::Corrupted("missing resize hint".into()));
        }
        let key_count = self.read_length()?;
        let _expiry_count = self.read_length()?;

        for _ in 0..key_count {
            let mut op = self.read_u8()?;
            let expires_at = match op {
                OPCODE_EXPIRE_MS => {
                    let at = self.read_u64_le()? as i64;
                    op = self.read_u8()?;
                    at
                }
                OPCODE_EXPIRE_SEC => {
                    let at = i64::from(self.read_u32_le()?) * 1000;
                    op = self.read_u8()?;
                    at
                }
                _ => 0,
            };

            if op != TYPE_STRING {
                return Err(StorageError::Corrupted(format!(
                    "unsupported value type 0x{op:02x}"
                )));
            }

            let key = self.read_string()?;
            let value = self.read_string()?;
            if expires_at > 0 {
                stats.expires += 1;
            }
            stats.keys += 1;
            kv.restore(key, value, expires_at);
        }
        Ok(())
    }

    /// Length encoding: the top two bits of the first byte select the
    /// format. `00`: low six bits. `01`: 14-bit value with the next byte.
    /// `10`: next four bytes, big-endian. `11` is reserved for the special
    /// string encodings and is invalid in a pure length position.
    fn read_length(&mut self) -> Result<u64, StorageError> {
        let b = self.read_u8()?;
        match b >> 6 {
            0 => Ok(u64::from(b & 0x3F)),
            1 => {
                let next = self.read_u8()?;
                Ok(u64::from(b & 0x3F) << 8 | u64::from(next))
            }
            2 => {
                let mut buf = [0u8; 4];
                self.read_exact(&mut buf)?;
                Ok(u64::from(u32::from_be_bytes(buf)))
            }
            _ => Err(StorageError::Corrupted(
                "special encoding in length position".into(),
            )),
        }
    }

    /// String encoding: either a length-prefixed raw string, or one of the
    /// special integer forms printed as decimal. Compressed strings are not
    /// supported.
    fn read_string(&mut self) -> Result<String, StorageError> {
        let b = self.peek_u8()?.ok_or_else(unexpected_eof)?;
        if b >> 6 != 3 {
            let len = self.read_length()? as usize;
            let mut buf = vec![0u8; len];
            self.read_exact(&mut buf)?;
            return Ok(String::from_utf8_lossy(&buf).into_owned());
        }

        self.read_u8()?;
        match b {
            ENC_INT8 => Ok((self.read_u8()? as i8).to_string()),
            ENC_INT16 => {
                let mut buf = [0u8; 2];
                self.read_exact(&mut buf)?;
                Ok(i16::from_le_bytes(buf).to_string())
            }
            ENC_INT32 => {
                let mut buf = [0u8; 4];
                self.read_exact(&mut buf)?;
                Ok(i32::from_le_bytes(buf).to_string())
            }
            ENC_COMPRESSED => Err(StorageError::CompressedString),
            other => Err(StorageError::Corrupted(format!(
                "unknown string encoding 0x{other:02x}"
            ))),
        }
    }

    fn read_u8(&mut self) -> Result<u8, StorageError> {
        if let Some(b) = self.peeked.take() {
            return Ok(b);
        }
        let mut buf = [0u8; 1];
        self.reader
            .read_exact(&mut buf)
            .map_err(|_| unexpected_eof())?;
        Ok(buf[0])
    }

    /// Look at the next byte without consuming it; `None` at end of input.
    fn peek_u8(&mut self) -> Result<Option<u8>, StorageError> {
        if self.peeked.is_none() {
            let mut buf = [0u8; 1];
            match self.reader.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => self.peeked = Some(buf[0]),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(self.peeked)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), StorageError> {
        let mut start = 0;
        if let Some(b) = self.peeked.take() {
            if buf.is_empty() {
                self.peeked = Some(b);
                return Ok(());
            }
            buf[0] = b;
            start = 1;
        }
        self.reader
            .read_exact(&mut buf[start..])
            .map_err(|_| unexpected_eof())
    }

    fn read_u32_le(&mut self) -> Result<u32, StorageError> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64_le(&mut self) -> Result<u64, StorageError> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }
}

fn unexpected_eof() -> StorageError {
    StorageError::Corrupted("unexpected end of snapshot".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Snapshot builder mirroring the wire layout, for test fixtures.
    struct Builder {
        out: Vec<u8>,
    }

    impl Builder {
        fn new() -> Self {
            Self {
                out: b"REDIS0011".to_vec(),
            }
        }

        fn meta(mut self, key: &str, value: &str) -> Self {
            self.out.push(OPCODE_META);
            self.push_string(key);
            self.push_string(value);
            self
        }

        fn section(mut self, index: u8, key_count: u8, expiry_count: u8) -> Self {
            self.out.push(OPCODE_SELECTDB);
            self.out.push(index);
            self.out.push(OPCODE_RESIZE);
            self.out.push(key_count);
            self.out.push(expiry_count);
            self
        }

        fn entry(mut self, key: &str, value: &str, expires_at_ms: Option<i64>) -> Self {
            if let Some(at) = expires_at_ms {
                self.out.push(OPCODE_EXPIRE_MS);
                self.out.extend_from_slice(&(at as u64).to_le_bytes());
            }
            self.out.push(TYPE_STRING);
            self.push_string(key);
            self.push_string(value);
            self
        }

        fn push_string(&mut self, s: &str) {
            assert!(s.len() < 64);
            self.out.push(s.len() as u8);
            self.out.extend_from_slice(s.as_bytes());
        }

        fn finish(mut self) -> Vec<u8> {
            self.out.push(OPCODE_EOF);
            // 8-byte checksum trailer; never validated.
            self.out.extend_from_slice(&[0u8; 8]);
            self.out
        }
    }

    #[test]
    fn empty_snapshot_decodes_to_nothing() {
        let kv = KvStore::new();
        let stats = load_bytes(EMPTY_SNAPSHOT, &kv).unwrap();
        assert_eq!(stats.keys, 0);
        assert!(kv.is_empty());
    }

    #[test]
    fn section_with_plain_keys() {
        let data = Builder::new()
            .meta("redis-ver", "7.2.0")
            .section(0, 2, 0)
            .entry("foo", "bar", None)
            .entry("baz", "qux", None)
            .finish();

        let kv = KvStore::new();
        let stats = load_bytes(&data, &kv).unwrap();
        assert_eq!(stats.keys, 2);
        assert_eq!(stats.expires, 0);
        assert_eq!(kv.get("foo").as_deref(), Some("bar"));
        assert_eq!(kv.get("baz").as_deref(), Some("qux"));
    }

    #[test]
    fn entry_with_future_expiration_survives() {
        let future = crate::storage::unix_ms() + 60_000;
        let data = Builder::new()
            .section(0, 2, 1)
            .entry("keep", "v", Some(future))
            .entry("stale", "v", Some(1))
            .finish();

        let kv = KvStore::new();
        let stats = load_bytes(&data, &kv).unwrap();
        assert_eq!(stats.keys, 2);
        assert_eq!(stats.expires, 2);
        assert_eq!(kv.get("keep").as_deref(), Some("v"));
        // Already past its timestamp: the read observes it as absent.
        assert_eq!(kv.get("stale"), None);
    }

    #[test]
    fn seconds_expiration_is_scaled() {
        let mut data = Builder::new().section(0, 1, 1).out;
        data.push(OPCODE_EXPIRE_SEC);
        data.extend_from_slice(&2_000_000_000u32.to_le_bytes()); // year 2033
        data.push(TYPE_STRING);
        data.push(1);
        data.push(b'k');
        data.push(1);
        data.push(b'v');
        data.push(OPCODE_EOF);

        let kv = KvStore::new();
        load_bytes(&data, &kv).unwrap();
        assert_eq!(kv.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn integer_encoded_values() {
        // 0xC0: one signed byte, 0xC2: 32-bit little-endian.
        let mut data = Builder::new().section(0, 2, 0).out;
        data.push(TYPE_STRING);
        data.push(1);
        data.push(b'a');
        data.extend_from_slice(&[ENC_INT8, 0x40]);
        data.push(TYPE_STRING);
        data.push(1);
        data.push(b'b');
        data.push(ENC_INT32);
        data.extend_from_slice(&1000i32.to_le_bytes());
        data.push(OPCODE_EOF);

        let kv = KvStore::new();
        load_bytes(&data, &kv).unwrap();
        assert_eq!(kv.get("a").as_deref(), Some("64"));
        assert_eq!(kv.get("b").as_deref(), Some("1000"));
    }

    #[test]
    fn fourteen_bit_length() {
        // 0b01xxxxxx header: ((b & 0x3F) << 8) | next.
        let body = "x".repeat(300);
        let mut data = Builder::new().section(0, 1, 0).out;
        data.push(TYPE_STRING);
        data.push(1);
        data.push(b'k');
        data.push(0x40 | (300u16 >> 8) as u8);
        data.push((300u16 & 0xFF) as u8);
        data.extend_from_slice(body.as_bytes());
        data.push(OPCODE_EOF);

        let kv = KvStore::new();
        load_bytes(&data, &kv).unwrap();
        assert_eq!(kv.get("k").unwrap().len(), 300);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let kv = KvStore::new();
        let err = load_bytes(b"NOTRDB123", &kv).unwrap_err();
        assert!(matches!(err, StorageError::BadMagic));
    }

    #[test]
    fn truncated_input_is_rejected() {
        let kv = KvStore::new();
        let err = load_bytes(b"REDIS", &kv).unwrap_err();
        assert!(matches!(err, StorageError::Corrupted(_)));

        let data = Builder::new().section(0, 3, 0).entry("only", "one", None).out;
        let err = load_bytes(&data, &kv).unwrap_err();
        assert!(matches!(err, StorageError::Corrupted(_)));
    }

    #[test]
    fn compressed_strings_are_unsupported() {
        let mut data = Builder::new().section(0, 1, 0).out;
        data.push(TYPE_STRING);
        data.push(1);
        data.push(b'k');
        data.push(ENC_COMPRESSED);
        data.push(OPCODE_EOF);

        let kv = KvStore::new();
        let err = load_bytes(&data, &kv).unwrap_err();
        assert!(matches!(err, StorageError::CompressedString));
    }

    #[test]
    fn load_from_file() {
        let data = Builder::new()
            .meta("redis-ver", "7.2.0")
            .section(0, 1, 0)
            .entry("disk", "loaded", None)
            .finish();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();

        let kv = KvStore::new();
        let stats = load_file(file.path(), &kv).unwrap();
        assert_eq!(stats.keys, 1);
        assert_eq!(kv.get("disk").as_deref(), Some("loaded"));
    }
}
