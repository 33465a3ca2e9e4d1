//! Stored key-value record
//!
//! Value layout in the `key` bucket:
//!
//! ```text
//! | key (u32 LE len + bytes) | value (u32 LE len + bytes) |
//! | create_revision (i64 LE) | mod_revision (i64 LE) | version (i64 LE) |
//! | flags (u8, bit 0 = tombstone) |
//! ```

use std::io::{self, Cursor, Read};

use super::errors::{KvError, KvResult};

const FLAG_TOMBSTONE: u8 = 0x01;

/// A key-value pair as of one revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Revision of the put that created this generation of the key
    pub create_revision: i64,
    /// Revision of the last change to the key
    pub mod_revision: i64,
    /// Number of puts since creation; reset by delete
    pub version: i64,
}

impl KeyValue {
    /// Record written by a delete: only key and mod revision are meaningful.
    pub fn tombstone(key: &[u8], mod_revision: i64) -> Self {
        Self {
            key: key.to_vec(),
            value: Vec::new(),
            create_revision: 0,
            mod_revision,
            version: 0,
        }
    }

    pub fn encode(&self, tombstone: bool) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.key.len() + 4 + self.value.len() + 25);
        buf.extend_from_slice(&(self.key.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&(self.value.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.value);
        buf.extend_from_slice(&self.create_revision.to_le_bytes());
        buf.extend_from_slice(&self.mod_revision.to_le_bytes());
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.push(if tombstone { FLAG_TOMBSTONE } else { 0 });
        buf
    }

    /// Decodes a stored record, returning it and its tombstone flag.
    pub fn decode(bytes: &[u8]) -> KvResult<(Self, bool)> {
        Self::decode_inner(bytes)
            .map_err(|e| KvError::Corruption(format!("Invalid key-value record: {}", e)))
    }

    fn decode_inner(bytes: &[u8]) -> io::Result<(Self, bool)> {
        fn read_bytes(cursor: &mut Cursor<&[u8]>) -> io::Result<Vec<u8>> {
            let mut len_buf = [0u8; 4];
            cursor.read_exact(&mut len_buf)?;
            let len = u32::from_le_bytes(len_buf) as usize;
            let remaining = cursor.get_ref().len() - cursor.position() as usize;
            if len > remaining {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "length past end"));
            }
            let mut buf = vec![0u8; len];
            cursor.read_exact(&mut buf)?;
            Ok(buf)
        }

        fn read_i64(cursor: &mut Cursor<&[u8]>) -> io::Result<i64> {
            let mut buf = [0u8; 8];
            cursor.read_exact(&mut buf)?;
            Ok(i64::from_le_bytes(buf))
        }

        let mut cursor = Cursor::new(bytes);
        let key = read_bytes(&mut cursor)?;
        let value = read_bytes(&mut cursor)?;
        let create_revision = read_i64(&mut cursor)?;
        let mod_revision = read_i64(&mut cursor)?;
        let version = read_i64(&mut cursor)?;
        let mut flags = [0u8; 1];
        cursor.read_exact(&mut flags)?;

        if cursor.position() as usize != bytes.len() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "trailing bytes"));
        }

        Ok((
            Self {
                key,
                value,
                create_revision,
                mod_revision,
                version,
            },
            flags[0] & FLAG_TOMBSTONE != 0,
        ))
    }
}
