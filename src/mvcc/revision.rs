//! Revision - ordered identity of one change
//!
//! `main` is the store revision a transaction commits at; `sub` orders the
//! changes within that transaction. On disk a revision is the 17-byte key
//! `main (u64 BE) | '_' | sub (u64 BE)`, so byte order equals revision order.

use super::errors::{KvError, KvResult};

/// Encoded length of a revision key.
pub const REVISION_BYTES_LEN: usize = 8 + 1 + 8;

const SEPARATOR: u8 = b'_';

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Revision {
    pub main: i64,
    pub sub: i64,
}

impl Revision {
    #[inline]
    pub fn new(main: i64, sub: i64) -> Self {
        Self { main, sub }
    }

    pub fn to_bytes(&self) -> [u8; REVISION_BYTES_LEN] {
        let mut out = [0u8; REVISION_BYTES_LEN];
        out[..8].copy_from_slice(&(self.main as u64).to_be_bytes());
        out[8] = SEPARATOR;
        out[9..].copy_from_slice(&(self.sub as u64).to_be_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> KvResult<Self> {
        if bytes.len() != REVISION_BYTES_LEN || bytes[8] != SEPARATOR {
            return Err(KvError::Corruption(format!(
                "Invalid revision key of {} bytes",
                bytes.len()
            )));
        }
        let mut main = [0u8; 8];
        let mut sub = [0u8; 8];
        main.copy_from_slice(&bytes[..8]);
        sub.copy_from_slice(&bytes[9..]);
        Ok(Self {
            main: u64::from_be_bytes(main) as i64,
            sub: u64::from_be_bytes(sub) as i64,
        })
    }
}
