//! CRC32 checksums for batch records
//!
//! Every record is verified on replay. A mismatch halts `Backend::open`
//! unless it is on the last record of the log.

use crc32fast::Hasher;

/// Computes a CRC32 (IEEE) checksum over `data`.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}
