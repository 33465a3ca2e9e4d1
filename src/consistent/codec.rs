//! Consistent index encoding: 8 bytes, big-endian.

use super::errors::{ConsistentError, ConsistentResult};

/// Encoded length of a consistent index.
pub const INDEX_LEN: usize = 8;

pub fn encode_index(index: u64) -> [u8; INDEX_LEN] {
    index.to_be_bytes()
}

/// Decodes a stored index. Any length other than 8 is corruption.
pub fn decode_index(bytes: &[u8]) -> ConsistentResult<u64> {
    let buf: [u8; INDEX_LEN] = bytes
        .try_into()
        .map_err(|_| ConsistentError::MalformedIndex { len: bytes.len() })?;
    Ok(u64::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_layout() {
        assert_eq!(encode_index(1), [0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(encode_index(0x0102_0304_0506_0708), [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(decode_index(&[0, 0, 0, 0, 0, 0, 1, 0]).unwrap(), 256);
        assert_eq!(decode_index(&encode_index(u64::MAX)).unwrap(), u64::MAX);
    }

    #[test]
    fn test_wrong_length_is_malformed() {
        for len in [0usize, 1, 7, 9, 16] {
            let bytes = vec![0u8; len];
            match decode_index(&bytes) {
                Err(ConsistentError::MalformedIndex { len: got }) => assert_eq!(got, len),
                other => panic!("expected MalformedIndex for {} bytes, got {:?}", len, other),
            }
        }
    }
}
