//! Batch record format
//!
//! One committed batch transaction is one record:
//!
//! ```text
//! +------------------+
//! | Record Length    | (u32 LE, includes itself and the checksum)
//! +------------------+
//! | Batch Sequence   | (u64 LE)
//! +------------------+
//! | Op Count         | (u32 LE)
//! +------------------+
//! | Ops              | kind (u8) | bucket | key | value (put only)
//! +------------------+   each field length-prefixed with u32 LE
//! | Checksum         | (u32 LE)
//! +------------------+
//! ```
//!
//! The checksum covers every byte before it.

use std::io::{self, Cursor, Read};

use super::checksum::compute_checksum;

const OP_PUT: u8 = 1;
const OP_DELETE: u8 = 2;

/// Smallest possible record: length + sequence + op count + checksum.
pub(crate) const MIN_RECORD_SIZE: usize = 4 + 8 + 4 + 4;

/// A single bucket mutation inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put {
        bucket: String,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        bucket: String,
        key: Vec<u8>,
    },
}

impl BatchOp {
    pub fn bucket(&self) -> &str {
        match self {
            BatchOp::Put { bucket, .. } | BatchOp::Delete { bucket, .. } => bucket,
        }
    }

    pub fn key(&self) -> &[u8] {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key, .. } => key,
        }
    }
}

/// A committed batch as it appears in the commit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRecord {
    pub sequence: u64,
    pub ops: Vec<BatchOp>,
}

/// Every length in a record is a u32; larger fields cannot be encoded.
fn checked_len(len: usize, what: &str) -> io::Result<u32> {
    u32::try_from(len).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} of {} bytes exceeds the record length limit", what, len),
        )
    })
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8], what: &str) -> io::Result<()> {
    buf.extend_from_slice(&checked_len(bytes.len(), what)?.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

fn read_bytes<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

impl BatchRecord {
    /// Serializes a batch without taking ownership of its ops.
    ///
    /// Fails with `InvalidInput` if a field, the op count or the whole
    /// record does not fit its u32 length.
    pub fn encode(sequence: u64, ops: &[BatchOp]) -> io::Result<Vec<u8>> {
        let mut body = Vec::new();
        body.extend_from_slice(&sequence.to_le_bytes());
        body.extend_from_slice(&checked_len(ops.len(), "op count")?.to_le_bytes());

        for op in ops {
            match op {
                BatchOp::Put { bucket, key, value } => {
                    body.push(OP_PUT);
                    put_bytes(&mut body, bucket.as_bytes(), "bucket")?;
                    put_bytes(&mut body, key, "key")?;
                    put_bytes(&mut body, value, "value")?;
                }
                BatchOp::Delete { bucket, key } => {
                    body.push(OP_DELETE);
                    put_bytes(&mut body, bucket.as_bytes(), "bucket")?;
                    put_bytes(&mut body, key, "key")?;
                }
            }
        }

        let total = body.len().saturating_add(8);
        let record_length = checked_len(total, "record")?;

        let mut record = Vec::with_capacity(total);
        record.extend_from_slice(&record_length.to_le_bytes());
        record.extend_from_slice(&body);
        let checksum = compute_checksum(&record);
        record.extend_from_slice(&checksum.to_le_bytes());

        Ok(record)
    }

    pub fn serialize(&self) -> io::Result<Vec<u8>> {
        Self::encode(self.sequence, &self.ops)
    }

    /// Deserializes one record from the front of `data`, verifying its checksum.
    ///
    /// Returns the record and the number of bytes consumed.
    pub fn deserialize(data: &[u8]) -> io::Result<(Self, usize)> {
        if data.len() < MIN_RECORD_SIZE {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "Record too short"));
        }

        let record_length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;

        if record_length < MIN_RECORD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid record length: {}", record_length),
            ));
        }

        if data.len() < record_length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Record truncated: expected {} bytes, got {}",
                    record_length,
                    data.len()
                ),
            ));
        }

        let checksum_offset = record_length - 4;
        let stored = u32::from_le_bytes([
            data[checksum_offset],
            data[checksum_offset + 1],
            data[checksum_offset + 2],
            data[checksum_offset + 3],
        ]);
        let computed = compute_checksum(&data[..checksum_offset]);
        if computed != stored {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Checksum mismatch: computed {:08x}, stored {:08x}",
                    computed, stored
                ),
            ));
        }

        let mut cursor = Cursor::new(&data[4..checksum_offset]);

        let mut seq_buf = [0u8; 8];
        cursor.read_exact(&mut seq_buf)?;
        let sequence = u64::from_le_bytes(seq_buf);

        let mut count_buf = [0u8; 4];
        cursor.read_exact(&mut count_buf)?;
        let op_count = u32::from_le_bytes(count_buf) as usize;

        let mut ops = Vec::with_capacity(op_count.min(1024));
        for _ in 0..op_count {
            let mut kind = [0u8; 1];
            cursor.read_exact(&mut kind)?;
            let bucket = String::from_utf8(read_bytes(&mut cursor)?).map_err(|e| {
                io::Error::new(io::ErrorKind::InvalidData, format!("Invalid bucket name: {}", e))
            })?;
            let key = read_bytes(&mut cursor)?;
            let op = match kind[0] {
                OP_PUT => BatchOp::Put {
                    bucket,
                    key,
                    value: read_bytes(&mut cursor)?,
                },
                OP_DELETE => BatchOp::Delete { bucket, key },
                other => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("Unknown op kind: {}", other),
                    ))
                }
            };
            ops.push(op);
        }

        if cursor.position() as usize != checksum_offset - 4 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Trailing bytes after last op",
            ));
        }

        Ok((Self { sequence, ops }, record_length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BatchRecord {
        BatchRecord {
            sequence: 3,
            ops: vec![
                BatchOp::Put {
                    bucket: "meta".to_string(),
                    key: b"consistent_index".to_vec(),
                    value: 9u64.to_be_bytes().to_vec(),
                },
                BatchOp::Delete {
                    bucket: "key".to_string(),
                    key: b"foo".to_vec(),
                },
            ],
        }
    }

    #[test]
    fn test_roundtrip_consumes_whole_record() {
        let record = sample();
        let bytes = record.serialize().unwrap();
        let (decoded, consumed) = BatchRecord::deserialize(&bytes).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_empty_batch_is_minimum_size() {
        let bytes = BatchRecord::encode(1, &[]).unwrap();
        assert_eq!(bytes.len(), MIN_RECORD_SIZE);
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let mut bytes = sample().serialize().unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        let err = BatchRecord::deserialize(&bytes).unwrap_err();
        assert!(err.to_string().contains("Checksum mismatch"));
    }

    #[test]
    fn test_truncated_record_rejected() {
        let bytes = sample().serialize().unwrap();
        let err = BatchRecord::deserialize(&bytes[..bytes.len() - 3]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_reads_only_first_of_concatenated_records() {
        let mut bytes = sample().serialize().unwrap();
        let first_len = bytes.len();
        bytes.extend_from_slice(&BatchRecord::encode(4, &[]).unwrap());
        let (decoded, consumed) = BatchRecord::deserialize(&bytes).unwrap();
        assert_eq!(decoded.sequence, 3);
        assert_eq!(consumed, first_len);
    }

    #[test]
    fn test_length_limit() {
        assert_eq!(checked_len(0, "key").unwrap(), 0);
        assert_eq!(checked_len(u32::MAX as usize, "value").unwrap(), u32::MAX);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_oversized_length_rejected() {
        let err = checked_len(u32::MAX as usize + 1, "value").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(err.to_string().contains("value of 4294967296 bytes"));
    }
}
