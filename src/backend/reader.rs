//! Commit log reader with strict corruption detection
//!
//! Used on open to replay every committed batch. A record that fails
//! verification and is followed by more data is fatal: nothing is skipped.
//!
//! The one exception is the tail. An append interrupted by a crash leaves a
//! partial record at the end of the file; that batch never committed, so the
//! reader stops in front of it and reports it as a [`TornTail`].

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use super::errors::{BackendError, BackendResult};
use super::record::{BatchRecord, MIN_RECORD_SIZE};

/// Partial record left at the end of the log by an interrupted append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TornTail {
    /// Offset of the last complete record boundary
    pub offset: u64,
    /// Bytes past that boundary
    pub bytes: u64,
    pub reason: String,
}

/// Sequential reader over the commit log.
pub struct CommitLogReader {
    path: PathBuf,
    reader: BufReader<File>,
    current_offset: u64,
    file_size: u64,
    torn_tail: Option<TornTail>,
}

impl CommitLogReader {
    /// Opens the commit log for reading.
    pub fn open(path: &Path) -> BackendResult<Self> {
        let file = File::open(path).map_err(|e| {
            BackendError::io_error(format!("Failed to open commit log: {}", path.display()), e)
        })?;

        let file_size = file
            .metadata()
            .map_err(|e| BackendError::io_error("Failed to read commit log metadata", e))?
            .len();

        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            current_offset: 0,
            file_size,
            torn_tail: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    /// The partial record the reader stopped in front of, if any.
    pub fn torn_tail(&self) -> Option<&TornTail> {
        self.torn_tail.as_ref()
    }

    fn stop_at_torn_tail(&mut self, reason: String) -> BackendResult<Option<BatchRecord>> {
        self.torn_tail = Some(TornTail {
            offset: self.current_offset,
            bytes: self.file_size - self.current_offset,
            reason,
        });
        // Nothing past a torn tail is read.
        self.file_size = self.current_offset;
        Ok(None)
    }

    /// Reads the next batch.
    ///
    /// - `Ok(Some(record))` if a record was read
    /// - `Ok(None)` at end of file, or in front of a torn tail
    /// - `Err(AERO_BACKEND_CORRUPTION)` on any verification failure of a
    ///   record that is followed by more data
    pub fn read_next(&mut self) -> BackendResult<Option<BatchRecord>> {
        if self.current_offset >= self.file_size {
            return Ok(None);
        }

        let remaining = self.file_size - self.current_offset;
        if remaining < MIN_RECORD_SIZE as u64 {
            return self.stop_at_torn_tail(format!(
                "{} bytes remaining, minimum record size is {}",
                remaining, MIN_RECORD_SIZE
            ));
        }

        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf).map_err(|e| {
            BackendError::corruption_at_offset(
                self.current_offset,
                format!("Failed to read record length: {}", e),
            )
        })?;
        let record_length = u32::from_le_bytes(len_buf) as u64;

        if record_length < MIN_RECORD_SIZE as u64 {
            return Err(BackendError::corruption_at_offset(
                self.current_offset,
                format!("Invalid record length: {}", record_length),
            ));
        }

        if record_length > remaining {
            return self.stop_at_torn_tail(format!(
                "record length {} exceeds remaining file size {}",
                record_length, remaining
            ));
        }

        let mut record_buf = vec![0u8; record_length as usize];
        record_buf[..4].copy_from_slice(&len_buf);
        self.reader.read_exact(&mut record_buf[4..]).map_err(|e| {
            BackendError::corruption_at_offset(
                self.current_offset,
                format!("Failed to read record body: {}", e),
            )
        })?;

        let (record, consumed) = match BatchRecord::deserialize(&record_buf) {
            Ok(decoded) => decoded,
            // The last record may have been extended but not fully written.
            Err(e) if record_length == remaining => {
                return self.stop_at_torn_tail(e.to_string());
            }
            Err(e) => {
                return Err(BackendError::corruption_at_offset(
                    self.current_offset,
                    e.to_string(),
                ))
            }
        };

        self.current_offset += consumed as u64;
        Ok(Some(record))
    }

    /// Reads every remaining batch, stopping in front of a torn tail.
    pub fn read_all(&mut self) -> BackendResult<Vec<BatchRecord>> {
        let mut records = Vec::new();
        while let Some(record) = self.read_next()? {
            records.push(record);
        }
        Ok(records)
    }
}
