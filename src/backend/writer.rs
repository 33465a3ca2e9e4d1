//! Commit log writer
//!
//! Appends one record per committed batch. With `SyncMode::Fsync` a batch
//! is durable only once `sync_all` has returned; the in-memory state is
//! updated by the caller only after `append` succeeds.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::errors::{BackendError, BackendResult};
use super::record::{BatchOp, BatchRecord};
use crate::fault::{points, FaultInjector};

/// Durability mode for commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// fsync after every batch
    #[default]
    Fsync,
    /// Leave flushing to the OS. Survives process crashes, not power loss.
    NoSync,
}

/// Append-only writer for the commit log.
pub struct CommitLogWriter {
    path: PathBuf,
    file: File,
    current_offset: u64,
    next_sequence: u64,
    sync_mode: SyncMode,
    /// Set when a failed append could not be cut back to `current_offset`.
    poisoned: bool,
}

impl CommitLogWriter {
    /// Opens or creates the commit log at `path`, creating parent
    /// directories if needed.
    ///
    /// `next_sequence` comes from the replay that precedes opening the
    /// writer; the writer never scans the file itself.
    pub fn open(path: &Path, next_sequence: u64, sync_mode: SyncMode) -> BackendResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    BackendError::io_error(
                        format!("Failed to create directory: {}", parent.display()),
                        e,
                    )
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                BackendError::io_error(format!("Failed to open commit log: {}", path.display()), e)
            })?;

        let current_offset = file
            .metadata()
            .map_err(|e| BackendError::io_error("Failed to read commit log metadata", e))?
            .len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            current_offset,
            next_sequence,
            sync_mode,
            poisoned: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    /// True once the file may hold bytes past the last record boundary.
    /// A poisoned writer refuses every append.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Returns the last assigned batch sequence, or 0 if none.
    pub fn last_sequence(&self) -> u64 {
        self.next_sequence.saturating_sub(1)
    }

    /// Appends one batch.
    ///
    /// Returns the sequence number assigned to it. A batch too large for
    /// the record format is rejected before anything is written. Any other
    /// error is FATAL; the file is cut back to the previous record boundary,
    /// and if that fails the writer is poisoned.
    pub fn append(&mut self, ops: &[BatchOp], faults: &FaultInjector) -> BackendResult<u64> {
        if self.poisoned {
            return Err(BackendError::log_poisoned(self.current_offset));
        }

        let sequence = self.next_sequence;
        let serialized = BatchRecord::encode(sequence, ops)
            .map_err(|e| BackendError::record_too_large(sequence, e))?;

        if faults.should_fail(points::BACKEND_COMMIT_BEFORE_WRITE) {
            return Err(BackendError::commit_refused(points::BACKEND_COMMIT_BEFORE_WRITE));
        }

        if let Err(e) = self.file.write_all(&serialized) {
            self.truncate_to_boundary();
            return Err(BackendError::commit_failed(
                format!("Failed to write batch {}", sequence),
                e,
            ));
        }

        if faults.should_fail(points::BACKEND_COMMIT_BEFORE_FSYNC) {
            self.truncate_to_boundary();
            return Err(BackendError::commit_refused(points::BACKEND_COMMIT_BEFORE_FSYNC));
        }

        if self.sync_mode == SyncMode::Fsync {
            if let Err(e) = self.file.sync_all() {
                // Durability of the record is unknown; drop it so replay
                // agrees with the rolled-back state.
                self.truncate_to_boundary();
                return Err(BackendError::commit_failed(
                    format!("fsync failed after batch {}", sequence),
                    e,
                ));
            }
        }

        self.current_offset += serialized.len() as u64;
        self.next_sequence += 1;

        Ok(sequence)
    }

    fn truncate_to_boundary(&mut self) {
        // Later records appended after leftover bytes could never be replayed.
        if self.file.set_len(self.current_offset).is_err() {
            self.poisoned = true;
        }
    }
}
