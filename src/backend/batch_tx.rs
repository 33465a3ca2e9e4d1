//! Backend and its batch transaction
//!
//! The backend holds every bucket in memory and persists changes through
//! the commit log. A single mutex guards both; [`BatchTx`] is the guard.
//! Holding a `BatchTx` is the only way to reach the lock-elided `unsafe_*`
//! primitives, so they cannot be called without the lock held.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::errors::{BackendError, BackendResult};
use super::reader::{CommitLogReader, TornTail};
use super::record::BatchOp;
use super::writer::{CommitLogWriter, SyncMode};
use crate::fault::FaultInjector;
use crate::observability::{log_event_with_fields, Event};

type Bucket = BTreeMap<Vec<u8>, Vec<u8>>;

/// Backend open options.
#[derive(Debug, Clone, Default)]
pub struct BackendConfig {
    pub sync_mode: SyncMode,
    pub faults: FaultInjector,
}

struct BackendState {
    buckets: BTreeMap<String, Bucket>,
    log: CommitLogWriter,
}

impl BackendState {
    fn apply(&mut self, op: BatchOp) -> Option<Vec<u8>> {
        match op {
            BatchOp::Put { bucket, key, value } => {
                self.buckets.entry(bucket).or_default().insert(key, value)
            }
            BatchOp::Delete { bucket, key } => {
                self.buckets.get_mut(&bucket).and_then(|b| b.remove(&key))
            }
        }
    }
}

fn truncate_torn_tail(path: &Path, tail: &TornTail) -> BackendResult<()> {
    let file = OpenOptions::new().write(true).open(path).map_err(|e| {
        BackendError::io_error(format!("Failed to open commit log: {}", path.display()), e)
    })?;
    file.set_len(tail.offset)
        .and_then(|_| file.sync_all())
        .map_err(|e| BackendError::io_error("Failed to truncate torn commit log tail", e))?;

    log_event_with_fields(
        Event::BackendTailTruncated,
        &[
            ("path", path.display().to_string().as_str()),
            ("byte_offset", tail.offset.to_string().as_str()),
            ("bytes", tail.bytes.to_string().as_str()),
            ("reason", tail.reason.as_str()),
        ],
    );
    Ok(())
}

/// Bucketed byte store with one exclusive batch lock.
pub struct Backend {
    path: PathBuf,
    state: Mutex<BackendState>,
    faults: FaultInjector,
}

impl Backend {
    /// Opens the backend at `path`, creating the file if absent, and replays
    /// every committed batch.
    ///
    /// A partial record left at the end of the log by an interrupted append
    /// is cut off, so the file ends on the last committed batch again.
    ///
    /// # Errors
    ///
    /// `AERO_BACKEND_CORRUPTION` if a record followed by more data fails
    /// verification, or batch sequences do not increase.
    pub fn open(path: impl AsRef<Path>, config: BackendConfig) -> BackendResult<Self> {
        let path = path.as_ref();
        let mut buckets: BTreeMap<String, Bucket> = BTreeMap::new();
        let mut last_sequence = 0u64;
        let mut batches = 0usize;

        if path.exists() {
            let mut reader = CommitLogReader::open(path)?;
            loop {
                let record = match reader.read_next() {
                    Ok(Some(record)) => record,
                    Ok(None) => break,
                    Err(e) => {
                        log_event_with_fields(
                            Event::BackendCorruption,
                            &[
                                ("path", path.display().to_string().as_str()),
                                ("error", e.to_string().as_str()),
                            ],
                        );
                        return Err(e);
                    }
                };
                if record.sequence <= last_sequence {
                    let e = BackendError::corruption_at_offset(
                        reader.current_offset(),
                        format!(
                            "Batch sequence {} does not follow {}",
                            record.sequence, last_sequence
                        ),
                    );
                    log_event_with_fields(
                        Event::BackendCorruption,
                        &[
                            ("path", path.display().to_string().as_str()),
                            ("error", e.to_string().as_str()),
                        ],
                    );
                    return Err(e);
                }
                last_sequence = record.sequence;
                batches += 1;
                for op in record.ops {
                    match op {
                        BatchOp::Put { bucket, key, value } => {
                            buckets.entry(bucket).or_default().insert(key, value);
                        }
                        BatchOp::Delete { bucket, key } => {
                            if let Some(b) = buckets.get_mut(&bucket) {
                                b.remove(&key);
                            }
                        }
                    }
                }
            }

            if let Some(tail) = reader.torn_tail() {
                truncate_torn_tail(path, tail)?;
            }
        }

        let log = CommitLogWriter::open(path, last_sequence + 1, config.sync_mode)?;

        log_event_with_fields(
            Event::BackendOpen,
            &[
                ("path", path.display().to_string().as_str()),
                ("batches", batches.to_string().as_str()),
                ("last_sequence", last_sequence.to_string().as_str()),
            ],
        );

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(BackendState { buckets, log }),
            faults: config.faults,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Acquires the batch lock. Blocks until no other `BatchTx` is alive.
    pub fn batch_tx(&self) -> BackendResult<BatchTx<'_>> {
        let state = self.state.lock().map_err(|_| BackendError::lock_poisoned())?;
        Ok(BatchTx {
            state,
            faults: &self.faults,
            pending: Vec::new(),
            undo: Vec::new(),
            finished: false,
        })
    }
}

/// Proof that the batch lock is held, plus the uncommitted writes made
/// under it.
///
/// Writes are visible to reads through the same `BatchTx` immediately.
/// [`BatchTx::commit`] makes them durable; dropping the `BatchTx` without
/// committing undoes them.
pub struct BatchTx<'a> {
    state: MutexGuard<'a, BackendState>,
    faults: &'a FaultInjector,
    pending: Vec<BatchOp>,
    undo: Vec<(String, Vec<u8>, Option<Vec<u8>>)>,
    finished: bool,
}

impl<'a> BatchTx<'a> {
    /// Writes `value` under `key` in `bucket`, creating the bucket if needed.
    pub fn unsafe_put(&mut self, bucket: &str, key: &[u8], value: &[u8]) {
        let previous = self.state.apply(BatchOp::Put {
            bucket: bucket.to_string(),
            key: key.to_vec(),
            value: value.to_vec(),
        });
        self.undo.push((bucket.to_string(), key.to_vec(), previous));
        self.pending.push(BatchOp::Put {
            bucket: bucket.to_string(),
            key: key.to_vec(),
            value: value.to_vec(),
        });
    }

    /// Removes `key` from `bucket`. Returns whether it existed.
    pub fn unsafe_delete(&mut self, bucket: &str, key: &[u8]) -> bool {
        let previous = self.state.apply(BatchOp::Delete {
            bucket: bucket.to_string(),
            key: key.to_vec(),
        });
        let existed = previous.is_some();
        self.undo.push((bucket.to_string(), key.to_vec(), previous));
        self.pending.push(BatchOp::Delete {
            bucket: bucket.to_string(),
            key: key.to_vec(),
        });
        existed
    }

    /// Reads keys from `bucket`.
    ///
    /// With `end = None` only `key` itself is looked up; otherwise the half
    /// open range `[key, end)` is scanned in byte order. A `limit` of 0
    /// means unlimited.
    pub fn unsafe_range(
        &self,
        bucket: &str,
        key: &[u8],
        end: Option<&[u8]>,
        limit: usize,
    ) -> (Vec<Vec<u8>>, Vec<Vec<u8>>) {
        let mut keys = Vec::new();
        let mut values = Vec::new();

        let Some(b) = self.state.buckets.get(bucket) else {
            return (keys, values);
        };

        match end {
            None => {
                if let Some(v) = b.get(key) {
                    keys.push(key.to_vec());
                    values.push(v.clone());
                }
            }
            Some(end) => {
                if end <= key {
                    return (keys, values);
                }
                let range = b.range::<[u8], _>((Bound::Included(key), Bound::Excluded(end)));
                for (k, v) in range {
                    if limit > 0 && keys.len() >= limit {
                        break;
                    }
                    keys.push(k.clone());
                    values.push(v.clone());
                }
            }
        }

        (keys, values)
    }

    /// Visits every entry of `bucket` in key order, stopping at the first error.
    pub fn unsafe_for_each<E, F>(&self, bucket: &str, mut f: F) -> Result<(), E>
    where
        F: FnMut(&[u8], &[u8]) -> Result<(), E>,
    {
        if let Some(b) = self.state.buckets.get(bucket) {
            for (k, v) in b {
                f(k, v)?;
            }
        }
        Ok(())
    }

    /// Number of uncommitted operations.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Makes every pending write durable and releases the lock.
    ///
    /// Returns the batch sequence, or `None` if there was nothing to write.
    ///
    /// # Errors
    ///
    /// `AERO_BACKEND_COMMIT_FAILED` (FATAL). The in-memory buckets are rolled
    /// back to their state before this `BatchTx` began.
    pub fn commit(mut self) -> BackendResult<Option<u64>> {
        self.finished = true;
        if self.pending.is_empty() {
            return Ok(None);
        }

        let pending = std::mem::take(&mut self.pending);
        let faults = self.faults;
        match self.state.log.append(&pending, faults) {
            Ok(sequence) => {
                self.undo.clear();
                log_event_with_fields(
                    Event::BackendCommit,
                    &[
                        ("ops", pending.len().to_string().as_str()),
                        ("sequence", sequence.to_string().as_str()),
                    ],
                );
                Ok(Some(sequence))
            }
            Err(e) => {
                self.rollback();
                let event = if e.is_fatal() {
                    Event::BackendCommitFailed
                } else {
                    Event::BackendRollback
                };
                log_event_with_fields(
                    event,
                    &[
                        ("error", e.to_string().as_str()),
                        ("ops", pending.len().to_string().as_str()),
                    ],
                );
                Err(e)
            }
        }
    }

    fn rollback(&mut self) {
        while let Some((bucket, key, previous)) = self.undo.pop() {
            match previous {
                Some(value) => {
                    self.state.apply(BatchOp::Put { bucket, key, value });
                }
                None => {
                    self.state.apply(BatchOp::Delete { bucket, key });
                }
            }
        }
        self.pending.clear();
    }
}

impl Drop for BatchTx<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if !self.pending.is_empty() {
            log_event_with_fields(
                Event::BackendRollback,
                &[("ops", self.pending.len().to_string().as_str())],
            );
        }
        self.rollback();
    }
}
