//! Backend subsystem for aerokv
//!
//! A bucketed byte store: named buckets of ordered byte keys, held in
//! memory and made durable through an append-only commit log of batch
//! records. One exclusive lock serializes every batch transaction.
//!
//! # Design Principles
//!
//! - A batch is durable only after its record is appended (and fsynced)
//! - Checksum on every record, verified on replay
//! - Halt on corruption: no committed record is skipped or repaired
//! - A partial record at the tail never committed and is cut off
//! - Lock-elided primitives live on the lock guard itself

mod batch_tx;
mod checksum;
mod errors;
mod reader;
mod record;
mod writer;

pub use batch_tx::{Backend, BackendConfig, BatchTx};
pub use checksum::compute_checksum;
pub use errors::{BackendError, BackendErrorCode, BackendResult, Severity};
pub use reader::{CommitLogReader, TornTail};
pub use record::{BatchOp, BatchRecord};
pub use writer::{CommitLogWriter, SyncMode};
