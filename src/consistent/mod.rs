//! # Consistent Index
//!
//! Pairs every store transaction with the replicated-log position that
//! produced it, so that after a restart the log can resume from exactly
//! the last applied entry.
//!
//! - **Codec**: 8-byte big-endian index encoding
//! - **Getter**: `ConsistentIndexGetter`, the source of the index
//! - **Store**: `ConsistentStore`, which stamps the index at transaction begin
//!
//! Errors answering `is_fatal() == true` must be escalated (restart), never
//! retried.

mod codec;
mod errors;
mod getter;
mod store;

pub use codec::{decode_index, encode_index, INDEX_LEN};
pub use errors::{ConsistentError, ConsistentResult};
pub use getter::ConsistentIndexGetter;
pub use store::{ConsistentStore, ConsistentTxn, CONSISTENT_INDEX_KEY, META_BUCKET};
