//! Multi-version key-value store
//!
//! Keeps every change to every key, addressed by revision:
//! - `Revision` - ordered identity of one change
//! - `KeyValue` - stored record of a key as of one revision
//! - `TreeIndex` - in-memory map from keys to their revision history
//! - `KvStore` / `KvTxn` - transactional reads and writes over a backend

mod errors;
mod key_index;
mod key_value;
mod revision;
mod store;

pub use errors::{KvError, KvResult};
pub use key_index::{KeyIndex, TreeIndex};
pub use key_value::KeyValue;
pub use revision::{Revision, REVISION_BYTES_LEN};
pub use store::{EventKind, KvEvent, KvStore, KvTxn, RangeResult, KEY_BUCKET};
