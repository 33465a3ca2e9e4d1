//! Consistent-index-backed store
//!
//! Every transaction stamps the getter's current index into the metadata
//! bucket as its first write, through the same locked batch as the data it
//! goes on to change. Index and data therefore commit, or roll back, as one
//! batch record. The stamp reflects the entry being applied when the
//! transaction began, not the last entry known to be fully applied.
//!
//! ```text
//! txn_begin:  lock -> read getter -> unsafe_put(meta, consistent_index)
//! put/delete: versioned changes in the same batch
//! txn_end:    commit (append + fsync) -> notify watchers -> unlock
//! ```

use std::path::Path;

use super::codec::{decode_index, encode_index};
use super::errors::{ConsistentError, ConsistentResult};
use super::getter::ConsistentIndexGetter;
use crate::backend::BackendConfig;
use crate::config::Config;
use crate::mvcc::{KvEvent, RangeResult};
use crate::observability::{log_event_with_fields, Event};
use crate::watch::{WatchableStore, WatchableTxn, Watcher};

/// Bucket reserved for store bookkeeping, disjoint from user keys.
pub const META_BUCKET: &str = "meta";

/// Key of the consistent index inside [`META_BUCKET`].
pub const CONSISTENT_INDEX_KEY: &[u8] = b"consistent_index";

/// Logs fatal errors before they are handed to the caller.
fn escalate(operation: &str, err: ConsistentError) -> ConsistentError {
    if err.is_fatal() {
        log_event_with_fields(
            Event::TxnFatal,
            &[
                ("error", err.to_string().as_str()),
                ("operation", operation),
            ],
        );
    }
    err
}

pub struct ConsistentStore<G> {
    store: WatchableStore,
    getter: G,
}

impl<G: ConsistentIndexGetter> ConsistentStore<G> {
    /// Opens (or creates) the store at `path` with default backend settings.
    pub fn new(path: impl AsRef<Path>, getter: G) -> ConsistentResult<Self> {
        Self::open_with(path, BackendConfig::default(), getter)
    }

    pub fn open_with_config(config: &Config, getter: G) -> ConsistentResult<Self> {
        config.validate()?;
        Self::open_with(config.db_path(), config.backend_config()?, getter)
    }

    /// Opens the store and checks that the stored index decodes.
    pub fn open_with(
        path: impl AsRef<Path>,
        backend: BackendConfig,
        getter: G,
    ) -> ConsistentResult<Self> {
        let store = WatchableStore::open(path, backend)?;
        let this = Self { store, getter };

        let index = this.consistent_index()?;
        let revision = this.current_revision()?;
        log_event_with_fields(
            Event::IndexRecovered,
            &[
                ("consistent_index", index.to_string().as_str()),
                ("revision", revision.to_string().as_str()),
            ],
        );

        Ok(this)
    }

    pub fn getter(&self) -> &G {
        &self.getter
    }

    /// The watchable store underneath.
    pub fn inner(&self) -> &WatchableStore {
        &self.store
    }

    /// Begins a transaction and stamps the current consistent index.
    ///
    /// Blocks while another transaction is open.
    pub fn txn_begin(&self) -> ConsistentResult<ConsistentTxn<'_>> {
        let mut txn = self
            .store
            .txn_begin()
            .map_err(|e| escalate("txn_begin", e.into()))?;

        let index = self.getter.consistent_index();
        txn.backend_tx()
            .unsafe_put(META_BUCKET, CONSISTENT_INDEX_KEY, &encode_index(index));

        log_event_with_fields(
            Event::IndexStamped,
            &[
                ("consistent_index", index.to_string().as_str()),
                ("txn_id", txn.id().to_string().as_str()),
            ],
        );

        Ok(ConsistentTxn { txn, index })
    }

    /// Commits `txn`, making its stamp and changes durable together.
    ///
    /// # Errors
    ///
    /// A commit failure is FATAL: nothing of the transaction is kept, and
    /// the caller must not retry against this store.
    pub fn txn_end(&self, txn: ConsistentTxn<'_>) -> ConsistentResult<()> {
        txn.end().map(|_| ())
    }

    /// Puts `key = value` in a transaction of its own. Returns its revision.
    pub fn put(&self, key: &[u8], value: &[u8]) -> ConsistentResult<i64> {
        let mut txn = self.txn_begin()?;
        let rev = txn.put(key, value)?;
        self.txn_end(txn)?;
        Ok(rev)
    }

    /// Deletes `key` (or `[key, end)`) in a transaction of its own.
    ///
    /// Returns the number of keys deleted and the resulting revision. The
    /// index is stamped even when nothing matched.
    pub fn delete_range(&self, key: &[u8], end: Option<&[u8]>) -> ConsistentResult<(i64, i64)> {
        let mut txn = self.txn_begin()?;
        let result = txn.delete_range(key, end)?;
        self.txn_end(txn)?;
        Ok(result)
    }

    /// Index stamped by the last committed transaction; 0 if none ever committed.
    ///
    /// Takes the transaction lock itself, so it must not be called from a
    /// thread holding an open transaction.
    pub fn consistent_index(&self) -> ConsistentResult<u64> {
        let values = {
            let tx = self
                .store
                .kv()
                .backend()
                .batch_tx()
                .map_err(|e| escalate("consistent_index", e.into()))?;
            tx.unsafe_range(META_BUCKET, CONSISTENT_INDEX_KEY, None, 0).1
        };

        match values.first() {
            None => Ok(0),
            Some(bytes) => decode_index(bytes).map_err(|e| {
                log_event_with_fields(
                    Event::IndexMalformed,
                    &[("len", bytes.len().to_string().as_str())],
                );
                e
            }),
        }
    }

    pub fn current_revision(&self) -> ConsistentResult<i64> {
        Ok(self.store.current_revision()?)
    }

    pub fn range(
        &self,
        key: &[u8],
        end: Option<&[u8]>,
        limit: usize,
        at_rev: i64,
    ) -> ConsistentResult<RangeResult> {
        Ok(self.store.range(key, end, limit, at_rev)?)
    }

    pub fn watch(&self, key: &[u8], end: Option<&[u8]>) -> Watcher {
        self.store.watch(key, end)
    }

    pub fn cancel(&self, watch_id: u64) -> bool {
        self.store.cancel(watch_id)
    }
}

/// An open, index-stamped transaction. Single use: ended by
/// [`ConsistentStore::txn_end`], rolled back (stamp included) if dropped.
pub struct ConsistentTxn<'a> {
    txn: WatchableTxn<'a>,
    index: u64,
}

impl ConsistentTxn<'_> {
    pub fn id(&self) -> u64 {
        self.txn.id()
    }

    /// Index stamped at begin.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> ConsistentResult<i64> {
        self.txn.put(key, value).map_err(|e| escalate("put", e.into()))
    }

    pub fn delete_range(&mut self, key: &[u8], end: Option<&[u8]>) -> ConsistentResult<(i64, i64)> {
        self.txn
            .delete_range(key, end)
            .map_err(|e| escalate("delete_range", e.into()))
    }

    pub fn range(
        &self,
        key: &[u8],
        end: Option<&[u8]>,
        limit: usize,
        at_rev: i64,
    ) -> ConsistentResult<RangeResult> {
        Ok(self.txn.range(key, end, limit, at_rev)?)
    }

    fn end(self) -> ConsistentResult<Vec<KvEvent>> {
        self.txn.end().map_err(|e| escalate("txn_end", e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::points;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn open(dir: &TempDir, applied: &Arc<AtomicU64>) -> ConsistentStore<Arc<AtomicU64>> {
        ConsistentStore::new(dir.path().join("aerokv.db"), applied.clone()).unwrap()
    }

    #[test]
    fn test_stamp_visible_after_commit_only() {
        let dir = TempDir::new().unwrap();
        let applied = Arc::new(AtomicU64::new(4));
        let store = open(&dir, &applied);

        let mut txn = store.txn_begin().unwrap();
        assert_eq!(txn.index(), 4);
        txn.put(b"k", b"v").unwrap();
        drop(txn);
        assert_eq!(store.consistent_index().unwrap(), 0);

        let txn = store.txn_begin().unwrap();
        store.txn_end(txn).unwrap();
        assert_eq!(store.consistent_index().unwrap(), 4);
    }

    #[test]
    fn test_put_in_explicit_txn() {
        let dir = TempDir::new().unwrap();
        let applied = Arc::new(AtomicU64::new(10));
        let store = open(&dir, &applied);

        let mut txn = store.txn_begin().unwrap();
        assert_eq!(txn.put(b"a", b"1").unwrap(), 1);
        assert_eq!(txn.put(b"b", b"2").unwrap(), 1);
        assert_eq!(txn.range(b"a", Some(b"c"), 0, 0).unwrap().count, 2);
        applied.store(11, Ordering::SeqCst);
        store.txn_end(txn).unwrap();

        assert_eq!(store.consistent_index().unwrap(), 10);
        assert_eq!(store.current_revision().unwrap(), 1);
    }

    #[test]
    fn test_stamp_does_not_touch_user_keys() {
        let dir = TempDir::new().unwrap();
        let applied = Arc::new(AtomicU64::new(1));
        let store = open(&dir, &applied);
        store.put(b"consistent_index", b"user").unwrap();

        let r = store.range(b"consistent_index", None, 0, 0).unwrap();
        assert_eq!(r.kvs[0].value, b"user");
        assert_eq!(store.consistent_index().unwrap(), 1);
    }

    #[test]
    fn test_empty_key_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let applied = Arc::new(AtomicU64::new(2));
        let store = open(&dir, &applied);

        let err = store.put(b"", b"v").unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(store.consistent_index().unwrap(), 0);
    }

    #[test]
    fn test_refused_commit_is_fatal() {
        let dir = TempDir::new().unwrap();
        let applied = Arc::new(AtomicU64::new(5));
        let store = open(&dir, &applied);
        store
            .inner()
            .kv()
            .backend()
            .faults()
            .arm(points::BACKEND_COMMIT_BEFORE_WRITE);

        let err = store.put(b"k", b"v").unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(store.consistent_index().unwrap(), 0);
        assert_eq!(store.current_revision().unwrap(), 0);
    }

    #[test]
    fn test_malformed_stored_index() {
        let dir = TempDir::new().unwrap();
        let applied = Arc::new(AtomicU64::new(1));
        let store = open(&dir, &applied);
        {
            let mut tx = store.inner().kv().backend().batch_tx().unwrap();
            tx.unsafe_put(META_BUCKET, CONSISTENT_INDEX_KEY, &[1, 2, 3]);
            tx.commit().unwrap();
        }

        let err = store.consistent_index().unwrap_err();
        assert!(matches!(err, ConsistentError::MalformedIndex { len: 3 }));
        assert!(err.is_fatal());
        drop(store);

        let reopened = ConsistentStore::new(dir.path().join("aerokv.db"), applied.clone());
        assert!(matches!(
            reopened.err(),
            Some(ConsistentError::MalformedIndex { len: 3 })
        ));
    }
}
