//! Versioned key-value store
//!
//! Every transaction that changes anything commits at exactly one new main
//! revision (`current + 1`); the changes inside it are ordered by sub
//! revision. Each change is stored in the `key` bucket under its revision,
//! and the in-memory [`TreeIndex`] maps user keys to those revisions.
//!
//! Lock order is always backend lock, then index lock.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::errors::{KvError, KvResult};
use super::key_index::TreeIndex;
use super::key_value::KeyValue;
use super::revision::Revision;
use crate::backend::{Backend, BackendConfig, BatchTx};
use crate::observability::{log_event_with_fields, Event};

/// Bucket holding every key-value change, keyed by revision.
pub const KEY_BUCKET: &str = "key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Put,
    Delete,
}

/// One committed change, as seen by watchers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEvent {
    pub kind: EventKind,
    pub kv: KeyValue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeResult {
    /// Matching key-values, in key order, truncated to the limit
    pub kvs: Vec<KeyValue>,
    /// Store revision the read was served at
    pub revision: i64,
    /// Number of matching keys before the limit was applied
    pub count: usize,
}

struct KvIndex {
    tree: TreeIndex,
    current_rev: i64,
}

/// Versioned key-value store over a [`Backend`].
pub struct KvStore {
    backend: Backend,
    index: Mutex<KvIndex>,
    next_txn_id: AtomicU64,
}

impl KvStore {
    /// Opens the backend at `path` and rebuilds the key index from it.
    pub fn open(path: impl AsRef<Path>, config: BackendConfig) -> KvResult<Self> {
        let backend = Backend::open(path, config)?;
        Self::from_backend(backend)
    }

    pub fn from_backend(backend: Backend) -> KvResult<Self> {
        let (tree, current_rev) = {
            let tx = backend.batch_tx()?;
            restore(&tx)?
        };

        log_event_with_fields(
            Event::StoreRestored,
            &[
                ("current_revision", current_rev.to_string().as_str()),
                ("keys", tree.len().to_string().as_str()),
            ],
        );

        Ok(Self {
            backend,
            index: Mutex::new(KvIndex { tree, current_rev }),
            next_txn_id: AtomicU64::new(1),
        })
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Begins a transaction. Blocks while another transaction is open.
    pub fn txn_begin(&self) -> KvResult<KvTxn<'_>> {
        let tx = self.backend.batch_tx()?;
        let guard = self.index.lock().map_err(|_| KvError::IndexPoisoned)?;
        Ok(KvTxn {
            id: self.next_txn_id.fetch_add(1, Ordering::Relaxed),
            index: IndexTxn {
                guard,
                touched: Vec::new(),
                committed: false,
            },
            tx,
            changes: Vec::new(),
            next_sub: 0,
        })
    }

    /// Last committed revision; 0 for a store that never committed a change.
    pub fn current_revision(&self) -> KvResult<i64> {
        let index = self.index.lock().map_err(|_| KvError::IndexPoisoned)?;
        Ok(index.current_rev)
    }

    /// Reads in a transaction of its own.
    pub fn range(
        &self,
        key: &[u8],
        end: Option<&[u8]>,
        limit: usize,
        at_rev: i64,
    ) -> KvResult<RangeResult> {
        let txn = self.txn_begin()?;
        txn.range(key, end, limit, at_rev)
    }
}

fn restore(tx: &BatchTx<'_>) -> KvResult<(TreeIndex, i64)> {
    let mut tree = TreeIndex::new();
    let mut current_rev = 0i64;

    tx.unsafe_for_each(KEY_BUCKET, |rev_bytes, value| {
        let rev = Revision::from_bytes(rev_bytes)?;
        let (kv, tombstone) = KeyValue::decode(value)?;
        if tombstone {
            tree.tombstone(&kv.key, rev);
        } else {
            tree.put(&kv.key, rev);
        }
        current_rev = current_rev.max(rev.main);
        Ok::<(), KvError>(())
    })?;

    Ok((tree, current_rev))
}

/// Index lock plus the keys changed under it, reverted unless committed.
struct IndexTxn<'a> {
    guard: MutexGuard<'a, KvIndex>,
    touched: Vec<Vec<u8>>,
    committed: bool,
}

impl Drop for IndexTxn<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        while let Some(key) = self.touched.pop() {
            self.guard.tree.revert_latest(&key);
        }
    }
}

/// An open transaction.
///
/// Holds the store's locks for its whole life. [`KvTxn::end`] commits and
/// consumes it; dropping it without `end` rolls everything back.
pub struct KvTxn<'a> {
    id: u64,
    // Declared before `tx` so the index is reverted and unlocked first.
    index: IndexTxn<'a>,
    tx: BatchTx<'a>,
    changes: Vec<KvEvent>,
    next_sub: i64,
}

impl<'a> KvTxn<'a> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Last committed revision, not counting this transaction.
    pub fn current_revision(&self) -> i64 {
        self.index.guard.current_rev
    }

    /// Revision this transaction commits at if it changes anything.
    fn pending_revision(&self) -> i64 {
        self.index.guard.current_rev + 1
    }

    /// Newest revision visible inside this transaction.
    fn visible_revision(&self) -> i64 {
        if self.changes.is_empty() {
            self.current_revision()
        } else {
            self.pending_revision()
        }
    }

    /// Lock-held access to the backend, for buckets outside the key space.
    pub fn backend_tx(&mut self) -> &mut BatchTx<'a> {
        &mut self.tx
    }

    /// Writes `key = value`. Returns the revision the change commits at.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> KvResult<i64> {
        if key.is_empty() {
            return Err(KvError::EmptyKey);
        }

        let main = self.pending_revision();
        let rev = Revision::new(main, self.next_sub);

        let (create_revision, version) = match self.live_kv(key, main)? {
            Some(prev) => (prev.create_revision, prev.version + 1),
            None => (main, 1),
        };

        let kv = KeyValue {
            key: key.to_vec(),
            value: value.to_vec(),
            create_revision,
            mod_revision: main,
            version,
        };

        self.tx.unsafe_put(KEY_BUCKET, &rev.to_bytes(), &kv.encode(false));
        self.index.guard.tree.put(key, rev);
        self.index.touched.push(key.to_vec());
        self.next_sub += 1;
        self.changes.push(KvEvent {
            kind: EventKind::Put,
            kv,
        });

        Ok(main)
    }

    /// Deletes `key`, or every live key in `[key, end)`.
    ///
    /// Returns the number of keys deleted and the revision visible after the
    /// call: unchanged if nothing in this transaction has changed yet.
    pub fn delete_range(&mut self, key: &[u8], end: Option<&[u8]>) -> KvResult<(i64, i64)> {
        if key.is_empty() {
            return Err(KvError::EmptyKey);
        }

        let main = self.pending_revision();
        let targets = self.index.guard.tree.live_range(key, end, main);

        for (k, _) in &targets {
            let rev = Revision::new(main, self.next_sub);
            let kv = KeyValue::tombstone(k, main);
            self.tx.unsafe_put(KEY_BUCKET, &rev.to_bytes(), &kv.encode(true));
            self.index.guard.tree.tombstone(k, rev);
            self.index.touched.push(k.clone());
            self.next_sub += 1;
            self.changes.push(KvEvent {
                kind: EventKind::Delete,
                kv,
            });
        }

        Ok((targets.len() as i64, self.visible_revision()))
    }

    /// Reads live keys as of `at_rev` (0 = newest, including this
    /// transaction's own writes). A `limit` of 0 means unlimited.
    pub fn range(
        &self,
        key: &[u8],
        end: Option<&[u8]>,
        limit: usize,
        at_rev: i64,
    ) -> KvResult<RangeResult> {
        if key.is_empty() {
            return Err(KvError::EmptyKey);
        }

        let latest = self.visible_revision();
        let at = if at_rev <= 0 { latest } else { at_rev };
        if at > latest {
            return Err(KvError::FutureRevision {
                requested: at,
                current: latest,
            });
        }

        let live = self.index.guard.tree.live_range(key, end, at);
        let take = if limit == 0 { live.len() } else { limit };
        let mut kvs = Vec::with_capacity(take.min(live.len()));
        for (_, rev) in live.iter().take(take) {
            kvs.push(self.load_kv(*rev)?);
        }

        Ok(RangeResult {
            kvs,
            revision: latest,
            count: live.len(),
        })
    }

    /// Commits. On success returns the changes, in the order they were made.
    ///
    /// # Errors
    ///
    /// Backend commit failures are FATAL; every change is rolled back.
    pub fn end(self) -> KvResult<Vec<KvEvent>> {
        self.end_with(|_| {})
    }

    /// Like [`KvTxn::end`], running `on_commit` once the commit is durable.
    ///
    /// `on_commit` runs while the index lock is still held, so callbacks of
    /// successive transactions run in revision order. It is not called if the
    /// commit fails.
    pub fn end_with<F>(self, on_commit: F) -> KvResult<Vec<KvEvent>>
    where
        F: FnOnce(&[KvEvent]),
    {
        let KvTxn {
            mut index,
            tx,
            changes,
            ..
        } = self;

        tx.commit()?;

        if !changes.is_empty() {
            index.guard.current_rev += 1;
        }
        index.committed = true;
        on_commit(&changes);

        Ok(changes)
    }

    fn live_kv(&self, key: &[u8], at: i64) -> KvResult<Option<KeyValue>> {
        match self.index.guard.tree.get(key).and_then(|ki| ki.live_at(at)) {
            Some(rev) => self.load_kv(rev).map(Some),
            None => Ok(None),
        }
    }

    fn load_kv(&self, rev: Revision) -> KvResult<KeyValue> {
        let (_, values) = self.tx.unsafe_range(KEY_BUCKET, &rev.to_bytes(), None, 0);
        let bytes = values.into_iter().next().ok_or_else(|| {
            KvError::Corruption(format!(
                "Revision {}_{} is indexed but not stored",
                rev.main, rev.sub
            ))
        })?;
        KeyValue::decode(&bytes).map(|(kv, _)| kv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> KvStore {
        KvStore::open(dir.path().join("aerokv.db"), BackendConfig::default()).unwrap()
    }

    fn put(store: &KvStore, key: &[u8], value: &[u8]) -> i64 {
        let mut txn = store.txn_begin().unwrap();
        let rev = txn.put(key, value).unwrap();
        txn.end().unwrap();
        rev
    }

    #[test]
    fn test_fresh_store_is_at_revision_zero() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        assert_eq!(store.current_revision().unwrap(), 0);
        assert_eq!(store.range(b"a", Some(b"z"), 0, 0).unwrap().count, 0);
    }

    #[test]
    fn test_put_advances_revision_and_version() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        assert_eq!(put(&store, b"foo", b"1"), 1);
        assert_eq!(put(&store, b"foo", b"2"), 2);
        assert_eq!(store.current_revision().unwrap(), 2);

        let result = store.range(b"foo", None, 0, 0).unwrap();
        assert_eq!(result.kvs.len(), 1);
        let kv = &result.kvs[0];
        assert_eq!(kv.value, b"2");
        assert_eq!(kv.create_revision, 1);
        assert_eq!(kv.mod_revision, 2);
        assert_eq!(kv.version, 2);
    }

    #[test]
    fn test_multiple_puts_share_one_revision() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        let mut txn = store.txn_begin().unwrap();
        assert_eq!(txn.put(b"a", b"1").unwrap(), 1);
        assert_eq!(txn.put(b"b", b"2").unwrap(), 1);
        assert_eq!(txn.put(b"a", b"3").unwrap(), 1);
        let events = txn.end().unwrap();

        assert_eq!(events.len(), 3);
        assert_eq!(store.current_revision().unwrap(), 1);
        let a = store.range(b"a", None, 0, 0).unwrap();
        assert_eq!(a.kvs[0].value, b"3");
        assert_eq!(a.kvs[0].version, 2);
    }

    #[test]
    fn test_delete_range_and_history() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        put(&store, b"a", b"1");
        put(&store, b"b", b"2");
        put(&store, b"c", b"3");

        let mut txn = store.txn_begin().unwrap();
        assert_eq!(txn.delete_range(b"a", Some(b"c")).unwrap(), (2, 4));
        let events = txn.end().unwrap();
        assert!(events.iter().all(|e| e.kind == EventKind::Delete));

        let now = store.range(b"a", Some(b"z"), 0, 0).unwrap();
        assert_eq!(now.count, 1);
        assert_eq!(now.kvs[0].key, b"c");

        let before = store.range(b"a", Some(b"z"), 0, 3).unwrap();
        assert_eq!(before.count, 3);
    }

    #[test]
    fn test_delete_of_nothing_keeps_revision() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        put(&store, b"a", b"1");

        let mut txn = store.txn_begin().unwrap();
        assert_eq!(txn.delete_range(b"x", Some(b"z")).unwrap(), (0, 1));
        assert!(txn.end().unwrap().is_empty());
        assert_eq!(store.current_revision().unwrap(), 1);
    }

    #[test]
    fn test_recreated_key_starts_new_generation() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        put(&store, b"k", b"1");
        let mut txn = store.txn_begin().unwrap();
        txn.delete_range(b"k", None).unwrap();
        txn.end().unwrap();
        put(&store, b"k", b"2");

        let kv = &store.range(b"k", None, 0, 0).unwrap().kvs[0];
        assert_eq!(kv.create_revision, 3);
        assert_eq!(kv.version, 1);
    }

    #[test]
    fn test_dropped_txn_rolls_back() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        put(&store, b"a", b"1");
        {
            let mut txn = store.txn_begin().unwrap();
            txn.put(b"a", b"2").unwrap();
            txn.put(b"b", b"x").unwrap();
        }
        assert_eq!(store.current_revision().unwrap(), 1);
        let r = store.range(b"a", Some(b"z"), 0, 0).unwrap();
        assert_eq!(r.count, 1);
        assert_eq!(r.kvs[0].value, b"1");
    }

    #[test]
    fn test_index_rebuilt_on_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(&dir);
            put(&store, b"a", b"1");
            put(&store, b"b", b"2");
            let mut txn = store.txn_begin().unwrap();
            txn.delete_range(b"a", None).unwrap();
            txn.end().unwrap();
        }
        let store = open(&dir);
        assert_eq!(store.current_revision().unwrap(), 3);
        let r = store.range(b"a", Some(b"z"), 0, 0).unwrap();
        assert_eq!(r.count, 1);
        assert_eq!(r.kvs[0].key, b"b");
        assert_eq!(put(&store, b"c", b"3"), 4);
    }

    #[test]
    fn test_range_limit_and_future_revision() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        for k in [b"a", b"b", b"c"] {
            put(&store, k, b"v");
        }
        let r = store.range(b"a", Some(b"z"), 2, 0).unwrap();
        assert_eq!(r.kvs.len(), 2);
        assert_eq!(r.count, 3);
        assert_eq!(r.revision, 3);

        assert!(matches!(
            store.range(b"a", None, 0, 10),
            Err(KvError::FutureRevision { requested: 10, current: 3 })
        ));
    }

    #[test]
    fn test_empty_key_rejected() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let mut txn = store.txn_begin().unwrap();
        assert!(matches!(txn.put(b"", b"v"), Err(KvError::EmptyKey)));
        assert!(matches!(txn.delete_range(b"", None), Err(KvError::EmptyKey)));
    }

    #[test]
    fn test_txn_ids_are_unique() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let first = store.txn_begin().unwrap().id();
        let second = store.txn_begin().unwrap().id();
        assert_ne!(first, second);
    }
}
