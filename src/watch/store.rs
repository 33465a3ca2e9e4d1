//! Watchable store: a [`KvStore`] that notifies watchers of committed changes.

use std::path::Path;

use super::hub::{Watcher, WatcherHub};
use crate::backend::{BackendConfig, BatchTx};
use crate::mvcc::{KvEvent, KvResult, KvStore, KvTxn, RangeResult};

pub struct WatchableStore {
    store: KvStore,
    hub: WatcherHub,
}

impl WatchableStore {
    pub fn open(path: impl AsRef<Path>, config: BackendConfig) -> KvResult<Self> {
        Ok(Self::new(KvStore::open(path, config)?))
    }

    pub fn new(store: KvStore) -> Self {
        Self {
            store,
            hub: WatcherHub::new(),
        }
    }

    pub fn kv(&self) -> &KvStore {
        &self.store
    }

    pub fn hub(&self) -> &WatcherHub {
        &self.hub
    }

    pub fn watch(&self, key: &[u8], end: Option<&[u8]>) -> Watcher {
        self.hub.watch(key, end)
    }

    pub fn cancel(&self, watch_id: u64) -> bool {
        self.hub.cancel(watch_id)
    }

    pub fn txn_begin(&self) -> KvResult<WatchableTxn<'_>> {
        Ok(WatchableTxn {
            txn: self.store.txn_begin()?,
            hub: &self.hub,
        })
    }

    pub fn current_revision(&self) -> KvResult<i64> {
        self.store.current_revision()
    }

    pub fn range(
        &self,
        key: &[u8],
        end: Option<&[u8]>,
        limit: usize,
        at_rev: i64,
    ) -> KvResult<RangeResult> {
        self.store.range(key, end, limit, at_rev)
    }
}

/// A [`KvTxn`] whose changes reach watchers once it commits.
pub struct WatchableTxn<'a> {
    txn: KvTxn<'a>,
    hub: &'a WatcherHub,
}

impl<'a> WatchableTxn<'a> {
    pub fn id(&self) -> u64 {
        self.txn.id()
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> KvResult<i64> {
        self.txn.put(key, value)
    }

    pub fn delete_range(&mut self, key: &[u8], end: Option<&[u8]>) -> KvResult<(i64, i64)> {
        self.txn.delete_range(key, end)
    }

    pub fn range(
        &self,
        key: &[u8],
        end: Option<&[u8]>,
        limit: usize,
        at_rev: i64,
    ) -> KvResult<RangeResult> {
        self.txn.range(key, end, limit, at_rev)
    }

    pub fn backend_tx(&mut self) -> &mut BatchTx<'a> {
        self.txn.backend_tx()
    }

    /// Commits, then dispatches the changes. A failed commit dispatches nothing.
    pub fn end(self) -> KvResult<Vec<KvEvent>> {
        let hub = self.hub;
        self.txn.end_with(|events| {
            hub.notify(events);
        })
    }
}
