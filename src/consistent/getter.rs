//! Source of the consistent index.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Reports the log position of the entry currently being applied.
///
/// Called while the store's transaction lock is held, so implementations
/// must not call back into the store. Values are expected to be
/// non-decreasing across transactions; the store does not enforce it.
pub trait ConsistentIndexGetter: Send + Sync {
    fn consistent_index(&self) -> u64;
}

impl ConsistentIndexGetter for AtomicU64 {
    fn consistent_index(&self) -> u64 {
        self.load(Ordering::SeqCst)
    }
}

impl<G: ConsistentIndexGetter + ?Sized> ConsistentIndexGetter for Arc<G> {
    fn consistent_index(&self) -> u64 {
        (**self).consistent_index()
    }
}
