//! In-memory key index
//!
//! Maps each user key to the revisions at which it changed. The index is
//! rebuilt from the `key` bucket on open and never persisted itself.

use std::collections::BTreeMap;
use std::ops::Bound;

use super::revision::Revision;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IndexEntry {
    rev: Revision,
    tombstone: bool,
}

/// Change history of one key, oldest first.
#[derive(Debug, Clone, Default)]
pub struct KeyIndex {
    entries: Vec<IndexEntry>,
}

impl KeyIndex {
    pub fn put(&mut self, rev: Revision) {
        self.entries.push(IndexEntry {
            rev,
            tombstone: false,
        });
    }

    pub fn tombstone(&mut self, rev: Revision) {
        self.entries.push(IndexEntry {
            rev,
            tombstone: true,
        });
    }

    /// Revision holding the key's value as of `at` (a main revision), or
    /// `None` if the key did not exist or was deleted at that point.
    pub fn live_at(&self, at: i64) -> Option<Revision> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.rev.main <= at)
            .filter(|e| !e.tombstone)
            .map(|e| e.rev)
    }

    /// Revision of the newest change, live or not.
    pub fn latest(&self) -> Option<Revision> {
        self.entries.last().map(|e| e.rev)
    }

    fn pop(&mut self) {
        self.entries.pop();
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ordered index over all keys.
#[derive(Debug, Default)]
pub struct TreeIndex {
    keys: BTreeMap<Vec<u8>, KeyIndex>,
}

impl TreeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: &[u8], rev: Revision) {
        self.keys.entry(key.to_vec()).or_default().put(rev);
    }

    pub fn tombstone(&mut self, key: &[u8], rev: Revision) {
        self.keys.entry(key.to_vec()).or_default().tombstone(rev);
    }

    /// Removes the newest entry of `key`. Used to undo an uncommitted change.
    pub fn revert_latest(&mut self, key: &[u8]) {
        if let Some(ki) = self.keys.get_mut(key) {
            ki.pop();
            if ki.is_empty() {
                self.keys.remove(key);
            }
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<&KeyIndex> {
        self.keys.get(key)
    }

    /// Keys live at `at` with the revision holding their value.
    ///
    /// `end = None` looks up `key` alone, otherwise `[key, end)`.
    pub fn live_range(&self, key: &[u8], end: Option<&[u8]>, at: i64) -> Vec<(Vec<u8>, Revision)> {
        match end {
            None => self
                .keys
                .get(key)
                .and_then(|ki| ki.live_at(at))
                .map(|rev| vec![(key.to_vec(), rev)])
                .unwrap_or_default(),
            Some(end) if end <= key => Vec::new(),
            Some(end) => self
                .keys
                .range::<[u8], _>((Bound::Included(key), Bound::Excluded(end)))
                .filter_map(|(k, ki)| ki.live_at(at).map(|rev| (k.clone(), rev)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
