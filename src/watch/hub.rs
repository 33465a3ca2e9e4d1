//! # Watcher Hub
//!
//! Registry of watchers and fan-out of committed events.
//!
//! Each call to [`WatcherHub::notify`] carries the events of exactly one
//! committed transaction. A watcher gets at most one [`WatchResponse`] per
//! call, holding only the events whose key it watches.
//!
//! Each registry change is a single map insert or remove, so the map is
//! whole even if a thread panicked while holding the lock. A poisoned lock
//! is logged and recovered rather than dropping registrations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;

use crate::mvcc::KvEvent;
use crate::observability::{log_event_with_fields, Event};

/// Response sender for a watcher
pub type WatchSender = mpsc::UnboundedSender<WatchResponse>;

/// Response receiver for a watcher
pub type WatchReceiver = mpsc::UnboundedReceiver<WatchResponse>;

/// Events of one committed transaction that match one watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchResponse {
    pub watch_id: u64,
    /// Revision the transaction committed at
    pub revision: i64,
    pub events: Vec<KvEvent>,
}

/// Watched key or key range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    key: Vec<u8>,
    end: Option<Vec<u8>>,
}

impl KeyRange {
    /// `end = None` matches `key` alone, otherwise `[key, end)`.
    pub fn new(key: &[u8], end: Option<&[u8]>) -> Self {
        Self {
            key: key.to_vec(),
            end: end.map(<[u8]>::to_vec),
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        match &self.end {
            None => key == self.key.as_slice(),
            Some(end) => key >= self.key.as_slice() && key < end.as_slice(),
        }
    }
}

#[derive(Debug)]
struct WatcherEntry {
    range: KeyRange,
    sender: WatchSender,
}

/// Receiving end handed to the caller of `watch`.
#[derive(Debug)]
pub struct Watcher {
    id: u64,
    receiver: WatchReceiver,
}

impl Watcher {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next response. `None` once the watcher is cancelled
    /// and every buffered response has been received.
    pub async fn recv(&mut self) -> Option<WatchResponse> {
        self.receiver.recv().await
    }

    /// Next buffered response, without waiting.
    pub fn try_recv(&mut self) -> Option<WatchResponse> {
        self.receiver.try_recv().ok()
    }
}

/// Outcome of one dispatch
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    /// Watchers with at least one matching event
    pub matched: usize,
    /// Responses handed to a live receiver
    pub delivered: usize,
    /// Watchers removed because their receiver was dropped
    pub pruned: usize,
}

#[derive(Debug, Default)]
pub struct WatcherHub {
    watchers: RwLock<HashMap<u64, WatcherEntry>>,
    next_id: AtomicU64,
}

impl WatcherHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_watchers(&self) -> RwLockReadGuard<'_, HashMap<u64, WatcherEntry>> {
        self.watchers.read().unwrap_or_else(|poisoned| {
            log_event_with_fields(Event::WatchHubPoisoned, &[("operation", "read")]);
            poisoned.into_inner()
        })
    }

    fn write_watchers(&self, operation: &str) -> RwLockWriteGuard<'_, HashMap<u64, WatcherEntry>> {
        self.watchers.write().unwrap_or_else(|poisoned| {
            log_event_with_fields(Event::WatchHubPoisoned, &[("operation", operation)]);
            poisoned.into_inner()
        })
    }

    /// Registers a watcher on `key` (or `[key, end)`).
    pub fn watch(&self, key: &[u8], end: Option<&[u8]>) -> Watcher {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (sender, receiver) = mpsc::unbounded_channel();

        self.write_watchers("watch").insert(
            id,
            WatcherEntry {
                range: KeyRange::new(key, end),
                sender,
            },
        );

        Watcher { id, receiver }
    }

    /// Removes a watcher. Returns false if it was not registered.
    pub fn cancel(&self, id: u64) -> bool {
        self.write_watchers("cancel").remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.read_watchers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers the events of one committed transaction.
    pub fn notify(&self, events: &[KvEvent]) -> DispatchResult {
        let mut result = DispatchResult::default();
        let Some(first) = events.first() else {
            return result;
        };
        let revision = first.kv.mod_revision;

        let mut watchers = self.write_watchers("notify");

        let mut closed = Vec::new();
        for (id, entry) in watchers.iter() {
            let matching: Vec<KvEvent> = events
                .iter()
                .filter(|e| entry.range.contains(&e.kv.key))
                .cloned()
                .collect();
            if matching.is_empty() {
                continue;
            }
            result.matched += 1;

            let response = WatchResponse {
                watch_id: *id,
                revision,
                events: matching,
            };
            match entry.sender.send(response) {
                Ok(()) => result.delivered += 1,
                Err(_) => closed.push(*id),
            }
        }

        for id in closed {
            watchers.remove(&id);
            result.pruned += 1;
        }

        log_event_with_fields(
            Event::WatchDispatch,
            &[
                ("delivered", result.delivered.to_string().as_str()),
                ("events", events.len().to_string().as_str()),
                ("pruned", result.pruned.to_string().as_str()),
                ("revision", revision.to_string().as_str()),
            ],
        );

        result
    }
}
