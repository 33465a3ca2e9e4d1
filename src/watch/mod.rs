//! # Watch Layer
//!
//! Notifies watchers of committed changes. Composed over [`crate::mvcc::KvStore`]:
//!
//! - **Hub**: watcher registry and per-transaction event fan-out
//! - **Store**: transactions that dispatch to the hub after a durable commit
//!
//! Watchers only see changes made after they registered.

mod hub;
mod store;

pub use hub::{DispatchResult, KeyRange, WatchReceiver, WatchResponse, WatchSender, Watcher, WatcherHub};
pub use store::{WatchableStore, WatchableTxn};
