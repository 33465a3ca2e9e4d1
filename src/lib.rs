//! aerokv - a versioned key-value store that records, atomically with every
//! transaction, the replicated-log position that produced it.
//!
//! Layers, bottom up:
//! - `backend`: bucketed byte store with a checksummed, append-only commit log
//! - `mvcc`: revisions, key index and transactions over the backend
//! - `watch`: post-commit change notification
//! - `consistent`: consistent index stamping and recovery

pub mod backend;
pub mod cli;
pub mod config;
pub mod consistent;
pub mod fault;
pub mod mvcc;
pub mod observability;
pub mod watch;
