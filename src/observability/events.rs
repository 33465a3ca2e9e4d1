//! Observable events
//!
//! Every log line the store emits is named by one of these variants.

use std::fmt;

use super::logger::Severity;

/// Observable events in aerokv
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Backend
    /// Commit log opened and replayed
    BackendOpen,
    /// Batch appended (and fsynced, if configured)
    BackendCommit,
    /// Batch could not be made durable (FATAL)
    BackendCommitFailed,
    /// Commit log failed verification on replay (FATAL)
    BackendCorruption,
    /// Partial record from an interrupted append cut off on replay
    BackendTailTruncated,
    /// Uncommitted batch discarded
    BackendRollback,

    // Versioned store
    /// Key index rebuilt from the backend
    StoreRestored,

    // Consistent index
    /// Index written into the metadata bucket at txn begin
    IndexStamped,
    /// Index read back by the recovery accessor
    IndexRecovered,
    /// Metadata entry has the wrong length (FATAL)
    IndexMalformed,
    /// A wrapped operation hit an unrecoverable error (FATAL)
    TxnFatal,

    // Watch
    /// Committed events fanned out to watchers
    WatchDispatch,
    /// Watcher registry lock recovered after a panic in another thread
    WatchHubPoisoned,

    // Configuration
    /// Configuration loaded
    ConfigLoaded,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::BackendOpen => "BACKEND_OPEN",
            Event::BackendCommit => "BACKEND_COMMIT",
            Event::BackendCommitFailed => "BACKEND_COMMIT_FAILED",
            Event::BackendCorruption => "BACKEND_CORRUPTION",
            Event::BackendTailTruncated => "BACKEND_TAIL_TRUNCATED",
            Event::BackendRollback => "BACKEND_ROLLBACK",
            Event::StoreRestored => "STORE_RESTORED",
            Event::IndexStamped => "INDEX_STAMPED",
            Event::IndexRecovered => "INDEX_RECOVERED",
            Event::IndexMalformed => "INDEX_MALFORMED",
            Event::TxnFatal => "TXN_FATAL",
            Event::WatchDispatch => "WATCH_DISPATCH",
            Event::WatchHubPoisoned => "WATCH_HUB_POISONED",
            Event::ConfigLoaded => "CONFIG_LOADED",
        }
    }

    /// Severity this event is logged at.
    pub fn severity(&self) -> Severity {
        match self {
            Event::BackendCommit | Event::IndexStamped | Event::WatchDispatch => Severity::Trace,
            Event::BackendRollback | Event::BackendTailTruncated | Event::WatchHubPoisoned => {
                Severity::Warn
            }
            Event::BackendCommitFailed
            | Event::BackendCorruption
            | Event::IndexMalformed
            | Event::TxnFatal => Severity::Fatal,
            _ => Severity::Info,
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
