//! Versioned store errors

use thiserror::Error;

use crate::backend::BackendError;

/// Result type for versioned store operations
pub type KvResult<T> = Result<T, KvError>;

#[derive(Debug, Error)]
pub enum KvError {
    /// Backend failure (commit, I/O, corruption, lock)
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Key must not be empty")]
    EmptyKey,

    #[error("Revision {requested} is ahead of current revision {current}")]
    FutureRevision { requested: i64, current: i64 },

    /// Key bucket contents could not be decoded
    #[error("Corrupted key bucket: {0}")]
    Corruption(String),

    #[error("Key index lock poisoned")]
    IndexPoisoned,
}

impl KvError {
    /// Fatal errors mean the store can no longer guarantee that a committed
    /// transaction is exactly what was applied. Callers must restart, not retry.
    pub fn is_fatal(&self) -> bool {
        match self {
            KvError::Backend(e) => e.is_fatal(),
            KvError::Corruption(_) | KvError::IndexPoisoned => true,
            KvError::EmptyKey | KvError::FutureRevision { .. } => false,
        }
    }
}
