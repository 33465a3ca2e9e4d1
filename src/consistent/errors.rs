//! Consistent store errors

use thiserror::Error;

use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::mvcc::KvError;

pub type ConsistentResult<T> = Result<T, ConsistentError>;

#[derive(Debug, Error)]
pub enum ConsistentError {
    #[error(transparent)]
    Kv(#[from] KvError),

    /// Stored index is not 8 bytes long
    #[error("Malformed consistent index: expected 8 bytes, found {len}")]
    MalformedIndex { len: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<BackendError> for ConsistentError {
    fn from(err: BackendError) -> Self {
        ConsistentError::Kv(KvError::Backend(err))
    }
}

impl ConsistentError {
    /// Fatal errors must not be retried: the pairing of index and data can
    /// no longer be trusted. Escalate to a process restart.
    pub fn is_fatal(&self) -> bool {
        match self {
            ConsistentError::Kv(e) => e.is_fatal(),
            ConsistentError::MalformedIndex { .. } => true,
            ConsistentError::Config(_) => false,
        }
    }
}
