//! Backend error types
//!
//! Error codes:
//! - AERO_BACKEND_IO_ERROR (ERROR severity)
//! - AERO_BACKEND_RECORD_TOO_LARGE (ERROR severity)
//! - AERO_BACKEND_COMMIT_FAILED (FATAL severity)
//! - AERO_BACKEND_CORRUPTION (FATAL severity)
//! - AERO_BACKEND_LOCK_POISONED (FATAL severity)

use std::fmt;
use std::io;

/// Severity levels for backend errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, store remains usable
    Error,
    /// Store must not be used further; restart required
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Backend-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorCode {
    /// File could not be opened, created or read
    AeroBackendIoError,
    /// Batch does not fit the record format; nothing was written
    AeroBackendRecordTooLarge,
    /// Batch could not be made durable
    AeroBackendCommitFailed,
    /// Commit log failed verification
    AeroBackendCorruption,
    /// A thread panicked while holding the batch lock
    AeroBackendLockPoisoned,
}

impl BackendErrorCode {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            BackendErrorCode::AeroBackendIoError => "AERO_BACKEND_IO_ERROR",
            BackendErrorCode::AeroBackendRecordTooLarge => "AERO_BACKEND_RECORD_TOO_LARGE",
            BackendErrorCode::AeroBackendCommitFailed => "AERO_BACKEND_COMMIT_FAILED",
            BackendErrorCode::AeroBackendCorruption => "AERO_BACKEND_CORRUPTION",
            BackendErrorCode::AeroBackendLockPoisoned => "AERO_BACKEND_LOCK_POISONED",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            BackendErrorCode::AeroBackendIoError => Severity::Error,
            BackendErrorCode::AeroBackendRecordTooLarge => Severity::Error,
            BackendErrorCode::AeroBackendCommitFailed => Severity::Fatal,
            BackendErrorCode::AeroBackendCorruption => Severity::Fatal,
            BackendErrorCode::AeroBackendLockPoisoned => Severity::Fatal,
        }
    }
}

impl fmt::Display for BackendErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Backend error with code, message and optional context
#[derive(Debug)]
pub struct BackendError {
    code: BackendErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl BackendError {
    /// Create a new backend I/O error
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: BackendErrorCode::AeroBackendIoError,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a commit failure caused by an I/O error (FATAL)
    pub fn commit_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: BackendErrorCode::AeroBackendCommitFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a rejection for a batch the record format cannot hold
    pub fn record_too_large(sequence: u64, source: io::Error) -> Self {
        Self {
            code: BackendErrorCode::AeroBackendRecordTooLarge,
            message: format!("Batch {} cannot be encoded", sequence),
            details: None,
            source: Some(source),
        }
    }

    /// Create a refusal from a writer whose file no longer ends on a
    /// record boundary (FATAL)
    pub fn log_poisoned(offset: u64) -> Self {
        Self {
            code: BackendErrorCode::AeroBackendCommitFailed,
            message: "Commit log could not be truncated after a failed append".to_string(),
            details: Some(format!("byte_offset: {}", offset)),
            source: None,
        }
    }

    /// Create a commit failure raised by an armed fault point (FATAL)
    pub fn commit_refused(fault_point: &str) -> Self {
        Self {
            code: BackendErrorCode::AeroBackendCommitFailed,
            message: "Commit refused".to_string(),
            details: Some(format!("fault_point: {}", fault_point)),
            source: None,
        }
    }

    /// Create a corruption error with byte offset context (FATAL)
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            code: BackendErrorCode::AeroBackendCorruption,
            message: reason.into(),
            details: Some(format!("byte_offset: {}", offset)),
            source: None,
        }
    }

    /// Create a corruption error without position context (FATAL)
    pub fn corruption(reason: impl Into<String>) -> Self {
        Self {
            code: BackendErrorCode::AeroBackendCorruption,
            message: reason.into(),
            details: None,
            source: None,
        }
    }

    /// Create a lock poisoned error (FATAL)
    pub fn lock_poisoned() -> Self {
        Self {
            code: BackendErrorCode::AeroBackendLockPoisoned,
            message: "Batch transaction lock poisoned".to_string(),
            details: None,
            source: None,
        }
    }

    pub fn code(&self) -> BackendErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether this error is fatal (store must be reopened)
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(BackendErrorCode::AeroBackendIoError.code(), "AERO_BACKEND_IO_ERROR");
        assert_eq!(BackendErrorCode::AeroBackendCommitFailed.code(), "AERO_BACKEND_COMMIT_FAILED");
        assert_eq!(BackendErrorCode::AeroBackendCorruption.code(), "AERO_BACKEND_CORRUPTION");
        assert_eq!(BackendErrorCode::AeroBackendLockPoisoned.code(), "AERO_BACKEND_LOCK_POISONED");
        assert_eq!(
            BackendErrorCode::AeroBackendRecordTooLarge.code(),
            "AERO_BACKEND_RECORD_TOO_LARGE"
        );
    }

    #[test]
    fn test_only_io_and_size_errors_are_recoverable() {
        let io = BackendError::io_error("open", io::Error::new(io::ErrorKind::Other, "denied"));
        assert!(!io.is_fatal());
        let too_large = BackendError::record_too_large(
            4,
            io::Error::new(io::ErrorKind::InvalidInput, "too long"),
        );
        assert!(!too_large.is_fatal());
        assert!(BackendError::log_poisoned(96).is_fatal());
        assert!(BackendError::commit_refused("x").is_fatal());
        assert!(BackendError::corruption("bad").is_fatal());
        assert!(BackendError::lock_poisoned().is_fatal());
    }

    #[test]
    fn test_display_contains_context() {
        let err = BackendError::corruption_at_offset(512, "checksum mismatch");
        let display = err.to_string();
        assert!(display.contains("FATAL"));
        assert!(display.contains("AERO_BACKEND_CORRUPTION"));
        assert!(display.contains("checksum mismatch"));
        assert!(display.contains("byte_offset: 512"));
    }

    #[test]
    fn test_source_is_chained() {
        use std::error::Error;
        let err = BackendError::commit_failed(
            "fsync failed",
            io::Error::new(io::ErrorKind::Other, "disk gone"),
        );
        assert!(err.source().is_some());
        assert!(BackendError::commit_refused("p").source().is_none());
    }
}
