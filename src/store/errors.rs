//! # Object Store Errors

use thiserror::Error;

/// Result type for object store calls
pub type StoreResult<T> = Result<T, StoreError>;

/// Object store failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    /// Network hiccups, throttling, 5xx from the backend
    #[error("Transient store failure: {0}")]
    Transient(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl StoreError {
    /// Whether the caller may retry the same request
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }

    pub(crate) fn from_io(key: &str, err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::NotFound => StoreError::NotFound(key.to_string()),
            ErrorKind::AlreadyExists => StoreError::AlreadyExists(key.to_string()),
            ErrorKind::PermissionDenied => StoreError::PermissionDenied(key.to_string()),
            ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock => {
                StoreError::Transient(err.to_string())
            }
            _ => StoreError::Io(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(StoreError::Transient("503".into()).is_transient());
        assert!(!StoreError::PermissionDenied("k".into()).is_transient());
        assert!(!StoreError::NotFound("k".into()).is_transient());
    }

    #[test]
    fn test_io_mapping() {
        let err = StoreError::from_io("a.txt", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(err, StoreError::NotFound("a.txt".into()));

        let err = StoreError::from_io("a.txt", io::Error::from(io::ErrorKind::AlreadyExists));
        assert_eq!(err, StoreError::AlreadyExists("a.txt".into()));

        let err = StoreError::from_io("a.txt", io::Error::from(io::ErrorKind::TimedOut));
        assert!(err.is_transient());
    }
}
