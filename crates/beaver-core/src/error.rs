//! Error types for Beaver.

use thiserror::Error;

use crate::models::ItemRef;

/// Result type alias using Beaver's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Beaver operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Library item does not resolve to a live item
    #[error("Item not found: {0}")]
    ItemNotFound(ItemRef),

    /// Host item lookup failed (database error, inaccessible library)
    #[error("Lookup error: {0}")]
    Lookup(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation abandoned because its message was canceled
    #[error("Canceled: {0}")]
    Canceled(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error means the item is simply gone, as opposed to a
    /// failure of the host while looking it up.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::ItemNotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("thread t1".to_string());
        assert_eq!(err.to_string(), "Not found: thread t1");
    }

    #[test]
    fn test_error_display_item_not_found() {
        let err = Error::ItemNotFound(ItemRef::new(1, "ABCD1234"));
        assert_eq!(err.to_string(), "Item not found: 1-ABCD1234");
    }

    #[test]
    fn test_error_display_lookup() {
        let err = Error::Lookup("database is locked".to_string());
        assert_eq!(err.to_string(), "Lookup error: database is locked");
    }

    #[test]
    fn test_error_display_canceled() {
        let err = Error::Canceled("message m1".to_string());
        assert_eq!(err.to_string(), "Canceled: message m1");
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::ItemNotFound(ItemRef::new(1, "K")).is_not_found());
        assert!(Error::NotFound("x".to_string()).is_not_found());
        assert!(!Error::Lookup("boom".to_string()).is_not_found());
        assert!(!Error::Internal("bug".to_string()).is_not_found());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
