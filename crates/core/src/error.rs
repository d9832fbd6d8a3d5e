//! Error types for the Mendstream domain.
//!
//! Model-side failures are not errors of this crate: they are data
//! ([`crate::failure::StreamFailure`]) that the resilience layer classifies.
//! What remains is the persistence seam.

use thiserror::Error;

/// Failure of a [`crate::store::ConversationStore`] backend.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Could not encode or decode conversation: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_maps_to_storage() {
        let err: StoreError = std::io::Error::other("disk full").into();
        assert!(matches!(err, StoreError::Storage(ref m) if m.contains("disk full")));
        assert_eq!(err.to_string(), "Storage error: disk full");
    }

    #[test]
    fn json_error_maps_to_serialization() {
        let err: StoreError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
