//! Conversation store implementations for mendstream.

pub mod file_backend;
pub mod in_memory;
pub mod noop;

pub use file_backend::FileStore;
pub use in_memory::InMemoryStore;
pub use noop::NoopStore;

use mendstream_config::StoreConfig;
use mendstream_core::{ConversationStore, StoreError};
use std::sync::Arc;

/// Build the store named by `config.backend`.
pub fn from_config(config: &StoreConfig) -> Result<Arc<dyn ConversationStore>, StoreError> {
    match config.backend.as_str() {
        "none" => Ok(Arc::new(NoopStore)),
        "memory" => Ok(Arc::new(InMemoryStore::new())),
        "file" => Ok(Arc::new(FileStore::new(config.resolved_path()))),
        other => Err(StoreError::Storage(format!("Unknown store backend: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_known_backends() {
        for backend in ["none", "memory"] {
            let config = StoreConfig {
                backend: backend.into(),
                path: None,
            };
            assert_eq!(from_config(&config).unwrap().name(), backend);
        }
    }

    #[test]
    fn file_backend_uses_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.jsonl");
        let config = StoreConfig {
            backend: "file".into(),
            path: Some(path.display().to_string()),
        };
        assert_eq!(from_config(&config).unwrap().name(), "file");
    }

    #[test]
    fn unknown_backend_is_error() {
        let config = StoreConfig {
            backend: "redis".into(),
            path: None,
        };
        assert!(from_config(&config).is_err());
    }
}
