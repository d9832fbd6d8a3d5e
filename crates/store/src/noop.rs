//! No-op store: healed conversations are not persisted.

use async_trait::async_trait;
use mendstream_core::{ConversationMessage, ConversationStore, StepId, StoreError};

/// A store that keeps nothing.
pub struct NoopStore;

#[async_trait]
impl ConversationStore for NoopStore {
    fn name(&self) -> &str { "none" }

    async fn save(&self, _step: &StepId, _messages: &[ConversationMessage]) -> Result<(), StoreError> {
        Ok(())
    }

    async fn load(&self, _step: &StepId) -> Result<Option<Vec<ConversationMessage>>, StoreError> {
        Ok(None)
    }

    async fn clear(&self, _step: &StepId) -> Result<bool, StoreError> {
        Ok(false)
    }
}
