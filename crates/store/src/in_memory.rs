//! In-memory store, useful for tests and single-process runs.

use async_trait::async_trait;
use mendstream_core::{ConversationMessage, ConversationStore, StepId, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keeps the latest conversation per step in a map.
pub struct InMemoryStore {
    conversations: Arc<RwLock<HashMap<StepId, Vec<ConversationMessage>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            conversations: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of steps with a stored conversation.
    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conversations.read().await.is_empty()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn name(&self) -> &str { "memory" }

    async fn save(&self, step: &StepId, messages: &[ConversationMessage]) -> Result<(), StoreError> {
        self.conversations
            .write()
            .await
            .insert(step.clone(), messages.to_vec());
        Ok(())
    }

    async fn load(&self, step: &StepId) -> Result<Option<Vec<ConversationMessage>>, StoreError> {
        Ok(self.conversations.read().await.get(step).cloned())
    }

    async fn clear(&self, step: &StepId) -> Result<bool, StoreError> {
        Ok(self.conversations.write().await.remove(step).is_some())
    }
}
