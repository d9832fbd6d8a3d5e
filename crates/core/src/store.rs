//! ConversationStore trait: where healed conversations are flushed.
//!
//! After every repair the controller saves the conversation keyed by its
//! step, so a crash mid-retry can resume from the last healed state instead
//! of the original input.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::message::{ConversationMessage, StepId};

/// Persistence for per-step conversations.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Backend name (e.g. "memory", "file", "none").
    fn name(&self) -> &str;

    /// Replace the stored conversation for `step`.
    async fn save(&self, step: &StepId, messages: &[ConversationMessage]) -> Result<(), StoreError>;

    /// The last saved conversation for `step`, if any.
    async fn load(&self, step: &StepId) -> Result<Option<Vec<ConversationMessage>>, StoreError>;

    /// Forget the conversation for `step`. Returns whether anything was removed.
    async fn clear(&self, step: &StepId) -> Result<bool, StoreError>;
}
