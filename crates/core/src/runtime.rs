//! StreamRuntime trait: the abstraction over "stream the model once".
//!
//! A runtime takes the conversation, drives one streaming call against the
//! model, and either hands back a handle to the finished stream or reports the
//! failure that stopped it together with whatever it had accumulated.
//!
//! Implementations wrap a concrete SDK; the resilience layer only sees this trait.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::failure::StreamFailure;
use crate::message::{ConversationMessage, StepId};
use crate::retryable::RetryableError;

/// What the resilience layer answers when a runtime reports a mid-stream error.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorVerdict {
    /// Inject this value (shaped `{"error": ...}`) as the tool result and keep streaming.
    HealInPlace(serde_json::Value),
    /// Stop the stream and return the failure; the controller repairs and restarts.
    Restart(Box<RetryableError>),
    /// Stop the stream and return the failure unchanged.
    Abort,
}

/// Error callback a runtime invokes for failures raised while streaming.
pub trait ErrorCallback: Send + Sync {
    fn on_error(&self, failure: &StreamFailure) -> ErrorVerdict;
}

/// Callback that never heals in place: every failure stops the stream.
pub struct NoHealing;

impl ErrorCallback for NoHealing {
    fn on_error(&self, _failure: &StreamFailure) -> ErrorVerdict {
        ErrorVerdict::Abort
    }
}

/// Per-attempt context handed to the runtime.
#[derive(Clone)]
pub struct AttemptContext {
    pub step_id: StepId,
    /// Zero-based attempt number.
    pub attempt: u32,
    /// Cancelling this token aborts the stream and any pending backoff.
    pub cancel: CancellationToken,
    callback: Arc<dyn ErrorCallback>,
}

impl AttemptContext {
    pub fn new(
        step_id: StepId,
        attempt: u32,
        cancel: CancellationToken,
        callback: Arc<dyn ErrorCallback>,
    ) -> Self {
        Self {
            step_id,
            attempt,
            cancel,
            callback,
        }
    }

    /// Report a mid-stream failure and get the verdict for it.
    pub fn report(&self, failure: &StreamFailure) -> ErrorVerdict {
        self.callback.on_error(failure)
    }
}

impl std::fmt::Debug for AttemptContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttemptContext")
            .field("step_id", &self.step_id)
            .field("attempt", &self.attempt)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Why an attempt did not produce a stream handle.
#[derive(Debug, Clone)]
pub struct AttemptFailure {
    pub failure: StreamFailure,
    /// The conversation as accumulated up to the failure (input plus any
    /// partially streamed turns). `None` when the stream never started.
    pub accumulated: Option<Vec<ConversationMessage>>,
}

impl AttemptFailure {
    pub fn new(failure: StreamFailure) -> Self {
        Self {
            failure,
            accumulated: None,
        }
    }

    pub fn with_accumulated(mut self, messages: Vec<ConversationMessage>) -> Self {
        self.accumulated = Some(messages);
        self
    }
}

impl From<StreamFailure> for AttemptFailure {
    fn from(failure: StreamFailure) -> Self {
        Self::new(failure)
    }
}

/// The core StreamRuntime trait.
#[async_trait]
pub trait StreamRuntime: Send + Sync {
    /// Handle to a successfully started stream.
    type Handle: Send;

    /// A human-readable name (e.g. "anthropic", "scripted").
    fn name(&self) -> &str;

    /// Run one streaming attempt over `messages`.
    ///
    /// Failures raised after the stream started should first be passed to
    /// [`AttemptContext::report`]; unless the verdict is `HealInPlace`, the
    /// runtime stops and returns them here.
    async fn stream(
        &self,
        messages: &[ConversationMessage],
        ctx: &AttemptContext,
    ) -> std::result::Result<Self::Handle, AttemptFailure>;
}
