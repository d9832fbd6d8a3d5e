//! What a step run hands back to its caller.

use mendstream_core::{ConversationMessage, RetryableError, StreamFailure};
use serde::Serialize;
use thiserror::Error;

/// How a successful step ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "completion", rename_all = "snake_case")]
pub enum Completion {
    /// The runtime produced a stream.
    Streamed,
    /// The model stopped on purpose, or the step was cancelled.
    Aborted { reason: String },
}

/// A step that did not fail.
#[derive(Debug)]
pub struct StepOutcome<H> {
    /// Present when the runtime produced a stream.
    pub handle: Option<H>,
    /// The conversation the last attempt was started with (healed, if any
    /// repair happened), or what was accumulated when the step aborted.
    pub conversation: Vec<ConversationMessage>,
    /// Number of times the runtime was called.
    pub attempts: u32,
    pub completion: Completion,
}

impl<H> StepOutcome<H> {
    pub fn is_aborted(&self) -> bool {
        matches!(self.completion, Completion::Aborted { .. })
    }
}

/// The single error a step surfaces when it gives up.
#[derive(Debug, Error)]
pub enum TerminalError {
    /// Misconfiguration; propagated as is after one call.
    #[error("{cause}")]
    NonRetryable {
        cause: StreamFailure,
        conversation: Vec<ConversationMessage>,
    },

    /// Retries ran out. Displays only the user-facing sentence.
    #[error("{user_message}")]
    Exhausted {
        user_message: &'static str,
        #[source]
        last_error: Box<RetryableError>,
        attempts: u32,
        conversation: Vec<ConversationMessage>,
    },
}

impl TerminalError {
    /// The failure that ended the step.
    pub fn cause(&self) -> &StreamFailure {
        match self {
            Self::NonRetryable { cause, .. } => cause,
            Self::Exhausted { last_error, .. } => &last_error.original_cause,
        }
    }

    /// The last good conversation; never dropped, even on failure.
    pub fn conversation(&self) -> &[ConversationMessage] {
        match self {
            Self::NonRetryable { conversation, .. } | Self::Exhausted { conversation, .. } => {
                conversation
            }
        }
    }

    pub fn into_conversation(self) -> Vec<ConversationMessage> {
        match self {
            Self::NonRetryable { conversation, .. } | Self::Exhausted { conversation, .. } => {
                conversation
            }
        }
    }

    /// Sentence safe to show an end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NonRetryable { cause, .. } => mendstream_healing::user_facing_message(cause),
            Self::Exhausted { user_message, .. } => user_message,
        }
    }
}
