//! Resilience events: what the retry loop did, for whoever is listening.
//!
//! The controller publishes an event for every failure, repair, and outcome.
//! Streaming UIs and audit sinks subscribe without the controller knowing them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::message::StepId;
use crate::retryable::RetryableErrorKind;

/// All events the resilience layer emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ResilienceEvent {
    /// An attempt failed with a retryable error
    AttemptFailed {
        step_id: StepId,
        attempt: u32,
        kind: RetryableErrorKind,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// The conversation was repaired before the next attempt
    HealingApplied {
        step_id: StepId,
        kind: RetryableErrorKind,
        messages_before: usize,
        messages_after: usize,
        timestamp: DateTime<Utc>,
    },

    /// The next attempt will start after `delay_ms`
    RetryScheduled {
        step_id: StepId,
        attempt: u32,
        delay_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A tool-level failure was answered inside the running stream
    HealedInPlace {
        step_id: StepId,
        kind: RetryableErrorKind,
        tool_name: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// The step produced a stream
    StepSucceeded {
        step_id: StepId,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },

    /// The step was stopped on purpose
    StepAborted {
        step_id: StepId,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The step gave up
    StepFailed {
        step_id: StepId,
        attempts: u32,
        user_message: String,
        timestamp: DateTime<Utc>,
    },
}

impl ResilienceEvent {
    pub fn step_id(&self) -> &StepId {
        match self {
            Self::AttemptFailed { step_id, .. }
            | Self::HealingApplied { step_id, .. }
            | Self::RetryScheduled { step_id, .. }
            | Self::HealedInPlace { step_id, .. }
            | Self::StepSucceeded { step_id, .. }
            | Self::StepAborted { step_id, .. }
            | Self::StepFailed { step_id, .. } => step_id,
        }
    }
}

/// A broadcast-based event bus for resilience events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct ResilienceEventBus {
    sender: broadcast::Sender<Arc<ResilienceEvent>>,
}

impl ResilienceEventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: ResilienceEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ResilienceEvent>> {
        self.sender.subscribe()
    }
}

impl Default for ResilienceEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
