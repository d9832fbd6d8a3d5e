//! The retry controller: one sequential loop per workflow step.
//!
//! Each iteration calls the runtime once. A failure is classified, the
//! conversation is repaired according to the kind's strategy and flushed to
//! the store, and the loop sleeps the computed backoff before trying again.
//! Only two things leave the loop: a stream handle or one terminal error.

use chrono::Utc;
use mendstream_config::RetryConfig;
use mendstream_core::{
    AttemptContext, AttemptFailure, ConversationMessage, ConversationStore, ErrorCallback,
    NoHealing, ResilienceEvent, ResilienceEventBus, StepId, StreamRuntime, WorkflowContext,
};
use mendstream_healing::{Classifier, ClassifierOptions, repair, strategy_for, user_facing_message};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::in_place::InPlaceHealer;
use crate::outcome::{Completion, StepOutcome, TerminalError};

/// Everything one step run needs.
#[derive(Debug, Clone)]
pub struct StepRequest {
    pub step_id: StepId,
    pub messages: Vec<ConversationMessage>,
    pub context: Option<WorkflowContext>,
    /// Aborts the stream and any pending backoff.
    pub cancel: CancellationToken,
}

impl StepRequest {
    pub fn new(step_id: StepId, messages: Vec<ConversationMessage>) -> Self {
        Self {
            step_id,
            messages,
            context: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_context(mut self, context: WorkflowContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Drives a [`StreamRuntime`] until it streams, aborts, or gives up.
pub struct RetryController<R: StreamRuntime> {
    runtime: R,
    classifier: Classifier,
    backoff: Backoff,
    /// Retries allowed after the first attempt.
    max_attempts: u32,
    in_place_healing: bool,
    max_in_place_heals: u32,
    store: Option<Arc<dyn ConversationStore>>,
    events: Arc<ResilienceEventBus>,
}

impl<R: StreamRuntime> RetryController<R> {
    /// Create a controller with default settings.
    pub fn new(runtime: R) -> Self {
        Self::from_config(runtime, &RetryConfig::default())
    }

    pub fn from_config(runtime: R, config: &RetryConfig) -> Self {
        Self {
            runtime,
            classifier: Classifier::new(ClassifierOptions {
                overloaded_status: config.overloaded_status,
                argument_preview_chars: config.argument_preview_chars,
            }),
            backoff: Backoff::from_config(config),
            max_attempts: config.max_attempts,
            in_place_healing: config.in_place_healing,
            max_in_place_heals: config.max_in_place_heals,
            store: None,
            events: Arc::new(ResilienceEventBus::default()),
        }
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Enable or disable in-place healing of tool-level failures.
    pub fn with_in_place_healing(mut self, enabled: bool, max_heals: u32) -> Self {
        self.in_place_healing = enabled;
        self.max_in_place_heals = max_heals;
        self
    }

    /// Flush healed conversations to `store` before every retry.
    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_event_bus(mut self, events: Arc<ResilienceEventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn event_bus(&self) -> &Arc<ResilienceEventBus> {
        &self.events
    }

    /// Run the step from the last conversation persisted for it, falling back
    /// to `request.messages` when nothing usable is stored.
    pub async fn resume(
        &self,
        mut request: StepRequest,
    ) -> Result<StepOutcome<R::Handle>, TerminalError> {
        if let Some(store) = &self.store {
            match store.load(&request.step_id).await {
                Ok(Some(messages)) if !messages.is_empty() => {
                    info!(
                        step = %request.step_id,
                        messages = messages.len(),
                        store = store.name(),
                        "Resuming step from persisted conversation"
                    );
                    request.messages = messages;
                }
                Ok(_) => debug!(step = %request.step_id, "Nothing persisted, starting fresh"),
                Err(e) => warn!(step = %request.step_id, "Failed to load persisted conversation: {e}"),
            }
        }
        self.run(request).await
    }

    /// Run the step.
    pub async fn run(&self, request: StepRequest) -> Result<StepOutcome<R::Handle>, TerminalError> {
        let StepRequest {
            step_id,
            messages,
            context,
            cancel,
        } = request;

        let callback: Arc<dyn ErrorCallback> = if self.in_place_healing {
            Arc::new(
                InPlaceHealer::new(step_id.clone(), self.classifier.clone(), self.max_in_place_heals)
                    .with_context(context.clone())
                    .with_event_bus(self.events.clone()),
            )
        } else {
            Arc::new(NoHealing)
        };

        info!(
            step = %step_id,
            runtime = self.runtime.name(),
            messages = messages.len(),
            max_attempts = self.max_attempts,
            "Starting step"
        );

        let mut conversation = messages;
        let mut attempt: u32 = 0;

        loop {
            let ctx = AttemptContext::new(step_id.clone(), attempt, cancel.clone(), callback.clone());
            debug!(step = %step_id, attempt, "Starting stream attempt");

            let AttemptFailure {
                failure,
                accumulated,
            } = match self.runtime.stream(&conversation, &ctx).await {
                Ok(handle) => {
                    info!(step = %step_id, attempts = attempt + 1, "Step streamed");
                    self.clear(&step_id).await;
                    self.events.publish(ResilienceEvent::StepSucceeded {
                        step_id: step_id.clone(),
                        attempts: attempt + 1,
                        timestamp: Utc::now(),
                    });
                    return Ok(StepOutcome {
                        handle: Some(handle),
                        conversation,
                        attempts: attempt + 1,
                        completion: Completion::Streamed,
                    });
                }
                Err(failure) => failure,
            };

            if let Some(accumulated) = accumulated {
                conversation = accumulated;
            }

            if failure.is_abort() {
                let reason = failure.innermost().message().to_string();
                info!(step = %step_id, reason = %reason, "Stream stopped on purpose");
                self.clear(&step_id).await;
                return Ok(self.aborted(&step_id, conversation, attempt + 1, reason));
            }

            let Some(retryable) = self.classifier.classify(&failure, context.as_ref()) else {
                // Propagate what the SDK's retry wrapper saw, not the wrapper
                let cause = failure.innermost().clone();
                warn!(
                    step = %step_id,
                    failure = cause.name(),
                    error = %cause,
                    "Non-retryable failure, giving up"
                );
                self.events.publish(ResilienceEvent::StepFailed {
                    step_id: step_id.clone(),
                    attempts: attempt + 1,
                    user_message: user_facing_message(&cause).to_string(),
                    timestamp: Utc::now(),
                });
                return Err(TerminalError::NonRetryable {
                    cause,
                    conversation,
                });
            };

            warn!(
                step = %step_id,
                attempt,
                kind = %retryable.kind,
                error = %failure,
                "Stream attempt failed"
            );
            self.events.publish(ResilienceEvent::AttemptFailed {
                step_id: step_id.clone(),
                attempt,
                kind: retryable.kind,
                message: failure.message().to_string(),
                timestamp: Utc::now(),
            });

            if attempt + 1 > self.max_attempts {
                let user_message = user_facing_message(&retryable.original_cause);
                error!(
                    step = %step_id,
                    attempts = attempt + 1,
                    kind = %retryable.kind,
                    "Max retries reached"
                );
                self.events.publish(ResilienceEvent::StepFailed {
                    step_id: step_id.clone(),
                    attempts: attempt + 1,
                    user_message: user_message.to_string(),
                    timestamp: Utc::now(),
                });
                return Err(TerminalError::Exhausted {
                    user_message,
                    last_error: Box::new(retryable),
                    attempts: attempt + 1,
                    conversation,
                });
            }

            let strategy = strategy_for(&retryable);
            debug!(
                step = %step_id,
                kind = %retryable.kind,
                remove_last_assistant_turn = strategy.remove_last_assistant_turn,
                has_healing_message = strategy.healing_message.is_some(),
                full_cleanup = retryable.requires_full_cleanup,
                "Applying healing strategy"
            );

            if strategy.touches_messages() || retryable.requires_full_cleanup {
                let healed = repair(&conversation, &strategy, &retryable);
                if healed != conversation {
                    self.events.publish(ResilienceEvent::HealingApplied {
                        step_id: step_id.clone(),
                        kind: retryable.kind,
                        messages_before: conversation.len(),
                        messages_after: healed.len(),
                        timestamp: Utc::now(),
                    });
                    conversation = healed;
                    self.flush(&step_id, &conversation).await;
                }
            }

            let delay = self.backoff.delay(attempt, strategy.backoff_multiplier);
            info!(
                step = %step_id,
                attempt = attempt + 1,
                backoff_ms = delay.as_millis() as u64,
                "Retrying after backoff"
            );
            self.events.publish(ResilienceEvent::RetryScheduled {
                step_id: step_id.clone(),
                attempt: attempt + 1,
                delay_ms: delay.as_millis() as u64,
                timestamp: Utc::now(),
            });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(step = %step_id, "Step cancelled during backoff");
                    return Ok(self.aborted(&step_id, conversation, attempt + 1, "cancelled".into()));
                }
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }

    fn aborted(
        &self,
        step_id: &StepId,
        conversation: Vec<ConversationMessage>,
        attempts: u32,
        reason: String,
    ) -> StepOutcome<R::Handle> {
        self.events.publish(ResilienceEvent::StepAborted {
            step_id: step_id.clone(),
            reason: reason.clone(),
            timestamp: Utc::now(),
        });
        StepOutcome {
            handle: None,
            conversation,
            attempts,
            completion: Completion::Aborted { reason },
        }
    }

    /// Drop the step's snapshot once it completed; a resume would otherwise
    /// restart from a stale pre-success conversation.
    async fn clear(&self, step_id: &StepId) {
        let Some(store) = &self.store else {
            return;
        };
        match store.clear(step_id).await {
            Ok(removed) => debug!(
                step = %step_id,
                removed,
                store = store.name(),
                "Cleared persisted conversation"
            ),
            Err(e) => warn!(step = %step_id, "Failed to clear persisted conversation: {e}"),
        }
    }

        async fn flush(&self, step_id: &StepId, conversation: &[ConversationMessage]) {
        let Some(store) = &self.store else {
            return;
        };
        match store.save(step_id, conversation).await {
            Ok(()) => debug!(
                step = %step_id,
                messages = conversation.len(),
                store = store.name(),
                "Flushed healed conversation"
            ),
            Err(e) => warn!(step = %step_id, "Failed to flush healed conversation: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::{ScriptedOutcome, ScriptedRuntime};
    use mendstream_core::StreamFailure;

    fn controller(script: Vec<ScriptedOutcome>) -> RetryController<ScriptedRuntime> {
        RetryController::new(ScriptedRuntime::new(script))
    }

    #[tokio::test(start_paused = true)]
    async fn first_try_success_returns_input_unchanged() {
        let input = vec![ConversationMessage::user("How many orders last week?")];
        let c = controller(vec![ScriptedOutcome::Succeed { append: vec![] }]);
        let outcome = c.run(StepRequest::new(StepId::from("s"), input.clone())).await.unwrap();
        assert_eq!(outcome.conversation, input);
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.handle.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_waits_three_times_longer() {
        let c = controller(vec![
            ScriptedOutcome::Fail { failure: StreamFailure::rate_limited(None) },
            ScriptedOutcome::Succeed { append: vec![] },
        ]);
        let start = tokio::time::Instant::now();
        let outcome = c.run(StepRequest::new(StepId::from("s"), vec![])).await.unwrap();
        assert_eq!(outcome.attempts, 2);
        let waited = start.elapsed();
        assert!(waited >= std::time::Duration::from_millis(3000));
        assert!(waited < std::time::Duration::from_millis(3100));
    }

    #[tokio::test(start_paused = true)]
    async fn abort_signal_is_success() {
        let c = controller(vec![ScriptedOutcome::Abort {
            append: vec![ConversationMessage::assistant_text("done")],
            reason: "doneTool".into(),
        }]);
        let outcome = c.run(StepRequest::new(StepId::from("s"), vec![])).await.unwrap();
        assert!(outcome.is_aborted());
        assert!(outcome.handle.is_none());
        assert_eq!(outcome.conversation.len(), 1);
        assert_eq!(c.runtime().call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_max_attempts_fails_after_one_call() {
        let c = controller(vec![ScriptedOutcome::Fail { failure: StreamFailure::http(503, "down") }])
            .with_max_attempts(0);
        let err = c.run(StepRequest::new(StepId::from("s"), vec![])).await.unwrap_err();
        assert!(matches!(err, TerminalError::Exhausted { attempts: 1, .. }));
        assert_eq!(c.runtime().call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_overloaded_status_triggers_cleanup() {
        let orphan = ConversationMessage::assistant(vec![mendstream_core::MessagePart::tool_call(
            "x",
            "executeSql",
            serde_json::json!({}),
        )]);
        let c = controller(vec![
            ScriptedOutcome::Fail { failure: StreamFailure::http(503, "Service Unavailable") },
            ScriptedOutcome::Succeed { append: vec![] },
        ])
        .with_classifier(Classifier::new(ClassifierOptions {
            overloaded_status: 503,
            ..ClassifierOptions::default()
        }));
        let outcome = c.run(StepRequest::new(StepId::from("s"), vec![orphan])).await.unwrap();
        assert!(outcome.conversation.is_empty());
    }
}
