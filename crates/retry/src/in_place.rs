//! In-place healing: answer tool-level failures inside the running stream.
//!
//! Restarting the stream for a bad tool call throws away everything the model
//! produced in that attempt. When the runtime supports it, the error callback
//! can instead hand back a tool result and let the model carry on.

use chrono::Utc;
use mendstream_core::{
    ErrorCallback, ErrorVerdict, ResilienceEvent, ResilienceEventBus, StepId, StreamFailure,
    WorkflowContext,
};
use mendstream_healing::Classifier;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info};

/// Error callback that heals tool-level failures in place, within a budget.
///
/// One healer lives for a whole step, so the budget is shared across attempts.
pub struct InPlaceHealer {
    step_id: StepId,
    classifier: Classifier,
    context: Option<WorkflowContext>,
    max_heals: u32,
    used: AtomicU32,
    events: Option<Arc<ResilienceEventBus>>,
}

impl InPlaceHealer {
    pub fn new(step_id: StepId, classifier: Classifier, max_heals: u32) -> Self {
        Self {
            step_id,
            classifier,
            context: None,
            max_heals,
            used: AtomicU32::new(0),
            events: None,
        }
    }

    pub fn with_context(mut self, context: Option<WorkflowContext>) -> Self {
        self.context = context;
        self
    }

    pub fn with_event_bus(mut self, events: Arc<ResilienceEventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// In-place heals handed out so far.
    pub fn heals_used(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }

    fn reserve(&self) -> bool {
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_heals).then_some(n + 1)
            })
            .is_ok()
    }
}

impl ErrorCallback for InPlaceHealer {
    fn on_error(&self, failure: &StreamFailure) -> ErrorVerdict {
        let Some(error) = self.classifier.classify(failure, self.context.as_ref()) else {
            return ErrorVerdict::Abort;
        };

        if error.kind.is_tool_level()
            && let Some(text) = error.healing_error_text()
        {
            if self.reserve() {
                info!(
                    step = %self.step_id,
                    kind = %error.kind,
                    tool = failure.tool_name().unwrap_or("unknown"),
                    heals_used = self.heals_used(),
                    "Healing tool failure in place"
                );
                if let Some(events) = &self.events {
                    events.publish(ResilienceEvent::HealedInPlace {
                        step_id: self.step_id.clone(),
                        kind: error.kind,
                        tool_name: failure.tool_name().map(str::to_string),
                        timestamp: Utc::now(),
                    });
                }
                return ErrorVerdict::HealInPlace(serde_json::json!({ "error": text }));
            }
            debug!(
                step = %self.step_id,
                max_heals = self.max_heals,
                "In-place heal budget exhausted, restarting instead"
            );
        }

        ErrorVerdict::Restart(Box::new(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mendstream_core::{RetryableErrorKind, WorkflowStep};

    fn healer(max: u32) -> InPlaceHealer {
        InPlaceHealer::new(StepId::from("s"), Classifier::default(), max)
    }

    #[test]
    fn tool_failures_heal_until_budget_runs_out() {
        let h = healer(2);
        let failure = StreamFailure::tool_execution("executeSql", "c1", "boom");
        assert!(matches!(h.on_error(&failure), ErrorVerdict::HealInPlace(_)));
        assert!(matches!(h.on_error(&failure), ErrorVerdict::HealInPlace(_)));
        match h.on_error(&failure) {
            ErrorVerdict::Restart(err) => assert_eq!(err.kind, RetryableErrorKind::ToolExecutionFailed),
            other => panic!("expected restart, got {other:?}"),
        }
        assert_eq!(h.heals_used(), 2);
    }

    #[test]
    fn heal_payload_is_error_object() {
        let h = healer(1).with_context(Some(WorkflowContext::for_step(WorkflowStep::Execution)));
        let verdict = h.on_error(&StreamFailure::no_such_tool("executeSql", "c1", vec![]));
        let ErrorVerdict::HealInPlace(value) = verdict else {
            panic!("expected in-place heal");
        };
        let text = value["error"].as_str().unwrap();
        assert!(text.contains("\"executeSql\" is not available"));
        assert!(text.contains("createMetrics"));
    }

    #[test]
    fn transport_failures_restart() {
        let h = healer(3);
        assert!(matches!(h.on_error(&StreamFailure::http(503, "down")), ErrorVerdict::Restart(_)));
        assert_eq!(h.heals_used(), 0);
    }

    #[test]
    fn non_retryable_and_abort_stop() {
        let h = healer(3);
        assert_eq!(h.on_error(&StreamFailure::LoadApiKey { message: "x".into() }), ErrorVerdict::Abort);
        assert_eq!(h.on_error(&StreamFailure::aborted("doneTool")), ErrorVerdict::Abort);
    }

    #[tokio::test]
    async fn publishes_healed_in_place() {
        let bus = Arc::new(ResilienceEventBus::new(8));
        let mut rx = bus.subscribe();
        let h = healer(1).with_event_bus(bus);
        h.on_error(&StreamFailure::invalid_arguments("executeSql", "c1", vec![]));
        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event.as_ref(),
            ResilienceEvent::HealedInPlace { kind: RetryableErrorKind::InvalidToolArguments, .. }
        ));
    }
}
