//! A runtime that plays back a fixed script instead of calling a model.
//!
//! Used by `mendstream replay` and by the scenario tests: each call consumes
//! the next outcome, and the last outcome repeats once the script runs out.

use async_trait::async_trait;
use mendstream_core::{
    AttemptContext, AttemptFailure, ConversationMessage, ErrorVerdict, MessagePart,
    StreamFailure, StreamRuntime,
};
use mendstream_healing::find_orphaned_call;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

/// What one scripted attempt does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScriptedOutcome {
    /// The stream completes, producing `append`.
    Succeed {
        #[serde(default)]
        append: Vec<ConversationMessage>,
    },
    /// The stream fails before producing anything.
    Fail { failure: StreamFailure },
    /// The stream produces `append`, then hits `failure`.
    FailMidStream {
        #[serde(default)]
        append: Vec<ConversationMessage>,
        failure: StreamFailure,
    },
    /// The model finishes on purpose after producing `append`.
    Abort {
        #[serde(default)]
        append: Vec<ConversationMessage>,
        #[serde(default)]
        reason: String,
    },
}

/// The handle a scripted stream hands back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptedStream {
    /// Input plus everything the stream produced (including in-place heals).
    pub conversation: Vec<ConversationMessage>,
}

pub struct ScriptedRuntime {
    name: String,
    script: Vec<ScriptedOutcome>,
    cursor: AtomicUsize,
    calls: Mutex<Vec<Vec<ConversationMessage>>>,
}

impl ScriptedRuntime {
    pub fn new(script: Vec<ScriptedOutcome>) -> Self {
        Self {
            name: "scripted".into(),
            script,
            cursor: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A runtime that returns `outcome` on every call.
    pub fn repeating(outcome: ScriptedOutcome) -> Self {
        Self::new(vec![outcome])
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of times `stream` was called.
    pub fn call_count(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    /// The conversation each call was started with, in order.
    pub async fn calls(&self) -> Vec<Vec<ConversationMessage>> {
        self.calls.lock().await.clone()
    }

    fn next_outcome(&self) -> ScriptedOutcome {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        match self.script.len() {
            0 => ScriptedOutcome::Succeed { append: vec![] },
            len => self.script[index.min(len - 1)].clone(),
        }
    }
}

#[async_trait]
impl StreamRuntime for ScriptedRuntime {
    type Handle = ScriptedStream;

    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(
        &self,
        messages: &[ConversationMessage],
        ctx: &AttemptContext,
    ) -> std::result::Result<ScriptedStream, AttemptFailure> {
        self.calls.lock().await.push(messages.to_vec());
        let outcome = self.next_outcome();
        debug!(step = %ctx.step_id, attempt = ctx.attempt, ?outcome, "Scripted attempt");

        let mut conversation = messages.to_vec();
        match outcome {
            ScriptedOutcome::Succeed { append } => {
                conversation.extend(append);
                Ok(ScriptedStream { conversation })
            }
            ScriptedOutcome::Fail { failure } => Err(AttemptFailure::new(failure)),
            ScriptedOutcome::Abort { append, reason } => {
                conversation.extend(append);
                Err(AttemptFailure::new(StreamFailure::aborted(reason)).with_accumulated(conversation))
            }
            ScriptedOutcome::FailMidStream { append, failure } => {
                conversation.extend(append);
                match ctx.report(&failure) {
                    ErrorVerdict::HealInPlace(result) => {
                        conversation.push(in_place_result(&conversation, &failure, result));
                        Ok(ScriptedStream { conversation })
                    }
                    ErrorVerdict::Restart(_) | ErrorVerdict::Abort => {
                        Err(AttemptFailure::new(failure).with_accumulated(conversation))
                    }
                }
            }
        }
    }
}

/// The tool turn a runtime injects when the callback heals in place.
fn in_place_result(
    conversation: &[ConversationMessage],
    failure: &StreamFailure,
    result: serde_json::Value,
) -> ConversationMessage {
    let tool_name = failure.tool_name().unwrap_or("unknown");
    let tool_call_id = find_orphaned_call(conversation, tool_name)
        .map(|orphan| orphan.tool_call_id)
        .or_else(|| failure.tool_call_id().map(str::to_string))
        .unwrap_or_else(|| "unknown".into());
    ConversationMessage::tool(vec![MessagePart::tool_result(tool_call_id, tool_name, result)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use mendstream_core::{NoHealing, StepId};
    use serde_json::json;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn ctx() -> AttemptContext {
        AttemptContext::new(StepId::from("s"), 0, CancellationToken::new(), Arc::new(NoHealing))
    }

    #[tokio::test]
    async fn last_outcome_repeats() {
        let runtime = ScriptedRuntime::new(vec![
            ScriptedOutcome::Fail { failure: StreamFailure::http(503, "down") },
            ScriptedOutcome::Succeed { append: vec![ConversationMessage::assistant_text("hi")] },
        ]);
        let input = vec![ConversationMessage::user("q")];
        assert!(runtime.stream(&input, &ctx()).await.is_err());
        let ok = runtime.stream(&input, &ctx()).await.unwrap();
        assert_eq!(ok.conversation.len(), 2);
        assert!(runtime.stream(&input, &ctx()).await.is_ok());
        assert_eq!(runtime.call_count(), 3);
        assert_eq!(runtime.calls().await.len(), 3);
    }

    #[tokio::test]
    async fn mid_stream_failure_returns_accumulated() {
        let runtime = ScriptedRuntime::repeating(ScriptedOutcome::FailMidStream {
            append: vec![ConversationMessage::assistant(vec![MessagePart::tool_call(
                "c1",
                "createDashboards",
                json!({}),
            )])],
            failure: StreamFailure::no_such_tool("createDashboards", "c1", vec![]),
        });
        let err = runtime
            .stream(&[ConversationMessage::user("q")], &ctx())
            .await
            .unwrap_err();
        assert_eq!(err.accumulated.map(|m| m.len()), Some(2));
    }

    #[test]
    fn outcomes_deserialize() {
        let script: Vec<ScriptedOutcome> = serde_json::from_value(json!([
            { "outcome": "fail", "failure": { "type": "api_call", "status_code": 429 } },
            { "outcome": "abort", "reason": "doneTool" },
            { "outcome": "succeed" }
        ]))
        .unwrap();
        assert_eq!(script.len(), 3);
        assert!(matches!(script[2], ScriptedOutcome::Succeed { ref append } if append.is_empty()));
    }
}
