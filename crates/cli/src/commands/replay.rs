//! `mendstream replay`: Run a scripted scenario through the retry controller.
//!
//! Scenario file:
//! ```json
//! {
//!   "step_id": "analyst",
//!   "context": { "current_step": "preparation", "available_tools": ["executeSql"] },
//!   "messages": [{ "role": "user", "content": "..." }],
//!   "script": [{ "outcome": "fail", "failure": { "type": "api_call", "status_code": 529 } }]
//! }
//! ```

use mendstream_config::ResilienceConfig;
use mendstream_core::{ConversationMessage, StepId, WorkflowContext};
use mendstream_retry::{Backoff, RetryController, ScriptedOutcome, ScriptedRuntime, StepRequest};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_step_id")]
    pub step_id: StepId,
    #[serde(default)]
    pub context: Option<WorkflowContext>,
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
    pub script: Vec<ScriptedOutcome>,
}

fn default_step_id() -> StepId {
    StepId::from("replay")
}

pub async fn run(file: &Path, no_delay: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = ResilienceConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let scenario: Scenario = super::read_json(file)?;
    tracing::debug!(
        path = %file.display(),
        step = %scenario.step_id,
        outcomes = scenario.script.len(),
        "Loaded replay scenario"
    );
    let report = execute(scenario, &config, no_delay).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Run `scenario` and describe what happened as JSON.
pub async fn execute(
    scenario: Scenario,
    config: &ResilienceConfig,
    no_delay: bool,
) -> Result<Value, Box<dyn std::error::Error>> {
    let store = mendstream_store::from_config(&config.store)?;
    let mut controller = RetryController::from_config(
        ScriptedRuntime::new(scenario.script).with_name("replay"),
        &config.retry,
    )
    .with_store(store);
    if no_delay {
        controller = controller.with_backoff(Backoff::none());
    }

    let mut events = controller.event_bus().subscribe();
    let step_id = scenario.step_id.clone();
    let mut request = StepRequest::new(scenario.step_id, scenario.messages);
    if let Some(context) = scenario.context {
        request = request.with_context(context);
    }

    let result = controller.run(request).await;

    let mut published = Vec::new();
    while let Ok(event) = events.try_recv() {
        if event.step_id() == &step_id {
            published.push(serde_json::to_value(event.as_ref())?);
        }
    }
    let calls = controller.runtime().call_count();

    let report = match result {
        Ok(outcome) => {
            let conversation = match &outcome.handle {
                Some(stream) => stream.conversation.clone(),
                None => outcome.conversation.clone(),
            };
            json!({
                "status": if outcome.is_aborted() { "aborted" } else { "streamed" },
                "completion": outcome.completion,
                "attempts": outcome.attempts,
                "calls": calls,
                "conversation": conversation,
                "events": published,
            })
        }
        Err(err) => {
            let mut report = json!({
                "status": "failed",
                "error": err.to_string(),
                "user_message": err.user_message(),
                "cause": err.cause(),
                "calls": calls,
                "events": published,
            });
            report["conversation"] = serde_json::to_value(err.into_conversation())?;
            report
        }
    };
    Ok(report)
}
