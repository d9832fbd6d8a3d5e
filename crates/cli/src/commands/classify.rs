//! `mendstream classify`: Classify a failure and show how it would be healed.

use mendstream_config::ResilienceConfig;
use mendstream_core::{StreamFailure, WorkflowContext, WorkflowStep};
use mendstream_healing::{Classifier, ClassifierOptions, strategy_for, user_facing_message};
use serde_json::{Value, json};
use std::path::Path;

pub fn run(
    file: &Path,
    step: Option<WorkflowStep>,
    tools: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = ResilienceConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let failure: StreamFailure = super::read_json(file)?;
    let context = workflow_context(step, tools);
    let classifier = Classifier::new(ClassifierOptions {
        overloaded_status: config.retry.overloaded_status,
        argument_preview_chars: config.retry.argument_preview_chars,
    });

    match report(&classifier, &failure, context.as_ref()) {
        Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
        None => {
            println!("not retryable: {} ({})", failure.name(), failure);
            println!("user message: {}", user_facing_message(&failure));
        }
    }
    Ok(())
}

/// Build the classifier's view of the workflow from the CLI flags.
pub fn workflow_context(step: Option<WorkflowStep>, tools: Vec<String>) -> Option<WorkflowContext> {
    let step = step?;
    if tools.is_empty() {
        Some(WorkflowContext::for_step(step))
    } else {
        Some(WorkflowContext::new(step, tools))
    }
}

/// The classification and repair plan for `failure`, or `None` when it is
/// not retryable.
pub fn report(
    classifier: &Classifier,
    failure: &StreamFailure,
    context: Option<&WorkflowContext>,
) -> Option<Value> {
    let retryable = classifier.classify(failure, context)?;
    let strategy = strategy_for(&retryable);
    Some(json!({
        "kind": retryable.kind,
        "requires_full_cleanup": retryable.requires_full_cleanup,
        "strategy": {
            "remove_last_assistant_turn": strategy.remove_last_assistant_turn,
            "backoff_multiplier": strategy.backoff_multiplier,
        },
        "healing_message": retryable.healing_message,
        "user_message_if_exhausted": user_facing_message(failure),
    }))
}
