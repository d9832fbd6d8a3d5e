//! Healing strategy selection: a pure lookup from error kind to repair plan.

use mendstream_core::{HealingStrategy, RetryableError, RetryableErrorKind};
use serde::Serialize;

/// The kind-level half of a strategy, before a concrete message is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StrategyPlan {
    pub remove_last_assistant_turn: bool,
    /// Whether the error's healing message is carried into the strategy.
    pub appends_healing_message: bool,
    pub backoff_multiplier: u32,
}

/// The repair plan for a kind.
pub fn plan_for(kind: RetryableErrorKind) -> StrategyPlan {
    use RetryableErrorKind::*;
    let (remove_last_assistant_turn, appends_healing_message, backoff_multiplier) = match kind {
        NoSuchTool | InvalidToolArguments | ToolExecutionFailed => (false, true, 1),
        EmptyResponse | JsonParseError => (true, true, 1),
        NetworkTimeout | ServerError => (false, false, 2),
        RateLimit => (false, false, 3),
        OverloadedError => (false, false, 2),
        UnknownError => (false, true, 1),
    };
    StrategyPlan {
        remove_last_assistant_turn,
        appends_healing_message,
        backoff_multiplier,
    }
}

/// The full strategy for a classified error.
pub fn strategy_for(error: &RetryableError) -> HealingStrategy {
    let plan = plan_for(error.kind);
    if error.kind.is_transient() {
        return HealingStrategy::wait_only(plan.backoff_multiplier);
    }
    HealingStrategy {
        remove_last_assistant_turn: plan.remove_last_assistant_turn,
        healing_message: if plan.appends_healing_message {
            error.healing_message.clone()
        } else {
            None
        },
        backoff_multiplier: plan.backoff_multiplier,
    }
}
