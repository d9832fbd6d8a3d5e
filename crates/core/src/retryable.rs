//! Classified failures and the repair plans derived from them.

use crate::failure::StreamFailure;
use crate::message::ConversationMessage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of failure classes that can be healed and retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetryableErrorKind {
    NoSuchTool,
    InvalidToolArguments,
    EmptyResponse,
    JsonParseError,
    NetworkTimeout,
    ServerError,
    RateLimit,
    OverloadedError,
    ToolExecutionFailed,
    UnknownError,
}

impl RetryableErrorKind {
    pub const ALL: [RetryableErrorKind; 10] = [
        Self::NoSuchTool,
        Self::InvalidToolArguments,
        Self::EmptyResponse,
        Self::JsonParseError,
        Self::NetworkTimeout,
        Self::ServerError,
        Self::RateLimit,
        Self::OverloadedError,
        Self::ToolExecutionFailed,
        Self::UnknownError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoSuchTool => "no-such-tool",
            Self::InvalidToolArguments => "invalid-tool-arguments",
            Self::EmptyResponse => "empty-response",
            Self::JsonParseError => "json-parse-error",
            Self::NetworkTimeout => "network-timeout",
            Self::ServerError => "server-error",
            Self::RateLimit => "rate-limit",
            Self::OverloadedError => "overloaded-error",
            Self::ToolExecutionFailed => "tool-execution-failed",
            Self::UnknownError => "unknown-error",
        }
    }

    /// Kinds whose healing message is a tool result addressed to the failed call.
    pub fn is_tool_level(&self) -> bool {
        matches!(
            self,
            Self::NoSuchTool | Self::InvalidToolArguments | Self::ToolExecutionFailed
        )
    }

    /// Transient transport-side kinds that leave the conversation untouched.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NetworkTimeout | Self::ServerError | Self::RateLimit | Self::OverloadedError
        )
    }
}

impl std::fmt::Display for RetryableErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure the resilience layer knows how to heal.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{kind}: {original_cause}")]
pub struct RetryableError {
    pub kind: RetryableErrorKind,
    #[source]
    pub original_cause: StreamFailure,
    /// Synthetic turn offered to the model so it can continue.
    pub healing_message: Option<ConversationMessage>,
    /// Sweep every orphaned tool call before the next attempt.
    pub requires_full_cleanup: bool,
}

impl RetryableError {
    pub fn new(kind: RetryableErrorKind, original_cause: StreamFailure) -> Self {
        Self {
            kind,
            original_cause,
            healing_message: None,
            requires_full_cleanup: false,
        }
    }

    pub fn with_healing_message(mut self, message: ConversationMessage) -> Self {
        self.healing_message = Some(message);
        self
    }

    pub fn with_full_cleanup(mut self) -> Self {
        self.requires_full_cleanup = true;
        self
    }

    /// The `{error: ...}` text of a tool-result healing message, if any.
    pub fn healing_error_text(&self) -> Option<&str> {
        let Some(ConversationMessage::Tool { content }) = &self.healing_message else {
            return None;
        };
        content.iter().find_map(|part| match part {
            crate::message::MessagePart::ToolResult { result, .. } => {
                result.get("error").and_then(|e| e.as_str())
            }
            _ => None,
        })
    }
}

/// How to repair the conversation before the next attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealingStrategy {
    pub remove_last_assistant_turn: bool,
    pub healing_message: Option<ConversationMessage>,
    pub backoff_multiplier: u32,
}

impl HealingStrategy {
    /// Leave the conversation alone and just wait longer.
    pub fn wait_only(backoff_multiplier: u32) -> Self {
        Self {
            remove_last_assistant_turn: false,
            healing_message: None,
            backoff_multiplier,
        }
    }

    /// Whether applying this strategy can change the conversation.
    pub fn touches_messages(&self) -> bool {
        self.remove_last_assistant_turn || self.healing_message.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessagePart;

    #[test]
    fn kind_names_are_kebab_case() {
        assert_eq!(RetryableErrorKind::NoSuchTool.to_string(), "no-such-tool");
        let json = serde_json::to_string(&RetryableErrorKind::OverloadedError).unwrap();
        assert_eq!(json, "\"overloaded-error\"");
    }

    #[test]
    fn kind_groups() {
        let tool_level: Vec<_> = RetryableErrorKind::ALL
            .iter()
            .filter(|k| k.is_tool_level())
            .collect();
        assert_eq!(tool_level.len(), 3);
        assert!(RetryableErrorKind::RateLimit.is_transient());
        assert!(!RetryableErrorKind::EmptyResponse.is_transient());
    }

    #[test]
    fn healing_error_text_reads_tool_payload() {
        let err = RetryableError::new(
            RetryableErrorKind::ToolExecutionFailed,
            StreamFailure::tool_execution("executeSql", "c1", "boom"),
        )
        .with_healing_message(ConversationMessage::tool(vec![MessagePart::tool_error(
            "c1",
            "executeSql",
            "Tool execution failed.",
        )]));
        assert_eq!(err.healing_error_text(), Some("Tool execution failed."));
    }

    #[test]
    fn display_includes_kind_and_cause() {
        let err = RetryableError::new(RetryableErrorKind::ServerError, StreamFailure::http(503, "down"));
        assert_eq!(err.to_string(), "server-error: down");
        assert!(!err.requires_full_cleanup);
    }

    #[test]
    fn wait_only_does_not_touch_messages() {
        assert!(!HealingStrategy::wait_only(2).touches_messages());
    }
}
