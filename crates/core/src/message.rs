//! Conversation message model.
//!
//! A conversation is an ordered `Vec<ConversationMessage>`. Assistant and tool
//! turns carry ordered parts; every tool call may be answered by at most one
//! later tool result carrying the same `tool_call_id`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Identifier of one workflow step's conversation (the persistence key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub String);

impl StepId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl From<&str> for StepId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for StepId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Default for StepId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One typed part of an assistant or tool turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    Text {
        text: String,
    },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        #[serde(default)]
        args: serde_json::Value,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        result: serde_json::Value,
    },
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_call(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: serde_json::Value,
    ) -> Self {
        Self::ToolCall {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            args,
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        result: serde_json::Value,
    ) -> Self {
        Self::ToolResult {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            result,
        }
    }

    /// A tool result whose payload is `{"error": message}`.
    pub fn tool_error(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::tool_result(
            tool_call_id,
            tool_name,
            serde_json::json!({ "error": message.into() }),
        )
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(self, Self::ToolCall { .. })
    }

    /// The id of a tool call or tool result part.
    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Self::ToolCall { tool_call_id, .. } | Self::ToolResult { tool_call_id, .. } => {
                Some(tool_call_id)
            }
            Self::Text { .. } => None,
        }
    }
}

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ConversationMessage {
    System { content: String },
    User { content: String },
    Assistant { content: Vec<MessagePart> },
    Tool { content: Vec<MessagePart> },
}

impl ConversationMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn assistant(parts: Vec<MessagePart>) -> Self {
        Self::Assistant { content: parts }
    }

    /// An assistant turn holding a single text part.
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: vec![MessagePart::text(text)],
        }
    }

    pub fn tool(parts: Vec<MessagePart>) -> Self {
        Self::Tool { content: parts }
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self, Self::Assistant { .. })
    }

    pub fn is_tool(&self) -> bool {
        matches!(self, Self::Tool { .. })
    }

    /// Typed parts of an assistant or tool turn; empty for text-only roles.
    pub fn parts(&self) -> &[MessagePart] {
        match self {
            Self::Assistant { content } | Self::Tool { content } => content,
            Self::System { .. } | Self::User { .. } => &[],
        }
    }

    /// Plain text of a system or user turn.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::System { content } | Self::User { content } => Some(content),
            Self::Assistant { .. } | Self::Tool { .. } => None,
        }
    }

    /// `(tool_call_id, tool_name)` of every tool call in an assistant turn.
    pub fn tool_calls(&self) -> impl Iterator<Item = (&str, &str)> {
        let parts: &[MessagePart] = match self {
            Self::Assistant { content } => content,
            _ => &[],
        };
        parts.iter().filter_map(|p| match p {
            MessagePart::ToolCall {
                tool_call_id,
                tool_name,
                ..
            } => Some((tool_call_id.as_str(), tool_name.as_str())),
            _ => None,
        })
    }

    /// Whether this is a tool turn answering `tool_call_id`.
    pub fn has_tool_result(&self, tool_call_id: &str) -> bool {
        match self {
            Self::Tool { content } => content.iter().any(|p| {
                matches!(p, MessagePart::ToolResult { tool_call_id: id, .. } if id == tool_call_id)
            }),
            _ => false,
        }
    }

    /// Rough size estimate (4 chars ≈ 1 token), used for logging.
    pub fn estimated_tokens(&self) -> usize {
        match self {
            Self::System { content } | Self::User { content } => content.len() / 4,
            Self::Assistant { content } | Self::Tool { content } => content
                .iter()
                .map(|p| match p {
                    MessagePart::Text { text } => text.len(),
                    MessagePart::ToolCall { args, .. } => args.to_string().len(),
                    MessagePart::ToolResult { result, .. } => result.to_string().len(),
                })
                .sum::<usize>()
                / 4,
        }
    }
}

/// Where a tool call sits in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolCallLocation {
    pub message_index: usize,
    pub tool_call_id: String,
    pub tool_name: String,
}

/// Whether any tool turn after `index` answers `tool_call_id`.
pub fn has_result_after(messages: &[ConversationMessage], index: usize, tool_call_id: &str) -> bool {
    messages
        .iter()
        .skip(index + 1)
        .any(|m| m.has_tool_result(tool_call_id))
}

/// Whether any tool turn in the conversation answers `tool_call_id`.
pub fn has_result_anywhere(messages: &[ConversationMessage], tool_call_id: &str) -> bool {
    messages.iter().any(|m| m.has_tool_result(tool_call_id))
}

/// Every tool call that has no matching result later in the conversation.
pub fn orphaned_tool_calls(messages: &[ConversationMessage]) -> Vec<ToolCallLocation> {
    messages
        .iter()
        .enumerate()
        .flat_map(|(i, m)| {
            m.tool_calls()
                .filter(move |(id, _)| !has_result_after(messages, i, id))
                .map(move |(id, name)| ToolCallLocation {
                    message_index: i,
                    tool_call_id: id.to_string(),
                    tool_name: name.to_string(),
                })
        })
        .collect()
}

/// A breach of the call/result pairing invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PairingViolation {
    /// A tool call nobody answered.
    UnansweredCall(ToolCallLocation),
    /// A second result for a call that was already answered.
    DuplicateResult {
        tool_call_id: String,
        message_index: usize,
    },
    /// A result with no call before it.
    ResultWithoutCall {
        tool_call_id: String,
        message_index: usize,
    },
}

/// Scan the conversation front to back and report every pairing breach.
pub fn pairing_violations(messages: &[ConversationMessage]) -> Vec<PairingViolation> {
    let mut calls: Vec<ToolCallLocation> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut answered: HashSet<&str> = HashSet::new();
    let mut violations = Vec::new();

    for (i, message) in messages.iter().enumerate() {
        match message {
            ConversationMessage::Assistant { content } => {
                for part in content {
                    if let MessagePart::ToolCall {
                        tool_call_id,
                        tool_name,
                        ..
                    } = part
                        && seen.insert(tool_call_id.as_str())
                    {
                        calls.push(ToolCallLocation {
                            message_index: i,
                            tool_call_id: tool_call_id.clone(),
                            tool_name: tool_name.clone(),
                        });
                    }
                }
            }
            ConversationMessage::Tool { content } => {
                for part in content {
                    let MessagePart::ToolResult { tool_call_id, .. } = part else {
                        continue;
                    };
                    if !seen.contains(tool_call_id.as_str()) {
                        violations.push(PairingViolation::ResultWithoutCall {
                            tool_call_id: tool_call_id.clone(),
                            message_index: i,
                        });
                    } else if !answered.insert(tool_call_id.as_str()) {
                        violations.push(PairingViolation::DuplicateResult {
                            tool_call_id: tool_call_id.clone(),
                            message_index: i,
                        });
                    }
                }
            }
            ConversationMessage::System { .. } | ConversationMessage::User { .. } => {}
        }
    }

    violations.extend(
        calls
            .into_iter()
            .filter(|c| !answered.contains(c.tool_call_id.as_str()))
            .map(PairingViolation::UnansweredCall),
    );
    violations
}

/// True when every call has exactly one later result and no result is stray.
pub fn is_well_paired(messages: &[ConversationMessage]) -> bool {
    pairing_violations(messages).is_empty()
}

/// Split bundled assistant turns so that each tool call is immediately
/// followed by its result.
///
/// Non-call parts of a bundled turn stay together in their own assistant turn
/// ahead of the calls. Results with no matching call are appended at the end
/// in their original order.
pub fn interleave_tool_results(messages: Vec<ConversationMessage>) -> Vec<ConversationMessage> {
    let mut results: Vec<(String, Option<MessagePart>)> = Vec::new();
    for message in &messages {
        if let ConversationMessage::Tool { content } = message {
            for part in content {
                if let MessagePart::ToolResult { tool_call_id, .. } = part {
                    results.push((tool_call_id.clone(), Some(part.clone())));
                }
            }
        }
    }

    let mut take_result = |id: &str| -> Option<MessagePart> {
        results
            .iter_mut()
            .find(|(rid, part)| rid == id && part.is_some())
            .and_then(|(_, part)| part.take())
    };

    let mut out = Vec::with_capacity(messages.len());
    for message in messages {
        match message {
            ConversationMessage::Assistant { content } if content.iter().any(|p| p.is_tool_call()) => {
                let (calls, rest): (Vec<_>, Vec<_>) =
                    content.into_iter().partition(|p| p.is_tool_call());
                if !rest.is_empty() {
                    out.push(ConversationMessage::assistant(rest));
                }
                for call in calls {
                    let result = call.tool_call_id().and_then(&mut take_result);
                    out.push(ConversationMessage::assistant(vec![call]));
                    if let Some(result) = result {
                        out.push(ConversationMessage::tool(vec![result]));
                    }
                }
            }
            ConversationMessage::Tool { content } => {
                let rest: Vec<_> = content
                    .into_iter()
                    .filter(|p| !matches!(p, MessagePart::ToolResult { .. }))
                    .collect();
                if !rest.is_empty() {
                    out.push(ConversationMessage::tool(rest));
                }
            }
            other => out.push(other),
        }
    }

    out.extend(
        results
            .into_iter()
            .filter_map(|(_, part)| part)
            .map(|part| ConversationMessage::tool(vec![part])),
    );
    out
}
