//! Message repairer: applies a healing strategy to a conversation.
//!
//! Repair never edits the input in place. It returns a new conversation in
//! which the malformed trailing turn is gone, the healing message sits where
//! the model expects it, and (for overload failures) no assistant turn is left
//! with an unanswered tool call.

use mendstream_core::message::has_result_after;
use mendstream_core::message::has_result_anywhere;
use mendstream_core::{
    ConversationMessage, HealingStrategy, MessagePart, RetryableError, RetryableErrorKind,
};
use serde::Serialize;
use tracing::debug;

/// An orphaned call the healing result should answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanLocation {
    /// Index of the assistant turn holding the call.
    pub index: usize,
    pub tool_call_id: String,
}

/// Find the orphaned call to `tool_name` closest to the end of the conversation.
///
/// Scans assistant turns backward and, within a turn, calls in order; the
/// first call to `tool_name` with no later result wins.
pub fn find_orphaned_call(messages: &[ConversationMessage], tool_name: &str) -> Option<OrphanLocation> {
    messages.iter().enumerate().rev().find_map(|(index, message)| {
        message
            .tool_calls()
            .find(|(id, name)| *name == tool_name && !has_result_after(messages, index, id))
            .map(|(id, _)| OrphanLocation {
                index,
                tool_call_id: id.to_string(),
            })
    })
}

/// The same healing message with its tool results readdressed to `tool_call_id`.
pub fn readdress(message: &ConversationMessage, tool_call_id: &str) -> ConversationMessage {
    match message {
        ConversationMessage::Tool { content } => ConversationMessage::tool(
            content
                .iter()
                .map(|part| match part {
                    MessagePart::ToolResult {
                        tool_name, result, ..
                    } => MessagePart::tool_result(tool_call_id, tool_name.clone(), result.clone()),
                    other => other.clone(),
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Drop the last assistant turn. If a tool turn follows it, everything from
/// the assistant turn on goes too. Returns whether anything was removed.
pub fn remove_last_assistant_turn(messages: &mut Vec<ConversationMessage>) -> bool {
    let Some(index) = messages.iter().rposition(ConversationMessage::is_assistant) else {
        return false;
    };
    if messages[index + 1..].iter().any(ConversationMessage::is_tool) {
        messages.truncate(index);
    } else {
        messages.remove(index);
    }
    true
}

/// Remove every assistant turn that has a tool call answered nowhere in the
/// conversation. A turn with any unanswered call is dropped whole. Results
/// with no call are left where they are. Returns the number of turns removed.
pub fn sweep_orphaned_calls(messages: &mut Vec<ConversationMessage>) -> usize {
    let snapshot: &[ConversationMessage] = messages;
    let doomed: Vec<bool> = snapshot
        .iter()
        .map(|m| m.tool_calls().any(|(id, _)| !has_result_anywhere(snapshot, id)))
        .collect();
    let before = messages.len();
    let mut flags = doomed.into_iter();
    messages.retain(|_| !flags.next().unwrap_or(false));
    before - messages.len()
}

/// Apply `strategy` for `error` to `messages`.
pub fn repair(
    messages: &[ConversationMessage],
    strategy: &HealingStrategy,
    error: &RetryableError,
) -> Vec<ConversationMessage> {
    let mut out = messages.to_vec();

    if strategy.remove_last_assistant_turn {
        let removed = remove_last_assistant_turn(&mut out);
        debug!(removed, remaining = out.len(), "Removed last assistant turn");
    }

    if let Some(healing) = &strategy.healing_message {
        let located = match (error.kind, error.original_cause.tool_name()) {
            (RetryableErrorKind::NoSuchTool, Some(tool_name)) => find_orphaned_call(&out, tool_name),
            _ => None,
        };
        match located {
            Some(orphan) => {
                debug!(
                    tool_call_id = %orphan.tool_call_id,
                    index = orphan.index,
                    "Found orphaned tool call, inserting healing result after it"
                );
                out.insert(orphan.index + 1, readdress(healing, &orphan.tool_call_id));
            }
            None => out.push(healing.clone()),
        }
    }

    if error.requires_full_cleanup {
        let removed = sweep_orphaned_calls(&mut out);
        debug!(removed, remaining = out.len(), "Swept assistant turns with orphaned tool calls");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{classify, strategy_for};
    use mendstream_core::message::is_well_paired;
    use mendstream_core::StreamFailure;
    use serde_json::json;

    fn call(id: &str, name: &str) -> ConversationMessage {
        ConversationMessage::assistant(vec![MessagePart::tool_call(id, name, json!({}))])
    }

    fn result(id: &str, name: &str) -> ConversationMessage {
        ConversationMessage::tool(vec![MessagePart::tool_result(id, name, json!({"ok": true}))])
    }

    fn heal(messages: &[ConversationMessage], failure: StreamFailure) -> Vec<ConversationMessage> {
        let err = classify(&failure, None).unwrap();
        repair(messages, &strategy_for(&err), &err)
    }

    #[test]
    fn empty_input_is_noop_except_append() {
        let out = heal(&[], StreamFailure::http(503, "down"));
        assert!(out.is_empty());
        let out = heal(&[], StreamFailure::EmptyResponseBody { message: String::new() });
        assert_eq!(out, vec![ConversationMessage::user("Please continue.")]);
    }

    #[test]
    fn remove_last_assistant_turn_only() {
        let mut messages = vec![
            ConversationMessage::user("q"),
            ConversationMessage::assistant_text("partial"),
            ConversationMessage::user("stray"),
        ];
        assert!(remove_last_assistant_turn(&mut messages));
        assert_eq!(messages, vec![ConversationMessage::user("q"), ConversationMessage::user("stray")]);
        assert!(!remove_last_assistant_turn(&mut vec![ConversationMessage::user("q")]));
    }

    #[test]
    fn remove_last_assistant_turn_with_trailing_results() {
        let mut messages = vec![
            ConversationMessage::user("q"),
            call("a", "executeSql"),
            result("a", "executeSql"),
            ConversationMessage::user("more"),
        ];
        remove_last_assistant_turn(&mut messages);
        assert_eq!(messages, vec![ConversationMessage::user("q")]);
    }

    #[test]
    fn json_parse_drops_bad_turn_and_asks_again() {
        let messages = vec![ConversationMessage::user("q"), ConversationMessage::assistant_text("{oops")];
        let out = heal(&messages, StreamFailure::JsonParse { text: "{oops".into(), message: "bad".into() });
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], ConversationMessage::user("q"));
        assert!(out[1].text().unwrap().contains("proper formatting"));
    }

    #[test]
    fn no_such_tool_inserted_after_orphan_not_at_end() {
        let messages = vec![
            ConversationMessage::user("q"),
            call("A", "executeSql"),
            result("A", "executeSql"),
            call("B", "createDashboards"),
            ConversationMessage::user("later turn"),
        ];
        let out = heal(&messages, StreamFailure::no_such_tool("createDashboards", "placeholder", vec![]));
        assert_eq!(out.len(), 6);
        assert!(out[4].has_tool_result("B"));
        assert_eq!(out[5], ConversationMessage::user("later turn"));
        assert!(is_well_paired(&out));
    }

    #[test]
    fn orphan_search_prefers_closest_to_end() {
        let messages = vec![
            call("old", "createDashboards"),
            call("new", "createDashboards"),
        ];
        let found = find_orphaned_call(&messages, "createDashboards").unwrap();
        assert_eq!(found, OrphanLocation { index: 1, tool_call_id: "new".into() });
        assert!(find_orphaned_call(&messages, "executeSql").is_none());
    }

    #[test]
    fn answered_calls_are_not_orphans() {
        let messages = vec![call("a", "createDashboards"), result("a", "createDashboards")];
        assert!(find_orphaned_call(&messages, "createDashboards").is_none());
    }

    #[test]
    fn no_orphan_found_appends_at_end() {
        let messages = vec![ConversationMessage::user("q")];
        let out = heal(&messages, StreamFailure::no_such_tool("createDashboards", "c9", vec![]));
        assert_eq!(out.len(), 2);
        assert!(out[1].has_tool_result("c9"));
    }

    #[test]
    fn repair_restores_pairing_for_single_orphan() {
        let messages = vec![
            ConversationMessage::user("q"),
            call("A", "executeSql"),
            result("A", "executeSql"),
            call("B", "createMetrics"),
        ];
        let out = heal(&messages, StreamFailure::no_such_tool("createMetrics", "B", vec![]));
        assert!(is_well_paired(&out));
    }

    #[test]
    fn overloaded_sweeps_every_orphaned_turn() {
        let messages = vec![call("X", "executeSql"), call("Y", "createMetrics")];
        let out = heal(&messages, StreamFailure::http(529, "Overloaded"));
        assert!(out.is_empty());
    }

    #[test]
    fn sweep_drops_whole_multi_call_turn_and_keeps_stray_results() {
        let mut messages = vec![
            ConversationMessage::user("q"),
            ConversationMessage::assistant(vec![
                MessagePart::tool_call("a", "executeSql", json!({})),
                MessagePart::tool_call("b", "executeSql", json!({})),
            ]),
            result("a", "executeSql"),
            result("ghost", "executeSql"),
        ];
        assert_eq!(sweep_orphaned_calls(&mut messages), 1);
        assert_eq!(messages.len(), 3);
        assert!(messages[2].has_tool_result("ghost"));
    }

    #[test]
    fn sweep_tolerates_results_before_calls() {
        let mut messages = vec![result("a", "executeSql"), call("a", "executeSql")];
        assert_eq!(sweep_orphaned_calls(&mut messages), 0);
    }

    #[test]
    fn repair_does_not_touch_input() {
        let messages = vec![ConversationMessage::user("q"), ConversationMessage::assistant_text("")];
        let snapshot = messages.clone();
        let _ = heal(&messages, StreamFailure::NoContentGenerated { message: String::new() });
        assert_eq!(messages, snapshot);
    }
}
