//! `mendstream inspect`: Check a conversation's tool call pairing.

use mendstream_core::ConversationMessage;
use mendstream_core::message::{
    PairingViolation, interleave_tool_results, orphaned_tool_calls, pairing_violations,
};
use std::path::Path;

pub fn run(file: &Path, interleave: bool) -> Result<(), Box<dyn std::error::Error>> {
    let messages: Vec<ConversationMessage> = super::read_json(file)?;
    if interleave {
        let interleaved = interleave_tool_results(messages);
        println!("{}", serde_json::to_string_pretty(&interleaved)?);
        return Ok(());
    }
    for line in summarize(&messages) {
        println!("{line}");
    }
    Ok(())
}

/// Human-readable report lines for `messages`.
pub fn summarize(messages: &[ConversationMessage]) -> Vec<String> {
    let tokens: usize = messages.iter().map(ConversationMessage::estimated_tokens).sum();
    let mut lines = vec![format!("{} messages, ~{tokens} tokens", messages.len())];

    let orphans = orphaned_tool_calls(messages);
    if orphans.is_empty() {
        lines.push("No orphaned tool calls".into());
    } else {
        lines.push(format!("{} orphaned tool call(s):", orphans.len()));
        for orphan in &orphans {
            lines.push(format!(
                "  [{}] {} ({})",
                orphan.message_index, orphan.tool_name, orphan.tool_call_id
            ));
        }
    }

    for violation in pairing_violations(messages) {
        match violation {
            // Already listed above
            PairingViolation::UnansweredCall(_) => {}
            PairingViolation::DuplicateResult {
                tool_call_id,
                message_index,
            } => lines.push(format!("  [{message_index}] duplicate result for {tool_call_id}")),
            PairingViolation::ResultWithoutCall {
                tool_call_id,
                message_index,
            } => lines.push(format!("  [{message_index}] result without a call: {tool_call_id}")),
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use mendstream_core::MessagePart;
    use serde_json::json;

    #[test]
    fn clean_conversation() {
        let lines = summarize(&[ConversationMessage::user("hi")]);
        assert_eq!(lines[1], "No orphaned tool calls");
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn lists_orphans_and_stray_results() {
        let messages = vec![
            ConversationMessage::assistant(vec![MessagePart::tool_call("c1", "executeSql", json!({}))]),
            ConversationMessage::tool(vec![MessagePart::tool_result("zz", "executeSql", json!(null))]),
        ];
        let lines = summarize(&messages);
        assert_eq!(lines[1], "1 orphaned tool call(s):");
        assert_eq!(lines[2], "  [0] executeSql (c1)");
        assert_eq!(lines[3], "  [1] result without a call: zz");
    }

    #[test]
    fn interleaving_clears_bundled_turn_violations() {
        let messages = vec![
            ConversationMessage::assistant(vec![
                MessagePart::tool_call("a", "executeSql", json!({})),
                MessagePart::tool_call("b", "executeSql", json!({})),
            ]),
            ConversationMessage::tool(vec![
                MessagePart::tool_result("a", "executeSql", json!(1)),
                MessagePart::tool_result("b", "executeSql", json!(2)),
            ]),
        ];
        let interleaved = interleave_tool_results(messages);
        assert_eq!(interleaved.len(), 4);
        assert!(interleaved[1].has_tool_result("a"));
        assert!(interleaved[3].has_tool_result("b"));
        assert_eq!(summarize(&interleaved)[1], "No orphaned tool calls");
    }
}
