//! Human-readable failure detail fed back to the model.

use mendstream_core::StreamFailure;

/// How much of a response body is quoted.
const RESPONSE_PREVIEW_CHARS: usize = 200;

/// Build the detailed description of a failure used in generic healing messages.
///
/// Starts from the failure's message and appends whatever extra context the
/// variant carries: validation errors, status, a body preview, the tool name,
/// the available tools, and the first stack frame.
pub fn describe_failure(failure: &StreamFailure) -> String {
    let mut out = failure.message().to_string();

    if let StreamFailure::InvalidToolArguments { violations, .. } = failure
        && !violations.is_empty()
    {
        out.push_str(" - Validation errors: ");
        out.push_str(&join_violations(failure));
    }

    if let StreamFailure::ApiCall {
        status_code,
        response_body,
        ..
    } = failure
    {
        if let Some(status) = status_code {
            out.push_str(&format!(" (Status: {status})"));
        }
        if let Some(body) = response_body.as_deref().filter(|b| !b.is_empty()) {
            out.push_str(" - Response: ");
            out.push_str(&body.chars().take(RESPONSE_PREVIEW_CHARS).collect::<String>());
        }
    }

    if let Some(tool) = failure.tool_name().filter(|t| !t.is_empty()) {
        out.push_str(&format!(" (Tool: {tool})"));
    }

    if let StreamFailure::NoSuchTool {
        available_tools, ..
    } = failure
    {
        out.push_str(" - Available tools: ");
        out.push_str(&available_tools.join(", "));
    }

    if let StreamFailure::Other {
        stack: Some(stack), ..
    } = failure
        && let Some(frame) = first_stack_frame(stack)
    {
        out.push_str(&format!(" (at {frame})"));
    }

    out
}

/// `path: message` pairs of an argument validation failure, joined by `; `.
pub fn join_violations(failure: &StreamFailure) -> String {
    match failure {
        StreamFailure::InvalidToolArguments { violations, .. } => violations
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("; "),
        _ => String::new(),
    }
}

fn first_stack_frame(stack: &str) -> Option<&str> {
    stack
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("at "))
        .map(str::trim)
        .filter(|frame| !frame.is_empty())
}

/// Cut `s` to at most `max` characters, marking the cut.
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push_str("...");
    out
}
