//! Error classifier: maps a `StreamFailure` to a `RetryableError` or to "not retryable".
//!
//! The match is first-hit in a fixed order. Everything that is not on the
//! explicit non-retryable list (or the deliberate abort signal) ends up with
//! a kind, so no retryable failure leaves the loop ungoverned.

use mendstream_core::{
    ConversationMessage, MessagePart, RetryableError, RetryableErrorKind, StreamFailure,
    WorkflowContext,
};
use serde_json::Value;
use tracing::debug;

use crate::describe::{describe_failure, join_violations, truncate_chars};

pub const PLEASE_CONTINUE: &str = "Please continue.";
pub const FORMAT_ISSUE: &str =
    "There was an issue with the response format. Please try again with proper formatting.";
pub const TOOL_EXECUTION_FAILED: &str =
    "Tool execution failed. Please check your parameters and try again.";
pub const RATE_LIMITED: &str = "Rate limit reached, please wait and try again.";
pub const SERVER_UNAVAILABLE: &str = "Server temporarily unavailable, retrying...";
pub const CONNECTION_TIMEOUT: &str = "Connection timeout, please retry.";

/// The SDK's message when a step that must call a tool produced none.
const NO_TOOL_CALLS_GENERATED: &str = "No tool calls generated";

/// Placeholder id used when the failure did not carry one.
const UNKNOWN_ID: &str = "unknown";

/// Knobs of the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierOptions {
    /// HTTP status treated as "overloaded" (full cleanup).
    pub overloaded_status: u16,
    /// How many characters of invalid arguments are echoed to the model.
    pub argument_preview_chars: usize,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            overloaded_status: 529,
            argument_preview_chars: 500,
        }
    }
}

/// Stateless classifier carrying its options.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    options: ClassifierOptions,
}

impl Classifier {
    pub fn new(options: ClassifierOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ClassifierOptions {
        &self.options
    }

    /// Classify `failure`. `None` means "do not retry, propagate as is".
    pub fn classify(
        &self,
        failure: &StreamFailure,
        context: Option<&WorkflowContext>,
    ) -> Option<RetryableError> {
        let classified = self.classify_inner(failure, context);
        match &classified {
            Some(err) => debug!(
                failure = failure.name(),
                kind = %err.kind,
                full_cleanup = err.requires_full_cleanup,
                "Classified stream failure"
            ),
            None => debug!(failure = failure.name(), "Stream failure is not retryable"),
        }
        classified
    }

    fn classify_inner(
        &self,
        failure: &StreamFailure,
        context: Option<&WorkflowContext>,
    ) -> Option<RetryableError> {
        if failure.is_non_retryable() || failure.is_abort() {
            return None;
        }

        let kind_only = |kind| RetryableError::new(kind, failure.clone());

        let classified = match failure {
            StreamFailure::NoSuchTool { tool_name, .. } => {
                let text = no_such_tool_text(tool_name, context);
                kind_only(RetryableErrorKind::NoSuchTool)
                    .with_healing_message(tool_healing_message(failure, text))
            }

            StreamFailure::InvalidToolArguments { arguments, .. } => {
                let text = self.invalid_arguments_text(failure, arguments.as_ref());
                kind_only(RetryableErrorKind::InvalidToolArguments)
                    .with_healing_message(tool_healing_message(failure, text))
            }

            StreamFailure::EmptyResponseBody { .. } | StreamFailure::NoContentGenerated { .. } => {
                kind_only(RetryableErrorKind::EmptyResponse)
                    .with_healing_message(ConversationMessage::user(PLEASE_CONTINUE))
            }

            StreamFailure::Other { message, .. } if message == NO_TOOL_CALLS_GENERATED => {
                kind_only(RetryableErrorKind::EmptyResponse)
                    .with_healing_message(ConversationMessage::user(PLEASE_CONTINUE))
            }

            StreamFailure::JsonParse { .. } => kind_only(RetryableErrorKind::JsonParseError)
                .with_healing_message(ConversationMessage::user(FORMAT_ISSUE)),

            StreamFailure::ToolExecution { .. } => kind_only(RetryableErrorKind::ToolExecutionFailed)
                .with_healing_message(tool_healing_message(failure, TOOL_EXECUTION_FAILED.into())),

            StreamFailure::ApiCall {
                status_code,
                retry_after_secs,
                response_body,
                ..
            } => self.classify_transport(failure, *status_code, *retry_after_secs, response_body.as_deref()),

            StreamFailure::Retry { last_error, .. } => match last_error {
                Some(inner) => return self.classify_inner(inner, context),
                None => unknown_error(failure),
            },

            _ => unknown_error(failure),
        };

        Some(classified)
    }

    fn classify_transport(
        &self,
        failure: &StreamFailure,
        status_code: Option<u16>,
        retry_after_secs: Option<u64>,
        response_body: Option<&str>,
    ) -> RetryableError {
        if status_code == Some(self.options.overloaded_status)
            || response_body.is_some_and(is_overloaded_body)
        {
            return RetryableError::new(RetryableErrorKind::OverloadedError, failure.clone())
                .with_full_cleanup();
        }

        match status_code {
            Some(429) => {
                let text = match retry_after_secs {
                    Some(secs) => format!("Rate limit reached, please wait {secs} seconds and try again."),
                    None => RATE_LIMITED.to_string(),
                };
                RetryableError::new(RetryableErrorKind::RateLimit, failure.clone())
                    .with_healing_message(ConversationMessage::user(text))
            }
            Some(status) if (500..600).contains(&status) => {
                RetryableError::new(RetryableErrorKind::ServerError, failure.clone())
                    .with_healing_message(ConversationMessage::user(SERVER_UNAVAILABLE))
            }
            None | Some(408) => RetryableError::new(RetryableErrorKind::NetworkTimeout, failure.clone())
                .with_healing_message(ConversationMessage::user(CONNECTION_TIMEOUT)),
            Some(_) => unknown_error(failure),
        }
    }

    fn invalid_arguments_text(&self, failure: &StreamFailure, arguments: Option<&Value>) -> String {
        let details = join_violations(failure);
        let details = if details.is_empty() {
            "Invalid arguments provided".to_string()
        } else {
            details
        };
        let mut text =
            format!("Invalid tool arguments: {details}. Please check the required parameters and try again.");
        if let Some(args) = arguments
            && let Ok(rendered) = serde_json::to_string(args)
        {
            text.push_str(" Provided arguments: ");
            text.push_str(&truncate_chars(&rendered, self.options.argument_preview_chars));
        }
        text
    }
}

/// Classify with default options.
pub fn classify(failure: &StreamFailure, context: Option<&WorkflowContext>) -> Option<RetryableError> {
    Classifier::default().classify(failure, context)
}

fn no_such_tool_text(tool_name: &str, context: Option<&WorkflowContext>) -> String {
    let base = format!("Tool \"{tool_name}\" is not available in the current mode.");
    let Some(ctx) = context.filter(|c| !c.available_tools.is_empty()) else {
        return format!("{base} Please use one of the available tools instead.");
    };

    let mut text = format!(
        "{base} You are currently in the {} step. Available tools: {}.",
        ctx.current_step,
        ctx.available_tools.join(", ")
    );
    if let Some((next, tools)) = ctx.next_step_tools() {
        text.push_str(&format!(
            " Tools such as {} only become available in the {next} step, which comes after this one.",
            tools.join(", ")
        ));
    }
    text.push_str(" Please use one of the tools available in your current step.");
    text
}

/// A tool turn answering the failed call with `{"error": text}`.
fn tool_healing_message(failure: &StreamFailure, text: String) -> ConversationMessage {
    ConversationMessage::tool(vec![MessagePart::tool_error(
        failure.tool_call_id().unwrap_or(UNKNOWN_ID),
        failure.tool_name().unwrap_or(UNKNOWN_ID),
        text,
    )])
}

fn unknown_error(failure: &StreamFailure) -> RetryableError {
    let text = format!(
        "I encountered an error while processing your request: \"{}\". Please continue with the analysis, working around this issue if possible. If this is a tool-related error, please use only the available tools for the current step.",
        describe_failure(failure)
    );
    RetryableError::new(RetryableErrorKind::UnknownError, failure.clone())
        .with_healing_message(ConversationMessage::user(text))
}

/// Provider bodies of the shape `{"type": "overloaded_error"}` or
/// `{"error": {"type": "overloaded_error"}}`.
fn is_overloaded_body(body: &str) -> bool {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return false;
    };
    let is_overloaded = |v: &Value| v.get("type").and_then(Value::as_str) == Some("overloaded_error");
    is_overloaded(&value) || value.get("error").is_some_and(is_overloaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mendstream_core::{FieldViolation, PathSegment, TransportCause, WorkflowStep};
    use serde_json::json;

    fn kind_of(failure: &StreamFailure) -> Option<RetryableErrorKind> {
        classify(failure, None).map(|e| e.kind)
    }

    fn user_text(err: &RetryableError) -> &str {
        err.healing_message.as_ref().and_then(|m| m.text()).unwrap_or_default()
    }

    #[test]
    fn catalogue_maps_to_documented_kinds() {
        use RetryableErrorKind::*;
        let cases = vec![
            (StreamFailure::no_such_tool("x", "c1", vec![]), Some(NoSuchTool)),
            (StreamFailure::invalid_arguments("x", "c1", vec![]), Some(InvalidToolArguments)),
            (StreamFailure::EmptyResponseBody { message: String::new() }, Some(EmptyResponse)),
            (StreamFailure::NoContentGenerated { message: String::new() }, Some(EmptyResponse)),
            (StreamFailure::other("No tool calls generated"), Some(EmptyResponse)),
            (StreamFailure::JsonParse { text: "{".into(), message: "bad".into() }, Some(JsonParseError)),
            (StreamFailure::rate_limited(None), Some(RateLimit)),
            (StreamFailure::http(503, "Service Unavailable"), Some(ServerError)),
            (StreamFailure::http(529, "Overloaded"), Some(OverloadedError)),
            (StreamFailure::network(TransportCause::Timeout, "timed out"), Some(NetworkTimeout)),
            (StreamFailure::tool_execution("x", "c1", "boom"), Some(ToolExecutionFailed)),
            (StreamFailure::other("something odd"), Some(UnknownError)),
            (StreamFailure::LoadApiKey { message: "no key".into() }, None),
            (StreamFailure::NoSuchModel { model_id: "m".into(), message: String::new() }, None),
            (
                StreamFailure::UnsupportedFunctionality { functionality: "f".into(), message: String::new() },
                None,
            ),
            (
                StreamFailure::TooManyEmbeddingValues { max_values: 1, values: 2, message: String::new() },
                None,
            ),
            (StreamFailure::NoOutputSpecified { message: String::new() }, None),
        ];
        for (failure, expected) in cases {
            assert_eq!(kind_of(&failure), expected, "{failure:?}");
        }
    }

    #[test]
    fn abort_is_not_classified() {
        assert!(classify(&StreamFailure::aborted("doneTool"), None).is_none());
    }

    #[test]
    fn overloaded_requires_full_cleanup_and_no_message() {
        let err = classify(&StreamFailure::http(529, "Overloaded"), None).unwrap();
        assert!(err.requires_full_cleanup);
        assert!(err.healing_message.is_none());
        assert!(!classify(&StreamFailure::http(503, "x"), None).unwrap().requires_full_cleanup);
    }

    #[test]
    fn overloaded_status_is_configurable() {
        let classifier = Classifier::new(ClassifierOptions {
            overloaded_status: 503,
            ..ClassifierOptions::default()
        });
        let err = classifier.classify(&StreamFailure::http(503, "x"), None).unwrap();
        assert_eq!(err.kind, RetryableErrorKind::OverloadedError);
        let err = classifier.classify(&StreamFailure::http(529, "x"), None).unwrap();
        assert_eq!(err.kind, RetryableErrorKind::ServerError);
    }

    #[test]
    fn overloaded_body_detected_without_status() {
        let failure = StreamFailure::ApiCall {
            message: "stream error".into(),
            status_code: Some(500),
            retry_after_secs: None,
            response_body: Some(json!({"type": "error", "error": {"type": "overloaded_error"}}).to_string()),
            cause: None,
        };
        assert_eq!(kind_of(&failure), Some(RetryableErrorKind::OverloadedError));
    }

    #[test]
    fn rate_limit_states_retry_after() {
        let err = classify(&StreamFailure::rate_limited(Some(30)), None).unwrap();
        assert!(user_text(&err).contains("30 seconds"));
        let err = classify(&StreamFailure::rate_limited(None), None).unwrap();
        assert_eq!(user_text(&err), RATE_LIMITED);
    }

    #[test]
    fn request_timeout_and_other_4xx() {
        assert_eq!(kind_of(&StreamFailure::http(408, "timeout")), Some(RetryableErrorKind::NetworkTimeout));
        assert_eq!(kind_of(&StreamFailure::http(400, "bad request")), Some(RetryableErrorKind::UnknownError));
    }

    #[test]
    fn retry_wrapper_is_unwrapped_with_context() {
        let ctx = WorkflowContext::new(WorkflowStep::Preparation, ["executeSql"]);
        let failure = StreamFailure::Retry {
            message: "Failed after 3 attempts".into(),
            attempts: 3,
            last_error: Some(Box::new(StreamFailure::no_such_tool("createMetrics", "c4", vec![]))),
        };
        let err = classify(&failure, Some(&ctx)).unwrap();
        assert_eq!(err.kind, RetryableErrorKind::NoSuchTool);
        assert!(err.healing_error_text().unwrap().contains("executeSql"));
    }

    #[test]
    fn retry_wrapper_around_non_retryable_is_not_retryable() {
        let failure = StreamFailure::Retry {
            message: "gave up".into(),
            attempts: 2,
            last_error: Some(Box::new(StreamFailure::LoadApiKey { message: "no key".into() })),
        };
        assert!(classify(&failure, None).is_none());
        let bare = StreamFailure::Retry { message: "gave up".into(), attempts: 2, last_error: None };
        assert_eq!(kind_of(&bare), Some(RetryableErrorKind::UnknownError));
    }

    #[test]
    fn no_such_tool_without_context_is_generic() {
        let err = classify(&StreamFailure::no_such_tool("createDashboards", "c1", vec![]), None).unwrap();
        assert_eq!(
            err.healing_error_text(),
            Some("Tool \"createDashboards\" is not available in the current mode. Please use one of the available tools instead.")
        );
    }

    #[test]
    fn no_such_tool_with_empty_tool_list_is_generic() {
        let ctx = WorkflowContext::new(WorkflowStep::Preparation, Vec::<String>::new());
        let err = classify(&StreamFailure::no_such_tool("createDashboards", "c1", vec![]), Some(&ctx)).unwrap();
        assert!(err.healing_error_text().unwrap().ends_with("Please use one of the available tools instead."));
    }

    #[test]
    fn no_such_tool_scenario_lists_tools_and_next_step() {
        let ctx = WorkflowContext::new(
            WorkflowStep::Preparation,
            ["sequentialThinking", "executeSql", "submitThoughts"],
        );
        let failure = StreamFailure::NoSuchTool {
            tool_name: "createDashboards".into(),
            tool_call_id: Some("call_7".into()),
            available_tools: vec![
                "sequentialThinking".into(),
                "executeSql".into(),
                "submitThoughts".into(),
            ],
            message: "Model tried to call unavailable tool 'createDashboards'.".into(),
        };
        let err = classify(&failure, Some(&ctx)).unwrap();
        let text = err.healing_error_text().unwrap();
        assert!(text.contains("\"createDashboards\" is not available"));
        assert!(text.contains("sequentialThinking, executeSql, submitThoughts"));
        assert!(text.contains("execution step"));

        match err.healing_message.as_ref().unwrap().parts() {
            [MessagePart::ToolResult { tool_call_id, tool_name, .. }] => {
                assert_eq!(tool_call_id, "call_7");
                assert_eq!(tool_name, "createDashboards");
            }
            other => panic!("unexpected parts {other:?}"),
        }
    }

    #[test]
    fn invalid_arguments_join_violations_and_preview_args() {
        let failure = StreamFailure::InvalidToolArguments {
            tool_name: "executeSql".into(),
            tool_call_id: Some("c2".into()),
            arguments: Some(json!({ "statements": "x".repeat(40) })),
            violations: vec![
                FieldViolation::new(vec![PathSegment::Key("statements".into())], "Expected array"),
                FieldViolation::new(vec![PathSegment::Key("limit".into())], "Required"),
            ],
            message: "Invalid arguments for tool executeSql".into(),
        };
        let classifier = Classifier::new(ClassifierOptions {
            argument_preview_chars: 20,
            ..ClassifierOptions::default()
        });
        let err = classifier.classify(&failure, None).unwrap();
        let text = err.healing_error_text().unwrap();
        assert!(text.starts_with("Invalid tool arguments: statements: Expected array; limit: Required."));
        assert!(text.contains(" Provided arguments: {\"statements\":\"xxxxx..."));
    }

    #[test]
    fn tool_execution_addresses_failed_call() {
        let err = classify(&StreamFailure::tool_execution("executeSql", "c3", "timeout"), None).unwrap();
        assert_eq!(err.healing_error_text(), Some(TOOL_EXECUTION_FAILED));
    }

    #[test]
    fn unknown_error_quotes_details() {
        let err = classify(&StreamFailure::http(418, "teapot"), None).unwrap();
        let text = user_text(&err);
        assert!(text.starts_with("I encountered an error while processing your request: \"teapot (Status: 418)\"."));
        assert!(text.ends_with("please use only the available tools for the current step."));
    }

    #[test]
    fn json_parse_asks_for_formatting() {
        let err = classify(&StreamFailure::JsonParse { text: "{".into(), message: "bad".into() }, None).unwrap();
        assert_eq!(user_text(&err), FORMAT_ISSUE);
    }
}
