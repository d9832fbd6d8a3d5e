//! Failures surfaced by the streaming runtime.
//!
//! `StreamFailure` is the closed set of error shapes the model SDK can produce
//! while a stream is created or consumed. Runtimes convert whatever they catch
//! into one of these variants at the boundary; everything downstream matches
//! on this enum and never inspects foreign error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One segment of a validation error path (`steps.0.sql`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathSegment::Index(i) => write!(f, "{i}"),
            PathSegment::Key(k) => write!(f, "{k}"),
        }
    }
}

/// A single schema violation in a tool's arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    #[serde(default)]
    pub path: Vec<PathSegment>,
    pub message: String,
}

impl FieldViolation {
    pub fn new(path: Vec<PathSegment>, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
        }
    }

    /// Dotted path, e.g. `files.0.name`.
    pub fn path_string(&self) -> String {
        self.path
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path_string(), self.message)
    }
}

/// Low-level network cause underneath a transport failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportCause {
    Timeout,
    ConnectionReset,
    ConnectionRefused,
    Other(String),
}

/// Every failure shape the streaming runtime can report.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFailure {
    // --- Tool-level failures ---
    #[error("{message}")]
    NoSuchTool {
        tool_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call_id: Option<String>,
        #[serde(default)]
        available_tools: Vec<String>,
        #[serde(default)]
        message: String,
    },

    #[error("{message}")]
    InvalidToolArguments {
        tool_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arguments: Option<serde_json::Value>,
        #[serde(default)]
        violations: Vec<FieldViolation>,
        #[serde(default)]
        message: String,
    },

    #[error("{message}")]
    ToolExecution {
        tool_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call_id: Option<String>,
        #[serde(default)]
        message: String,
    },

    // --- Malformed output ---
    #[error("{message}")]
    EmptyResponseBody {
        #[serde(default)]
        message: String,
    },

    #[error("{message}")]
    NoContentGenerated {
        #[serde(default)]
        message: String,
    },

    #[error("{message}")]
    JsonParse {
        #[serde(default)]
        text: String,
        #[serde(default)]
        message: String,
    },

    // --- Transport ---
    #[error("{message}")]
    ApiCall {
        #[serde(default)]
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response_body: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cause: Option<TransportCause>,
    },

    /// The SDK's own retry wrapper gave up; `last_error` is what it saw last.
    #[error("{message}")]
    Retry {
        #[serde(default)]
        message: String,
        #[serde(default)]
        attempts: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_error: Option<Box<StreamFailure>>,
    },

    // --- Misconfiguration (never retried) ---
    #[error("{message}")]
    LoadApiKey {
        #[serde(default)]
        message: String,
    },

    #[error("{message}")]
    NoSuchModel {
        model_id: String,
        #[serde(default)]
        message: String,
    },

    #[error("{message}")]
    NoSuchProvider {
        provider_id: String,
        #[serde(default)]
        message: String,
    },

    #[error("{message}")]
    UnsupportedFunctionality {
        functionality: String,
        #[serde(default)]
        message: String,
    },

    #[error("{message}")]
    TooManyEmbeddingValues {
        #[serde(default)]
        max_values: u32,
        #[serde(default)]
        values: u32,
        #[serde(default)]
        message: String,
    },

    #[error("{message}")]
    NoOutputSpecified {
        #[serde(default)]
        message: String,
    },

    /// The stream was stopped on purpose (a finishing tool was called).
    #[error("stream aborted: {reason}")]
    Aborted {
        #[serde(default)]
        reason: String,
    },

    /// Any other well-formed error.
    #[error("{name}: {message}")]
    Other {
        #[serde(default = "default_error_name")]
        name: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
    },
}

fn default_error_name() -> String {
    "Error".into()
}

impl StreamFailure {
    pub fn no_such_tool(
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        available_tools: Vec<String>,
    ) -> Self {
        let tool_name = tool_name.into();
        Self::NoSuchTool {
            message: format!("Model tried to call unavailable tool '{tool_name}'."),
            tool_name,
            tool_call_id: Some(tool_call_id.into()),
            available_tools,
        }
    }

    pub fn invalid_arguments(
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        violations: Vec<FieldViolation>,
    ) -> Self {
        let tool_name = tool_name.into();
        Self::InvalidToolArguments {
            message: format!("Invalid arguments for tool {tool_name}"),
            tool_name,
            tool_call_id: Some(tool_call_id.into()),
            arguments: None,
            violations,
        }
    }

    pub fn tool_execution(
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            tool_call_id: Some(tool_call_id.into()),
            message: message.into(),
        }
    }

    /// A transport failure with an HTTP status.
    pub fn http(status_code: u16, message: impl Into<String>) -> Self {
        Self::ApiCall {
            message: message.into(),
            status_code: Some(status_code),
            retry_after_secs: None,
            response_body: None,
            cause: None,
        }
    }

    /// A 429 carrying an optional `retry-after` hint.
    pub fn rate_limited(retry_after_secs: Option<u64>) -> Self {
        Self::ApiCall {
            message: "Too Many Requests".into(),
            status_code: Some(429),
            retry_after_secs,
            response_body: None,
            cause: None,
        }
    }

    /// A transport failure with no response at all.
    pub fn network(cause: TransportCause, message: impl Into<String>) -> Self {
        Self::ApiCall {
            message: message.into(),
            status_code: None,
            retry_after_secs: None,
            response_body: None,
            cause: Some(cause),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            name: default_error_name(),
            message: message.into(),
            stack: None,
        }
    }

    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// The human-readable message carried by the failure.
    pub fn message(&self) -> &str {
        match self {
            Self::NoSuchTool { message, .. }
            | Self::InvalidToolArguments { message, .. }
            | Self::ToolExecution { message, .. }
            | Self::EmptyResponseBody { message }
            | Self::NoContentGenerated { message }
            | Self::JsonParse { message, .. }
            | Self::ApiCall { message, .. }
            | Self::Retry { message, .. }
            | Self::LoadApiKey { message }
            | Self::NoSuchModel { message, .. }
            | Self::NoSuchProvider { message, .. }
            | Self::UnsupportedFunctionality { message, .. }
            | Self::TooManyEmbeddingValues { message, .. }
            | Self::NoOutputSpecified { message }
            | Self::Other { message, .. } => message,
            Self::Aborted { reason } => reason,
        }
    }

    /// Stable identifier of the failure shape, used in logs.
    pub fn name(&self) -> &str {
        match self {
            Self::NoSuchTool { .. } => "no_such_tool",
            Self::InvalidToolArguments { .. } => "invalid_tool_arguments",
            Self::ToolExecution { .. } => "tool_execution",
            Self::EmptyResponseBody { .. } => "empty_response_body",
            Self::NoContentGenerated { .. } => "no_content_generated",
            Self::JsonParse { .. } => "json_parse",
            Self::ApiCall { .. } => "api_call",
            Self::Retry { .. } => "retry",
            Self::LoadApiKey { .. } => "load_api_key",
            Self::NoSuchModel { .. } => "no_such_model",
            Self::NoSuchProvider { .. } => "no_such_provider",
            Self::UnsupportedFunctionality { .. } => "unsupported_functionality",
            Self::TooManyEmbeddingValues { .. } => "too_many_embedding_values",
            Self::NoOutputSpecified { .. } => "no_output_specified",
            Self::Aborted { .. } => "aborted",
            Self::Other { name, .. } => name,
        }
    }

    /// Misconfiguration that no amount of retrying or healing can fix.
    pub fn is_non_retryable(&self) -> bool {
        matches!(
            self,
            Self::LoadApiKey { .. }
                | Self::NoSuchModel { .. }
                | Self::NoSuchProvider { .. }
                | Self::UnsupportedFunctionality { .. }
                | Self::TooManyEmbeddingValues { .. }
                | Self::NoOutputSpecified { .. }
        )
    }

    /// The failure the SDK's retry wrapper saw last, following nested
    /// wrappers. Anything else is its own innermost failure.
    pub fn innermost(&self) -> &StreamFailure {
        let mut current = self;
        while let Self::Retry {
            last_error: Some(inner),
            ..
        } = current
        {
            current = inner;
        }
        current
    }

    /// The deliberate stop signal; not an error. Looks through retry wrappers.
    pub fn is_abort(&self) -> bool {
        matches!(self.innermost(), Self::Aborted { .. })
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ApiCall { status_code, .. } => *status_code,
            _ => None,
        }
    }

    /// Tool name for tool-level failures.
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            Self::NoSuchTool { tool_name, .. }
            | Self::InvalidToolArguments { tool_name, .. }
            | Self::ToolExecution { tool_name, .. } => Some(tool_name),
            _ => None,
        }
    }

    /// Tool call id for tool-level failures, when the SDK reported one.
    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Self::NoSuchTool { tool_call_id, .. }
            | Self::InvalidToolArguments { tool_call_id, .. }
            | Self::ToolExecution { tool_call_id, .. } => tool_call_id.as_deref(),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StreamFailure {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let cause = match err.kind() {
            ErrorKind::TimedOut => TransportCause::Timeout,
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                TransportCause::ConnectionReset
            }
            ErrorKind::ConnectionRefused => TransportCause::ConnectionRefused,
            _ => {
                return Self::Other {
                    name: "IoError".into(),
                    message: err.to_string(),
                    stack: None,
                };
            }
        };
        Self::network(cause, err.to_string())
    }
}
