/// Rejected session configuration. Raised before any provider is contacted.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("API key is required")]
    MissingCredential,
    #[error("at least one tool is required")]
    NoTools,
    #[error("tool registered twice: {0}")]
    DuplicateTool(String),
    #[error("invalid tool name: {0:?}")]
    InvalidToolName(String),
    #[error("tool {tool} requires undeclared parameter {parameter}")]
    UnknownRequiredParameter { tool: String, parameter: String },
    #[error("max_turns must be at least 1")]
    ZeroTurnLimit,
}

/// Turn-level failure returned to the caller of `send_message`.
///
/// The display text never includes provider details; the cause is only
/// reachable through `source()`.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Failed to process message")]
    Inference(#[from] InferenceError),
    #[error("Failed to process message: no answer after {0} turns")]
    TurnLimit(usize),
    #[error("Failed to process message: cancelled")]
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("API returned {status}: {body}")]
    ApiError { status: u16, body: String },
    #[error("failed to parse response: {0}")]
    Parse(String),
    #[error("prompt blocked: {0}")]
    Blocked(String),
    #[error("response contained no candidates")]
    EmptyResponse,
}

/// Failure inside a single function call. Contained by the dispatcher and
/// never surfaced from `send_message`.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("function {0} not found")]
    UnknownTool(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Failed(String),
    #[error("handler panicked: {0}")]
    Panicked(String),
}
