//! Error taxonomy for the Orra SDK.

use thiserror::Error;

/// Result type alias for SDK operations.
pub type Result<T> = std::result::Result<T, OrraError>;

/// A single structured validation failure, surfaced to callers as part of
/// `InputValidationError`/`OutputValidationError` details.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValidationIssue {
    /// JSON pointer to the offending field, e.g. `/message`.
    pub field: String,
    /// Human-readable description of what went wrong.
    pub error: String,
    /// Coarse classification of the failure (e.g. `"type"`, `"required"`).
    #[serde(rename = "type")]
    pub kind: String,
}

/// Errors surfaced by the SDK, per the error taxonomy: construction-time
/// errors raise synchronously, registration errors fail `Start`, handler
/// errors are caught and cached, protocol/transport errors are logged and
/// handled by the reconnect/retry machinery rather than returned here.
#[derive(Debug, Error)]
pub enum OrraError {
    /// Bad API key format, missing custom persistence callbacks, missing
    /// revert handler declared too late, non-record schema, etc.
    #[error("{0}")]
    InvalidArgument(String),

    /// The one-shot registration HTTP call failed (non-2xx or network error).
    #[error("Service registration failed: {0}")]
    ServiceRegistrationError(String),

    /// Attempted to connect or send after `Shutdown` completed.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// `revertible = true` was declared without a registered revert handler.
    #[error("Handler is revertible but no revert handler was registered")]
    MissingRevertHandlerError,

    /// Input payload failed schema validation before the handler ran.
    #[error("Input validation failed")]
    InputValidationError(Vec<ValidationIssue>),

    /// Handler return value failed schema validation.
    #[error("Output validation failed")]
    OutputValidationError(Vec<ValidationIssue>),

    /// An exception escaped user handler code.
    #[error("Service error: {0}")]
    HandlerError(String),

    /// A frame could not be parsed or routed; the session is preserved.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Filesystem error while persisting or loading the service identity.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed or unreachable control-plane URL.
    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),
}

impl OrraError {
    /// Structured detail payload for `task_result.error`, matching the
    /// `{error: {message, details?}}` shape the control plane expects for
    /// validation failures.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            OrraError::InputValidationError(issues) | OrraError::OutputValidationError(issues) => {
                Some(serde_json::json!({ "validation_errors": issues }))
            }
            _ => None,
        }
    }
}
