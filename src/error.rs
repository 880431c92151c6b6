//! Error types for sandtrap.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using sandtrap's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured error codes for the CLI's JSON-on-stderr boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorCode {
    InvalidProfile,
    LaunchTimeout,
    GuestDied,
    ControlTimeout,
    SnapshotRestoreFailed,
    AgentUnreachable,
    TaskTimeout,
    ToolMissing,
    ScorerInputEmpty,
    InternalError,
}

/// Structured API error response: `{"code":"LAUNCH_TIMEOUT","message":"...","retryable":true}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
    pub retryable: bool,
}

impl ApiError {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"code":"INTERNAL_ERROR","message":"serialization failed","retryable":true}"#
                .to_string()
        })
    }
}

impl From<&Error> for ApiError {
    fn from(err: &Error) -> Self {
        let (code, retryable) = match err {
            Error::InvalidProfile(_) => (ApiErrorCode::InvalidProfile, false),
            Error::LaunchTimeout { .. } => (ApiErrorCode::LaunchTimeout, true),
            Error::GuestDied { .. } => (ApiErrorCode::GuestDied, true),
            Error::ControlTimeout { .. } => (ApiErrorCode::ControlTimeout, true),
            Error::SnapshotRestoreFailed { .. } => (ApiErrorCode::SnapshotRestoreFailed, true),
            Error::AgentUnreachable { .. } => (ApiErrorCode::AgentUnreachable, true),
            Error::TaskTimeout { .. } => (ApiErrorCode::TaskTimeout, false),
            Error::ToolMissing { .. } => (ApiErrorCode::ToolMissing, false),
            Error::ScorerInputEmpty => (ApiErrorCode::ScorerInputEmpty, false),
            Error::Io(_) | Error::Serde(_) | Error::Config(_) => (ApiErrorCode::InternalError, false),
        };
        ApiError {
            code,
            message: err.to_string(),
            retryable,
        }
    }
}

/// Errors surfaced by the sandbox execution engine.
///
/// Each variant mirrors a row of the error taxonomy: the recovery policy lives
/// with the caller (supervisor marks `gone`, scorer treats empty input as
/// clean, etc), not on the error itself.
#[derive(Error, Debug)]
pub enum Error {
    /// Assembler rejected a profile: missing image, unknown architecture.
    #[error("invalid profile: {0}")]
    InvalidProfile(String),

    /// Monitor socket never appeared within the profile's boot timeout.
    #[error("launch of '{instance}' timed out after {timeout_ms}ms: {stderr}")]
    LaunchTimeout {
        instance: String,
        timeout_ms: u64,
        stderr: String,
    },

    /// The QEMU child exited while a task or control call was in flight.
    #[error("guest '{instance}' died: {detail}")]
    GuestDied { instance: String, detail: String },

    /// A QMP command did not receive a reply within its deadline.
    #[error("QMP command '{command}' on '{instance}' timed out")]
    ControlTimeout { instance: String, command: String },

    /// `loadvm` failed; the instance is no longer trustworthy.
    #[error("snapshot restore of '{snapshot}' failed on '{instance}': {detail}")]
    SnapshotRestoreFailed {
        instance: String,
        snapshot: String,
        detail: String,
    },

    /// The agent RPC client could not reach the in-guest agent.
    #[error("agent on '{instance}' unreachable: {detail}")]
    AgentUnreachable { instance: String, detail: String },

    /// The analysis task ran past its wall-clock budget.
    #[error("task on '{instance}' timed out after {timeout_ms}ms")]
    TaskTimeout { instance: String, timeout_ms: u64 },

    /// A collector's backing tool is not installed; the caller degrades, not fails.
    #[error("tool '{tool}' missing for {collector} collector")]
    ToolMissing { collector: &'static str, tool: &'static str },

    /// Scorer was asked to score an input with no report and no static evidence.
    #[error("scorer received no events and no static evidence")]
    ScorerInputEmpty,

    /// Configuration shape is invalid (not a launch-time concern).
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O errors (socket connect, process spawn, file staging).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors (QMP, RPC, report).
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
