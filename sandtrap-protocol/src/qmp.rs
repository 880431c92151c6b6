//! QMP command/response envelopes (§4.3, §6).
//!
//! QMP itself is a generic `{"execute": ..., "arguments": ...}` /
//! `{"return": ...}` | `{"error": ...}` protocol; we model just enough of it
//! to drive `qmp_capabilities`, `system_powerdown`, `query-status`, and the
//! `human-monitor-command` passthrough used for `savevm`/`loadvm`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct QmpCommand {
    pub execute: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

impl QmpCommand {
    pub fn new(execute: impl Into<String>) -> Self {
        QmpCommand {
            execute: execute.into(),
            arguments: None,
        }
    }

    pub fn with_arguments(execute: impl Into<String>, arguments: Value) -> Self {
        QmpCommand {
            execute: execute.into(),
            arguments: Some(arguments),
        }
    }

    pub fn qmp_capabilities() -> Self {
        Self::new("qmp_capabilities")
    }

    pub fn system_powerdown() -> Self {
        Self::new("system_powerdown")
    }

    pub fn query_status() -> Self {
        Self::new("query-status")
    }

    /// `loadvm`/`savevm` are issued through the HMP passthrough command,
    /// which is the most portable path across QEMU versions (Open Question
    /// in the design notes; resolved here — see DESIGN.md).
    pub fn human_monitor_command(command_line: impl Into<String>) -> Self {
        Self::with_arguments(
            "human-monitor-command",
            serde_json::json!({ "command-line": command_line.into() }),
        )
    }

    pub fn loadvm(snapshot: &str) -> Self {
        Self::human_monitor_command(format!("loadvm {snapshot}"))
    }

    pub fn savevm(snapshot: &str) -> Self {
        Self::human_monitor_command(format!("savevm {snapshot}"))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum QmpResponse {
    Return { #[serde(rename = "return")] value: Value },
    Error { error: QmpErrorBody },
}

#[derive(Debug, Clone, Deserialize)]
pub struct QmpErrorBody {
    pub class: String,
    pub desc: String,
}

impl QmpResponse {
    pub fn is_ok(&self) -> bool {
        matches!(self, QmpResponse::Return { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            QmpResponse::Error { error } => Some(&error.desc),
            QmpResponse::Return { .. } => None,
        }
    }
}

/// The greeting QEMU sends immediately after accepting a QMP connection.
#[derive(Debug, Clone, Deserialize)]
pub struct QmpGreeting {
    #[serde(rename = "QMP")]
    pub qmp: Value,
}
