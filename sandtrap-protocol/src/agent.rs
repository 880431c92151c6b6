//! Agent RPC verb request/response shapes (§4.5, §4.6, §6).
//!
//! Request shape is `{"command": <verb>, ...args}` — an internally tagged
//! enum serializes exactly that way. Each verb's response is its own struct
//! rather than one generic envelope, since the field sets genuinely differ
//! per verb and a shared envelope would just hide that under an `Option`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum AgentRequest {
    Ping,
    WriteFile {
        path: String,
        /// Hex-encoded file contents.
        data: String,
        mode: u32,
    },
    Analyze {
        file_path: String,
        timeout: f64,
    },
    Execute {
        cmd: String,
        timeout: f64,
    },
    ReadFile {
        path: String,
    },
    Status,
}

impl AgentRequest {
    pub fn verb(&self) -> &'static str {
        match self {
            AgentRequest::Ping => "ping",
            AgentRequest::WriteFile { .. } => "write_file",
            AgentRequest::Analyze { .. } => "analyze",
            AgentRequest::Execute { .. } => "execute",
            AgentRequest::ReadFile { .. } => "read_file",
            AgentRequest::Status => "status",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingResponse {
    pub success: bool,
    pub time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteFileResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadFileResponse {
    pub success: bool,
    /// Hex-encoded file contents, present iff `success`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    pub hostname: String,
    pub uptime_secs: u64,
}
