//! Agent RPC Client (§4.5): host-side caller of the in-guest agent over the
//! same JSON-line framing as QMP, directed at the virtio-serial socket.
//!
//! Connects with exponential backoff the way the control channel's guest
//! connector does (`connect_with_handshake` in the teacher's
//! `backend::control_channel`), but without a session-secret handshake: this
//! spec's agent protocol names no authentication step, so `ping` alone
//! stands in as the liveness probe (see DESIGN.md).

use std::path::PathBuf;
use std::time::{Duration, Instant};

use sandtrap_protocol::{
    AgentRequest, AnalysisReport, ExecuteResponse, PingResponse, ReadFileResponse, StatusResponse,
    WriteFileResponse,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};

const PING_DEADLINE: Duration = Duration::from_millis(500);
const CONNECT_DEADLINE: Duration = Duration::from_secs(10);

struct Connection {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
}

/// One client per instance. Calls are serialized through an internal mutex
/// (§4.5: "Concurrent verbs on one connection are not supported").
pub struct AgentClient {
    instance: String,
    agent_socket: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl AgentClient {
    pub fn new(instance: impl Into<String>, agent_socket: impl Into<PathBuf>) -> Self {
        AgentClient {
            instance: instance.into(),
            agent_socket: agent_socket.into(),
            conn: Mutex::new(None),
        }
    }

    pub async fn ping(&self) -> Result<PingResponse> {
        self.call(AgentRequest::Ping, PING_DEADLINE).await
    }

    pub async fn write_file(&self, path: &str, data: &[u8], mode: u32) -> Result<WriteFileResponse> {
        let request = AgentRequest::WriteFile {
            path: path.to_string(),
            data: hex_encode(data),
            mode,
        };
        self.call(request, Duration::from_secs(30)).await
    }

    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let response: ReadFileResponse = self
            .call(
                AgentRequest::ReadFile { path: path.to_string() },
                Duration::from_secs(10),
            )
            .await?;
        if !response.success {
            return Err(Error::AgentUnreachable {
                instance: self.instance.clone(),
                detail: response.error.unwrap_or_else(|| "read_file failed".into()),
            });
        }
        let hex = response
            .data
            .ok_or_else(|| Error::AgentUnreachable {
                instance: self.instance.clone(),
                detail: "read_file response missing data".into(),
            })?;
        hex_decode(&hex).ok_or_else(|| Error::AgentUnreachable {
            instance: self.instance.clone(),
            detail: "read_file response had malformed hex".into(),
        })
    }

    /// The heavy verb. `timeout` is the task's wall-clock deadline; the
    /// client enforces it as the outer bound on top of the agent's own
    /// per-task timeout field (§4.5).
    pub async fn analyze(&self, file_path: &str, timeout: Duration) -> Result<AnalysisReport> {
        let request = AgentRequest::Analyze {
            file_path: file_path.to_string(),
            timeout: timeout.as_secs_f64(),
        };
        // Give the round trip a little headroom over the agent's own
        // timeout so a clean "Timeout" partial report can still arrive.
        self.call(request, timeout + Duration::from_secs(2)).await
    }

    pub async fn execute(&self, cmd: &str, timeout: Duration) -> Result<ExecuteResponse> {
        let request = AgentRequest::Execute {
            cmd: cmd.to_string(),
            timeout: timeout.as_secs_f64(),
        };
        self.call(request, timeout + Duration::from_secs(1)).await
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        self.call(AgentRequest::Status, Duration::from_secs(5)).await
    }

    async fn call<T: serde::de::DeserializeOwned>(&self, request: AgentRequest, deadline: Duration) -> Result<T> {
        let verb = request.verb();
        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect_with_backoff().await?);
        }

        let result = tokio::time::timeout(deadline, send_and_receive(guard.as_mut().unwrap(), &request)).await;

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(instance = %self.instance, verb, error = %e, "agent call failed, dropping connection");
                *guard = None;
                Err(e)
            }
            Err(_) => {
                warn!(instance = %self.instance, verb, "agent call timed out");
                *guard = None;
                Err(Error::AgentUnreachable {
                    instance: self.instance.clone(),
                    detail: format!("verb '{verb}' timed out after {:?}", deadline),
                })
            }
        }
    }

    async fn connect_with_backoff(&self) -> Result<Connection> {
        let mut delay = Duration::from_millis(50);
        let started = Instant::now();
        loop {
            match UnixStream::connect(&self.agent_socket).await {
                Ok(stream) => {
                    let (read_half, write_half) = stream.into_split();
                    debug!(instance = %self.instance, "agent connection established");
                    return Ok(Connection {
                        reader: BufReader::new(read_half),
                        writer: write_half,
                    });
                }
                Err(e) => {
                    if started.elapsed() >= CONNECT_DEADLINE {
                        return Err(Error::AgentUnreachable {
                            instance: self.instance.clone(),
                            detail: format!("could not connect to agent socket: {e}"),
                        });
                    }
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(1));
                }
            }
        }
    }
}

async fn send_and_receive<T: serde::de::DeserializeOwned>(conn: &mut Connection, request: &AgentRequest) -> Result<T> {
    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    conn.writer.write_all(line.as_bytes()).await.map_err(Error::Io)?;

    let mut response_line = String::new();
    let n = conn.reader.read_line(&mut response_line).await.map_err(Error::Io)?;
    if n == 0 {
        return Err(Error::AgentUnreachable {
            instance: "<unknown>".into(),
            detail: "agent closed the connection".into(),
        });
    }
    Ok(serde_json::from_str(response_line.trim_end())?)
}

fn hex_encode(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn ping_round_trips_over_a_unix_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("agent.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            assert!(line.contains("\"command\":\"ping\""));
            write_half
                .write_all(b"{\"success\":true,\"time\":1.0}\n")
                .await
                .unwrap();
        });

        let client = AgentClient::new("vm1", socket_path);
        let pong = client.ping().await.unwrap();
        assert!(pong.success);
        server.await.unwrap();
    }

    #[test]
    fn hex_round_trips() {
        let data = b"hello\x00world";
        let encoded = hex_encode(data);
        let decoded = hex_decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn hex_decode_rejects_odd_length() {
        assert!(hex_decode("abc").is_none());
    }
}
