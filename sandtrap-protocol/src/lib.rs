//! Shared wire-format types for host <-> guest and host <-> hypervisor
//! communication in sandtrap.
//!
//! Both the QMP control channel (§4.3) and the in-guest agent RPC channel
//! (§4.5) use the same framing: one JSON object per line, `\n`-terminated,
//! UTF-8, no length prefix and no multiplexing. `framing` implements that
//! for synchronous readers/writers (used by the guest agent); the async host
//! crate drives the same line protocol directly over `tokio::io`.

pub mod agent;
pub mod error;
pub mod events;
pub mod framing;
pub mod qmp;
pub mod report;
pub mod verdict;

pub use agent::{
    AgentRequest, ExecuteResponse, PingResponse, ReadFileResponse, StatusResponse,
    WriteFileResponse,
};
pub use error::{ProtocolError, Result};
pub use events::{EventRecord, FileEvent, FileOp, NetworkEvent, ProcessEvent, SyscallEvent};
pub use qmp::{QmpCommand, QmpErrorBody, QmpGreeting, QmpResponse};
pub use report::{truncate_captured, AnalysisReport, STDOUT_CAP_BYTES};
pub use verdict::{Verdict, VerdictLabel};
