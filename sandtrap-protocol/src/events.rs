//! The tagged-union `EventRecord` and its four payload shapes (§3).

use serde::{Deserialize, Serialize};

/// Filesystem operation as reported by the file collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOp {
    Create,
    Modify,
    Delete,
    Open,
    Read,
    Write,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyscallEvent {
    pub timestamp_us: u64,
    pub pid: i32,
    pub name: String,
    pub args: Vec<String>,
    pub result: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEvent {
    pub timestamp_us: u64,
    pub path: String,
    pub operation: FileOp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEvent {
    pub timestamp_us: u64,
    pub protocol: String,
    pub src_addr: String,
    pub dst_addr: String,
    pub dst_port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessEvent {
    pub timestamp_us: u64,
    pub pid: i32,
    pub ppid: i32,
    pub cmdline: String,
    pub exit_code: Option<i32>,
}

/// Tagged union over the four event kinds a collector can append.
///
/// `timestamp_us` on each variant is monotonic within that variant's stream;
/// there is no cross-stream ordering guarantee (§5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventRecord {
    Syscall(SyscallEvent),
    File(FileEvent),
    Network(NetworkEvent),
    Process(ProcessEvent),
}

impl EventRecord {
    pub fn timestamp_us(&self) -> u64 {
        match self {
            EventRecord::Syscall(e) => e.timestamp_us,
            EventRecord::File(e) => e.timestamp_us,
            EventRecord::Network(e) => e.timestamp_us,
            EventRecord::Process(e) => e.timestamp_us,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syscall_event_round_trips_through_json() {
        let ev = EventRecord::Syscall(SyscallEvent {
            timestamp_us: 42,
            pid: 123,
            name: "execve".into(),
            args: vec!["/bin/ls".into()],
            result: Some("0".into()),
        });
        let s = serde_json::to_string(&ev).unwrap();
        let back: EventRecord = serde_json::from_str(&s).unwrap();
        assert_eq!(ev, back);
    }

    #[test]
    fn file_event_tag_is_snake_case() {
        let ev = EventRecord::File(FileEvent {
            timestamp_us: 1,
            path: "/etc/shadow".into(),
            operation: FileOp::Open,
        });
        let v: serde_json::Value = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["kind"], "file");
        assert_eq!(v["operation"], "open");
    }
}
