//! `AnalysisReport`: the agent's response to the `analyze` verb (§3, §6).

use serde::{Deserialize, Serialize};

use crate::events::{FileEvent, NetworkEvent, ProcessEvent, SyscallEvent};

/// Truncation ceiling applied to captured stdout/stderr, in bytes.
pub const STDOUT_CAP_BYTES: usize = 10 * 1024;

/// Truncate `s` to at most `STDOUT_CAP_BYTES` bytes, respecting UTF-8
/// boundaries (never splits inside a multi-byte codepoint).
pub fn truncate_captured(s: &str) -> String {
    if s.len() <= STDOUT_CAP_BYTES {
        return s.to_string();
    }
    let mut end = STDOUT_CAP_BYTES;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub success: bool,
    pub file_hash: String,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub syscalls: Vec<SyscallEvent>,
    pub files: Vec<FileEvent>,
    pub network: Vec<NetworkEvent>,
    pub processes: Vec<ProcessEvent>,
    pub error: Option<String>,
}

impl AnalysisReport {
    /// A report for a task that never got far enough to spawn a target, or
    /// that was killed on timeout before producing meaningful output.
    pub fn partial(file_hash: String, start_time: f64, end_time: f64, error: impl Into<String>) -> Self {
        AnalysisReport {
            success: false,
            file_hash,
            start_time,
            end_time,
            duration: (end_time - start_time).max(0.0),
            exit_code: Some(-1),
            stdout: String::new(),
            stderr: String::new(),
            syscalls: Vec::new(),
            files: Vec::new(),
            network: Vec::new(),
            processes: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// `end_time >= start_time` and `duration == end_time - start_time`
    /// within floating-point tolerance (§8 invariant).
    pub fn is_well_formed(&self) -> bool {
        self.end_time >= self.start_time
            && (self.duration - (self.end_time - self.start_time)).abs() < 1e-6
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_is_exact_at_the_boundary() {
        let s = "a".repeat(STDOUT_CAP_BYTES + 1);
        let truncated = truncate_captured(&s);
        assert_eq!(truncated.len(), STDOUT_CAP_BYTES);
    }

    #[test]
    fn truncation_respects_utf8_boundaries() {
        let mut s = "a".repeat(STDOUT_CAP_BYTES - 1);
        s.push('€'); // 3-byte char straddling the cap
        s.push_str("more");
        let truncated = truncate_captured(&s);
        assert!(truncated.len() <= STDOUT_CAP_BYTES);
        assert!(String::from_utf8(truncated.into_bytes()).is_ok());
    }

    #[test]
    fn short_output_is_untouched() {
        assert_eq!(truncate_captured("hello\n"), "hello\n");
    }

    #[test]
    fn report_round_trips_through_json() {
        let report = AnalysisReport {
            success: true,
            file_hash: "a".repeat(64),
            start_time: 10.0,
            end_time: 10.5,
            duration: 0.5,
            exit_code: Some(0),
            stdout: "hello\n".into(),
            stderr: String::new(),
            syscalls: vec![],
            files: vec![],
            network: vec![],
            processes: vec![],
            error: None,
        };
        assert!(report.is_well_formed());
        let s = serde_json::to_string(&report).unwrap();
        let back: AnalysisReport = serde_json::from_str(&s).unwrap();
        assert_eq!(report, back);
    }

    #[test]
    fn partial_report_is_well_formed_and_marks_timeout() {
        let report = AnalysisReport::partial("f".repeat(64), 0.0, 7.0, "Timeout");
        assert!(report.is_well_formed());
        assert_eq!(report.exit_code, Some(-1));
        assert_eq!(report.error.as_deref(), Some("Timeout"));
        assert!(!report.success);
    }
}
