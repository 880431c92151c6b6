//! Scorer (§4.8): a deterministic, pure function from
//! `(AnalysisReport, StaticEvidence)` to a `Verdict`.
//!
//! Three score/tag tables drive the dynamic half (network destinations,
//! syscall kinds, file paths); `StaticEvidence` carries pre-scored
//! increments from engines that ran before the guest ever booted (§6:
//! "their contribution to the final score is additive").

use sandtrap_protocol::{AnalysisReport, FileOp, Verdict};

/// Pre-scored contribution from a static engine (YARA, ELF inspector, …)
/// that ran before VM execution. The scorer folds these in unchanged; it
/// does not itself implement any static analysis (§4.8).
#[derive(Debug, Clone, Default)]
pub struct StaticEvidence {
    pub increments: Vec<(u32, Option<String>)>,
}

impl StaticEvidence {
    pub fn empty() -> Self {
        StaticEvidence::default()
    }
}

struct TableEntry {
    matches: fn(&str) -> bool,
    score: u32,
    tag: Option<&'static str>,
}

const NETWORK_DESTINATIONS: &[TableEntry] = &[
    TableEntry { matches: |s| s.contains("api.telegram.org"), score: 20, tag: Some("T1102") },
    TableEntry { matches: |s| s.contains("pastebin.com"), score: 15, tag: Some("T1102") },
];

const SYSCALL_KINDS: &[TableEntry] = &[
    TableEntry { matches: |s| s == "ptrace", score: 20, tag: Some("T1055.008") },
    TableEntry { matches: |s| s == "execve", score: 10, tag: Some("T1059") },
    TableEntry { matches: |s| s == "connect" || s == "bind", score: 10, tag: Some("T1071") },
];

const FILE_PATHS: &[TableEntry] = &[
    TableEntry { matches: |s| s == "/etc/shadow" || s == "/etc/passwd", score: 20, tag: Some("T1003") },
    TableEntry { matches: |s| s.contains("/.ssh/"), score: 15, tag: Some("T1552.004") },
];

/// Scores `report` against the built-in dynamic tables plus any
/// `static_evidence` gathered before the guest ran, and classifies the
/// result against `clean_threshold`/`suspicious_threshold`.
pub fn score(report: &AnalysisReport, static_evidence: &StaticEvidence, clean_threshold: u32, suspicious_threshold: u32) -> Verdict {
    let mut total: u32 = 0;
    let mut tags: Vec<String> = Vec::new();

    for (increment, tag) in &static_evidence.increments {
        total = total.saturating_add(*increment);
        push_tag(&mut tags, tag.as_deref());
    }

    for event in dynamic_events(report) {
        match event {
            DynamicEvent::Network(destination) => apply_table(NETWORK_DESTINATIONS, destination, &mut total, &mut tags),
            DynamicEvent::Syscall(name) => apply_table(SYSCALL_KINDS, name, &mut total, &mut tags),
            DynamicEvent::FilePath(path) => apply_table(FILE_PATHS, path, &mut total, &mut tags),
        }
    }

    if report.syscalls.is_empty() && report.files.is_empty() && report.network.is_empty() && static_evidence.increments.is_empty() {
        return Verdict::classify(0, Vec::new(), clean_threshold, suspicious_threshold);
    }

    Verdict::classify(total, tags, clean_threshold, suspicious_threshold)
}

enum DynamicEvent<'a> {
    Network(&'a str),
    Syscall(&'a str),
    FilePath(&'a str),
}

fn dynamic_events(report: &AnalysisReport) -> Vec<DynamicEvent<'_>> {
    let mut events = Vec::new();
    for syscall in &report.syscalls {
        events.push(DynamicEvent::Syscall(syscall.name.as_str()));
    }
    for file in &report.files {
        if matches!(file.operation, FileOp::Open | FileOp::Read | FileOp::Write) {
            events.push(DynamicEvent::FilePath(file.path.as_str()));
        }
    }
    for network in &report.network {
        events.push(DynamicEvent::Network(network.dst_addr.as_str()));
    }
    events
}

fn apply_table(table: &[TableEntry], value: &str, total: &mut u32, tags: &mut Vec<String>) {
    for entry in table {
        if (entry.matches)(value) {
            *total = total.saturating_add(entry.score).min(100);
            push_tag(tags, entry.tag);
        }
    }
}

fn push_tag(tags: &mut Vec<String>, tag: Option<&str>) {
    if let Some(tag) = tag {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandtrap_protocol::{FileEvent, NetworkEvent, SyscallEvent, VerdictLabel};

    fn empty_report() -> AnalysisReport {
        AnalysisReport {
            success: true,
            file_hash: "a".repeat(64),
            start_time: 0.0,
            end_time: 1.0,
            duration: 1.0,
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
            syscalls: Vec::new(),
            files: Vec::new(),
            network: Vec::new(),
            processes: Vec::new(),
            error: None,
        }
    }

    #[test]
    fn empty_report_is_clean_with_zero_score() {
        let verdict = score(&empty_report(), &StaticEvidence::empty(), 20, 50);
        assert_eq!(verdict.label, VerdictLabel::Clean);
        assert_eq!(verdict.score, 0);
    }

    #[test]
    fn execve_scores_ten_and_tags_t1059() {
        let mut report = empty_report();
        report.syscalls.push(SyscallEvent {
            timestamp_us: 1,
            pid: 100,
            name: "execve".into(),
            args: vec!["/bin/ls".into()],
            result: None,
        });
        let verdict = score(&report, &StaticEvidence::empty(), 20, 50);
        assert_eq!(verdict.score, 10);
        assert!(verdict.technique_tags.contains(&"T1059".to_string()));
    }

    #[test]
    fn shadow_file_read_scores_twenty_and_tags_t1003() {
        let mut report = empty_report();
        report.files.push(FileEvent {
            timestamp_us: 1,
            path: "/etc/shadow".into(),
            operation: FileOp::Read,
        });
        let verdict = score(&report, &StaticEvidence::empty(), 20, 50);
        assert_eq!(verdict.score, 20);
        assert!(verdict.technique_tags.contains(&"T1003".to_string()));
        assert_eq!(verdict.label, VerdictLabel::Suspicious);
    }

    #[test]
    fn telegram_beacon_tags_t1102_and_is_suspicious() {
        let mut report = empty_report();
        report.network.push(NetworkEvent {
            timestamp_us: 1,
            protocol: "tcp".into(),
            src_addr: "10.0.0.5".into(),
            dst_addr: "api.telegram.org".into(),
            dst_port: 443,
        });
        let verdict = score(&report, &StaticEvidence::empty(), 20, 50);
        assert_eq!(verdict.score, 20);
        assert_eq!(verdict.label, VerdictLabel::Suspicious);
        assert!(verdict.technique_tags.contains(&"T1102".to_string()));
    }

    #[test]
    fn beacon_plus_connect_plus_ptrace_escalates_to_malicious() {
        let mut report = empty_report();
        report.network.push(NetworkEvent {
            timestamp_us: 1,
            protocol: "tcp".into(),
            src_addr: "10.0.0.5".into(),
            dst_addr: "api.telegram.org".into(),
            dst_port: 443,
        });
        report.syscalls.push(SyscallEvent {
            timestamp_us: 2,
            pid: 100,
            name: "connect".into(),
            args: Vec::new(),
            result: None,
        });
        report.syscalls.push(SyscallEvent {
            timestamp_us: 3,
            pid: 100,
            name: "ptrace".into(),
            args: Vec::new(),
            result: None,
        });
        report.files.push(FileEvent {
            timestamp_us: 4,
            path: "/etc/shadow".into(),
            operation: FileOp::Read,
        });
        let verdict = score(&report, &StaticEvidence::empty(), 20, 50);
        assert_eq!(verdict.score, 70);
        assert_eq!(verdict.label, VerdictLabel::Malicious);
    }

    #[test]
    fn static_evidence_is_additive_to_dynamic_score() {
        let mut evidence = StaticEvidence::empty();
        evidence.increments.push((20, Some("T1055".to_string())));
        let verdict = score(&empty_report(), &evidence, 20, 50);
        assert_eq!(verdict.score, 20);
        assert_eq!(verdict.label, VerdictLabel::Clean);
    }

    #[test]
    fn score_caps_at_one_hundred() {
        let mut report = empty_report();
        for _ in 0..10 {
            report.syscalls.push(SyscallEvent {
                timestamp_us: 1,
                pid: 100,
                name: "ptrace".into(),
                args: Vec::new(),
                result: None,
            });
        }
        let verdict = score(&report, &StaticEvidence::empty(), 20, 50);
        assert_eq!(verdict.score, 100);
    }

    #[test]
    fn tags_are_deduplicated_preserving_first_seen_order() {
        let mut report = empty_report();
        report.syscalls.push(SyscallEvent { timestamp_us: 1, pid: 1, name: "execve".into(), args: Vec::new(), result: None });
        report.syscalls.push(SyscallEvent { timestamp_us: 2, pid: 1, name: "execve".into(), args: Vec::new(), result: None });
        let verdict = score(&report, &StaticEvidence::empty(), 20, 50);
        assert_eq!(verdict.technique_tags, vec!["T1059".to_string()]);
    }
}
