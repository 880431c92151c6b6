//! Per-connection request dispatch (§4.5, §4.6): accepts one request,
//! handles it, writes the response, and loops until the stream closes.

use std::io::{BufRead, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use sandtrap_protocol::{
    framing, truncate_captured, AgentRequest, AnalysisReport, ExecuteResponse, PingResponse,
    ReadFileResponse, StatusResponse, WriteFileResponse,
};
use sha2::{Digest, Sha256};

use crate::classify::{classify, ExecPlan};
use crate::collectors::{split_files, split_network, split_syscalls, Collector};

pub fn handle_stream<R: BufRead, W: Write>(reader: &mut R, writer: &mut W) {
    loop {
        let request: AgentRequest = match framing::read_line(reader) {
            Ok(request) => request,
            Err(_) => return,
        };
        let wrote = match &request {
            AgentRequest::Ping => framing::write_line(writer, &ping()),
            AgentRequest::WriteFile { path, data, mode } => framing::write_line(writer, &write_file(path, data, *mode)),
            AgentRequest::Analyze { file_path, timeout } => framing::write_line(writer, &analyze(file_path, *timeout)),
            AgentRequest::Execute { cmd, timeout } => framing::write_line(writer, &execute(cmd, *timeout)),
            AgentRequest::ReadFile { path } => framing::write_line(writer, &read_file(path)),
            AgentRequest::Status => framing::write_line(writer, &status()),
        };
        if wrote.is_err() {
            return;
        }
    }
}

fn unix_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_encode(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len()).step_by(2).map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok()).collect()
}

fn ping() -> PingResponse {
    PingResponse { success: true, time: unix_time() }
}

fn write_file(path: &str, hex_data: &str, mode: u32) -> WriteFileResponse {
    let Some(data) = hex_decode(hex_data) else {
        return WriteFileResponse { success: false, error: Some("malformed hex payload".into()) };
    };
    match std::fs::write(path, &data) {
        Ok(()) => {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode));
            }
            WriteFileResponse { success: true, error: None }
        }
        Err(e) => WriteFileResponse { success: false, error: Some(e.to_string()) },
    }
}

fn read_file(path: &str) -> ReadFileResponse {
    match std::fs::read(path) {
        Ok(data) => ReadFileResponse { success: true, data: Some(hex_encode(&data)), error: None },
        Err(e) => ReadFileResponse { success: false, data: None, error: Some(e.to_string()) },
    }
}

fn status() -> StatusResponse {
    let hostname = std::fs::read_to_string("/etc/hostname")
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    let uptime_secs = read_uptime_secs().unwrap_or(0);
    StatusResponse { success: true, hostname, uptime_secs }
}

fn read_uptime_secs() -> Option<u64> {
    let contents = std::fs::read_to_string("/proc/uptime").ok()?;
    contents.split_whitespace().next()?.parse::<f64>().ok().map(|f| f as u64)
}

fn execute(cmd: &str, timeout_secs: f64) -> ExecuteResponse {
    let mut child = match Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            return ExecuteResponse {
                success: false,
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                error: Some(e.to_string()),
            }
        }
    };

    let deadline = Instant::now() + Duration::from_secs_f64(timeout_secs.max(0.0));
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let (stdout, stderr) = drain_output(&mut child);
                return ExecuteResponse { success: true, exit_code: status.code(), stdout, stderr, error: None };
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return ExecuteResponse {
                        success: false,
                        exit_code: Some(-1),
                        stdout: String::new(),
                        stderr: String::new(),
                        error: Some("Timeout".into()),
                    };
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                return ExecuteResponse {
                    success: false,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

fn drain_output(child: &mut std::process::Child) -> (String, String) {
    use std::io::Read;
    let mut stdout = String::new();
    let mut stderr = String::new();
    if let Some(mut out) = child.stdout.take() {
        let _ = out.read_to_string(&mut stdout);
    }
    if let Some(mut err) = child.stderr.take() {
        let _ = err.read_to_string(&mut stderr);
    }
    (stdout, stderr)
}

/// The heavy verb (§4.6 steps 1-7).
fn analyze(file_path: &str, timeout_secs: f64) -> AnalysisReport {
    let start_time = unix_time();
    let path = Path::new(file_path);

    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => return AnalysisReport::partial(String::new(), start_time, unix_time(), format!("cannot read sample: {e}")),
    };
    let file_hash = sha256_hex(&data);
    let plan = classify(path, &data);

    let cmdline = match &plan {
        ExecPlan::Interpreter { cmd, args } => std::iter::once(cmd.clone()).chain(args.iter().cloned()).collect::<Vec<_>>().join(" "),
        ExecPlan::Direct(target) => target.display().to_string(),
    };

    let mut command = match &plan {
        ExecPlan::Interpreter { cmd, args } => {
            let mut command = Command::new(cmd);
            command.args(args);
            command
        }
        ExecPlan::Direct(target) => {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = std::fs::set_permissions(target, std::fs::Permissions::from_mode(0o755));
            }
            Command::new(target)
        }
    };

    let cwd = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("/tmp"));
    command
        .current_dir(cwd)
        .env_clear()
        .env("HOME", "/tmp")
        .env("TERM", "xterm")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // Collectors 3 and 4.7: file and network observers start before the
    // target spawns; the syscall collector attaches to the PID after.
    let file_collector = Collector::file();
    let network_collector = Collector::network();

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            let files = split_files(file_collector.stop());
            let network = split_network(network_collector.stop());
            let end_time = unix_time();
            let mut report = AnalysisReport::partial(file_hash, start_time, end_time, format!("spawn failed: {e}"));
            report.files = files;
            report.network = network;
            return report;
        }
    };

    let target_pid = child.id();
    let spawn_time = unix_time();
    let syscall_collector = Collector::syscall(target_pid);

    let deadline = Instant::now() + Duration::from_secs_f64(timeout_secs.max(0.0));
    let mut timed_out = false;
    let exit_code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code(),
            Ok(None) => {
                if Instant::now() >= deadline {
                    timed_out = true;
                    let _ = child.kill();
                    let _ = child.wait();
                    break Some(-1);
                }
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(_) => break None,
        }
    };

    let (stdout, stderr) = drain_output(&mut child);

    // §4.6 step 7: allow a fixed drain window before stopping collectors.
    std::thread::sleep(Duration::from_millis(500));

    let syscalls = split_syscalls(syscall_collector.stop());
    let files = split_files(file_collector.stop());
    let network = split_network(network_collector.stop());

    let end_time = unix_time();

    let processes = vec![sandtrap_protocol::ProcessEvent {
        timestamp_us: (spawn_time * 1_000_000.0) as u64,
        pid: target_pid as i32,
        ppid: std::process::id() as i32,
        cmdline,
        exit_code,
    }];

    AnalysisReport {
        success: true,
        file_hash,
        start_time,
        end_time,
        duration: (end_time - start_time).max(0.0),
        exit_code,
        stdout: truncate_captured(&stdout),
        stderr: truncate_captured(&stderr),
        syscalls,
        files,
        network,
        processes,
        error: if timed_out { Some("Timeout".to_string()) } else { None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trips() {
        let data = b"hello\x00world";
        assert_eq!(hex_decode(&hex_encode(data)).unwrap(), data);
    }

    #[test]
    fn ping_reports_success() {
        assert!(ping().success);
    }

    #[test]
    fn write_then_read_file_round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.bin");
        let data = b"\x00\x01\x02hello";
        let hex = hex_encode(data);
        let response = write_file(path.to_str().unwrap(), &hex, 0o644);
        assert!(response.success);

        let read_back = read_file(path.to_str().unwrap());
        assert!(read_back.success);
        assert_eq!(hex_decode(&read_back.data.unwrap()).unwrap(), data);
    }

    #[test]
    fn analyze_a_benign_python_script_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("benign.py");
        std::fs::write(&path, b"print(\"hello\")\n").unwrap();
        let report = analyze(path.to_str().unwrap(), 5.0);
        assert!(report.is_well_formed());
        assert_eq!(report.error, None);
        assert_eq!(report.processes.len(), 1);
        assert!(report.processes[0].cmdline.contains("python3"));
        assert_eq!(report.processes[0].exit_code, report.exit_code);
    }

    #[test]
    fn analyze_missing_file_returns_a_partial_report() {
        let report = analyze("/nonexistent/path/sample.py", 5.0);
        assert!(!report.success);
        assert!(report.error.is_some());
    }
}
