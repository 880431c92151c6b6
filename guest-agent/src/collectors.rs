//! Observation Pipeline (§4.7, §9 redesign flag): a uniform cancellable-task
//! primitive used identically by the syscall, file, and network collectors.
//! Each owns a child process and a parser thread; `stop()` clears the
//! running flag, kills the child, and joins the thread with a ≤2 s ceiling.

use std::io::BufRead;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sandtrap_protocol::{EventRecord, FileEvent, FileOp, NetworkEvent, SyscallEvent};

const JOIN_DEADLINE: Duration = Duration::from_secs(2);

fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// One running (or tool-missing) observer. `tool` names the external binary
/// it shells out to, for the "ToolMissing degrades silently" log line (§7).
pub struct Collector {
    tool: &'static str,
    child: Option<Child>,
    running: Arc<AtomicBool>,
    events: Arc<Mutex<Vec<EventRecord>>>,
    parser: Option<JoinHandle<()>>,
}

impl Collector {
    pub fn syscall(pid: u32) -> Self {
        let mut command = Command::new("strace");
        command.args(["-f", "-tt", "-T", "-p", &pid.to_string(), "-e", "trace=file,process,network,desc"]);
        Self::spawn("strace", command, parse_syscall_line)
    }

    pub fn file() -> Self {
        let mut command = Command::new("inotifywait");
        command.args(["-m", "-r", "/tmp", "/home", "/etc", "/var"]);
        Self::spawn("inotifywait", command, parse_file_line)
    }

    pub fn network() -> Self {
        let mut command = Command::new("tcpdump");
        command.args(["-l", "-n", "-q", "-i", "any", "port 53 or port 80 or port 443 or port 8080"]);
        Self::spawn("tcpdump", command, parse_network_line)
    }

    fn spawn(tool: &'static str, mut command: Command, parse_line: fn(&str) -> Option<EventRecord>) -> Self {
        command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::null());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                eprintln!("guest-agent: collector '{tool}' unavailable, degrading silently: {e}");
                return Collector {
                    tool,
                    child: None,
                    running: Arc::new(AtomicBool::new(false)),
                    events: Arc::new(Mutex::new(Vec::new())),
                    parser: None,
                };
            }
        };

        let events = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(AtomicBool::new(true));
        let stdout = child.stdout.take();

        let parser = stdout.map(|stdout| {
            let events = events.clone();
            let running = running.clone();
            std::thread::spawn(move || {
                let reader = std::io::BufReader::new(stdout);
                for line in reader.lines() {
                    if !running.load(Ordering::Relaxed) {
                        break;
                    }
                    let Ok(line) = line else { break };
                    if let Some(event) = parse_line(&line) {
                        events.lock().unwrap().push(event);
                    }
                }
            })
        });

        Collector { tool, child: Some(child), running, events, parser }
    }

    /// Stops the child, joins the parser thread (≤2 s), and returns every
    /// event captured so far.
    pub fn stop(mut self) -> Vec<EventRecord> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(parser) = self.parser.take() {
            join_with_deadline(parser, JOIN_DEADLINE);
        }
        Arc::try_unwrap(self.events)
            .map(|m| m.into_inner().unwrap())
            .unwrap_or_else(|arc| arc.lock().unwrap().clone())
    }

    pub fn tool_name(&self) -> &'static str {
        self.tool
    }
}

fn join_with_deadline(handle: JoinHandle<()>, deadline: Duration) {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = handle.join();
        let _ = tx.send(());
    });
    let _ = rx.recv_timeout(deadline);
}

/// `strace -f -tt -T` line, roughly:
/// `<pid> <HH:MM:SS.ffffff> <name>(<args>) = <result> <<elapsed>>`.
/// Lines beginning `---`/`+++` (signals, process boundary markers) are
/// dropped per §4.7.
fn parse_syscall_line(line: &str) -> Option<EventRecord> {
    if line.starts_with("---") || line.starts_with("+++") {
        return None;
    }
    let mut head = line.splitn(3, char::is_whitespace);
    let pid: i32 = head.next()?.trim().parse().ok()?;
    let _timestamp = head.next()?;
    let call = head.next()?;

    let open_paren = call.find('(')?;
    let name = call[..open_paren].to_string();
    let after = &call[open_paren + 1..];
    let close_paren = after.rfind(')')?;
    let args_str = &after[..close_paren];
    let args: Vec<String> = if args_str.is_empty() {
        Vec::new()
    } else {
        args_str.split(", ").map(|s| s.to_string()).collect()
    };
    let result = after[close_paren + 1..]
        .trim_start_matches('=')
        .trim()
        .split_whitespace()
        .next()
        .map(|s| s.to_string());

    Some(EventRecord::Syscall(SyscallEvent { timestamp_us: now_us(), pid, name, args, result }))
}

/// `inotifywait -m -r` line: `<watched_dir> <EVENT[,EVENT...]> [<filename>]`.
fn parse_file_line(line: &str) -> Option<EventRecord> {
    let mut parts = line.split_whitespace();
    let dir = parts.next()?;
    let events = parts.next()?;
    let filename = parts.next().unwrap_or("");
    let path = if filename.is_empty() {
        dir.to_string()
    } else if dir.ends_with('/') {
        format!("{dir}{filename}")
    } else {
        format!("{dir}/{filename}")
    };
    let operation = map_inotify_event(events)?;
    Some(EventRecord::File(FileEvent { timestamp_us: now_us(), path, operation }))
}

fn map_inotify_event(events: &str) -> Option<FileOp> {
    let first = events.split(',').next()?;
    Some(match first {
        "CREATE" => FileOp::Create,
        "DELETE" | "MOVED_FROM" | "MOVED_TO" => FileOp::Delete,
        "MODIFY" => FileOp::Modify,
        "OPEN" => FileOp::Open,
        "ACCESS" => FileOp::Read,
        "CLOSE_WRITE" | "CLOSE" => FileOp::Write,
        _ => return None,
    })
}

/// `tcpdump -l -n -q` line: `<time> IP <src.port> > <dst.port>: <proto> ...`.
fn parse_network_line(line: &str) -> Option<EventRecord> {
    let ip_idx = line.find("IP ")?;
    let rest = &line[ip_idx + 3..];
    let mut halves = rest.splitn(2, " > ");
    let src = halves.next()?.trim();
    let remainder = halves.next()?;
    let dst = remainder.split(':').next()?.trim();

    let (src_addr, _src_port) = split_host_port(src)?;
    let (dst_addr, dst_port) = split_host_port(dst)?;
    let protocol = if remainder.to_ascii_lowercase().contains("udp") { "udp" } else { "tcp" }.to_string();

    Some(EventRecord::Network(NetworkEvent {
        timestamp_us: now_us(),
        protocol,
        src_addr,
        dst_addr,
        dst_port,
    }))
}

fn split_host_port(s: &str) -> Option<(String, u16)> {
    let idx = s.rfind('.')?;
    let host = s[..idx].to_string();
    let port: u16 = s[idx + 1..].parse().ok()?;
    Some((host, port))
}

pub fn split_syscalls(events: Vec<EventRecord>) -> Vec<SyscallEvent> {
    events.into_iter().filter_map(|e| match e { EventRecord::Syscall(s) => Some(s), _ => None }).collect()
}

pub fn split_files(events: Vec<EventRecord>) -> Vec<FileEvent> {
    events.into_iter().filter_map(|e| match e { EventRecord::File(f) => Some(f), _ => None }).collect()
}

pub fn split_network(events: Vec<EventRecord>) -> Vec<NetworkEvent> {
    events.into_iter().filter_map(|e| match e { EventRecord::Network(n) => Some(n), _ => None }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strace_signal_lines_are_dropped() {
        assert!(parse_syscall_line("--- SIGCHLD {si_signo=SIGCHLD} ---").is_none());
        assert!(parse_syscall_line("+++ exited with 0 +++").is_none());
    }

    #[test]
    fn strace_execve_line_parses_name_and_args() {
        let line = r#"12345 10:30:15.123456 execve("/bin/ls", ["ls"], 0x7fff) = 0 <0.000123>"#;
        let event = parse_syscall_line(line).unwrap();
        match event {
            EventRecord::Syscall(s) => {
                assert_eq!(s.pid, 12345);
                assert_eq!(s.name, "execve");
                assert_eq!(s.result.as_deref(), Some("0"));
            }
            _ => panic!("expected a syscall event"),
        }
    }

    #[test]
    fn inotify_create_line_maps_to_file_op_create() {
        let event = parse_file_line("/tmp/ CREATE sample.py").unwrap();
        match event {
            EventRecord::File(f) => {
                assert_eq!(f.path, "/tmp/sample.py");
                assert_eq!(f.operation, FileOp::Create);
            }
            _ => panic!("expected a file event"),
        }
    }

    #[test]
    fn tcpdump_line_extracts_destination_and_port() {
        let line = "10:30:15.123456 IP 10.0.2.15.54321 > 1.2.3.4.443: Flags [S], seq 0";
        let event = parse_network_line(line).unwrap();
        match event {
            EventRecord::Network(n) => {
                assert_eq!(n.dst_addr, "1.2.3.4");
                assert_eq!(n.dst_port, 443);
            }
            _ => panic!("expected a network event"),
        }
    }

    #[test]
    fn missing_tool_degrades_to_an_empty_event_list() {
        let collector = Collector::spawn("definitely-not-a-real-binary", Command::new("definitely-not-a-real-binary"), |_| None);
        assert_eq!(collector.tool_name(), "definitely-not-a-real-binary");
        assert!(collector.stop().is_empty());
    }
}
