//! In-guest agent (§4.6): binds to the virtio-serial port by default, or to
//! a Unix socket under `--socket` for the test harness, and serves one
//! request at a time until the stream closes.

mod classify;
mod collectors;
mod session;

use std::io::BufReader;
use std::os::unix::net::UnixListener;
use std::path::PathBuf;

fn main() {
    let mut socket_path: Option<PathBuf> = None;
    let mut serial_path = PathBuf::from("/dev/vport0p1");

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--socket" => socket_path = args.next().map(PathBuf::from),
            "--serial" => {
                if let Some(path) = args.next() {
                    serial_path = PathBuf::from(path);
                }
            }
            other => eprintln!("guest-agent: ignoring unknown argument '{other}'"),
        }
    }

    match socket_path {
        Some(path) => run_unix_listener(&path),
        None => run_char_device(&serial_path),
    }
}

fn run_unix_listener(path: &std::path::Path) {
    let _ = std::fs::remove_file(path);
    let listener = match UnixListener::bind(path) {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("guest-agent: cannot bind {}: {e}", path.display());
            std::process::exit(1);
        }
    };
    for incoming in listener.incoming() {
        match incoming {
            Ok(stream) => {
                let Ok(mut writer) = stream.try_clone() else { continue };
                let mut reader = BufReader::new(stream);
                session::handle_stream(&mut reader, &mut writer);
            }
            Err(e) => eprintln!("guest-agent: accept failed: {e}"),
        }
    }
}

fn run_char_device(path: &std::path::Path) {
    let file = match std::fs::OpenOptions::new().read(true).write(true).open(path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("guest-agent: cannot open {}: {e}", path.display());
            std::process::exit(1);
        }
    };
    let mut writer = match file.try_clone() {
        Ok(w) => w,
        Err(e) => {
            eprintln!("guest-agent: cannot clone device handle: {e}");
            std::process::exit(1);
        }
    };
    let mut reader = BufReader::new(file);
    session::handle_stream(&mut reader, &mut writer);
}
