//! JSON-line framing: one JSON object per line, `\n` terminated, UTF-8, no
//! length prefix. Used identically by the QMP control channel and the agent
//! RPC channel (§6 of the external-interfaces contract).
//!
//! These are blocking helpers over any `Read`/`Write` pair. The guest agent
//! uses them directly against its char device; the host's async callers wrap
//! a `tokio::io::BufReader`/`AsyncWriteExt` pair with the equivalent
//! line-at-a-time protocol instead of reusing these (see `control::qmp` and
//! `agent_client` in the host crate).

use std::io::{BufRead, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ProtocolError, Result};

/// Read one line, parse it as JSON. Returns `Err(ProtocolError::Eof)` if the
/// stream closed without producing a line.
pub fn read_line<R: BufRead, T: DeserializeOwned>(reader: &mut R) -> Result<T> {
    let mut line = String::new();
    let n = reader.read_line(&mut line)?;
    if n == 0 {
        return Err(ProtocolError::Eof);
    }
    let trimmed = line.trim_end_matches(['\n', '\r']);
    serde_json::from_str(trimmed).map_err(ProtocolError::from)
}

/// Serialize `value` and write it as a single `\n`-terminated line.
pub fn write_line<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<()> {
    let mut s = serde_json::to_string(value)?;
    s.push('\n');
    writer.write_all(s.as_bytes())?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor};

    #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
    struct Ping {
        ping: u32,
    }

    #[test]
    fn round_trip_single_line() {
        let mut buf = Vec::new();
        write_line(&mut buf, &Ping { ping: 7 }).unwrap();
        assert_eq!(buf, b"{\"ping\":7}\n");

        let mut reader = BufReader::new(Cursor::new(buf));
        let parsed: Ping = read_line(&mut reader).unwrap();
        assert_eq!(parsed, Ping { ping: 7 });
    }

    #[test]
    fn eof_on_empty_stream() {
        let mut reader = BufReader::new(Cursor::new(Vec::<u8>::new()));
        let result: Result<Ping> = read_line(&mut reader);
        assert!(matches!(result, Err(ProtocolError::Eof)));
    }

    #[test]
    fn multiple_lines_read_in_order() {
        let data = b"{\"ping\":1}\n{\"ping\":2}\n";
        let mut reader = BufReader::new(Cursor::new(data.to_vec()));
        let a: Ping = read_line(&mut reader).unwrap();
        let b: Ping = read_line(&mut reader).unwrap();
        assert_eq!(a.ping, 1);
        assert_eq!(b.ping, 2);
    }
}
