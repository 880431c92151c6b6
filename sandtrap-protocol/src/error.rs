use std::fmt;

/// Errors from reading or writing a JSON-line frame.
#[derive(Debug)]
pub enum ProtocolError {
    /// The line was not valid UTF-8 / valid JSON for the expected type.
    InvalidMessage(String),
    /// The stream closed before a full line was read.
    Eof,
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::InvalidMessage(s) => write!(f, "invalid message: {s}"),
            ProtocolError::Eof => write!(f, "stream closed before a full line was read"),
            ProtocolError::Io(e) => write!(f, "I/O error: {e}"),
            ProtocolError::Json(e) => write!(f, "JSON error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProtocolError::Io(e) => Some(e),
            ProtocolError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(e: std::io::Error) -> Self {
        ProtocolError::Io(e)
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        ProtocolError::Json(e)
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
