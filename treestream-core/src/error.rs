use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StreamError>;

/// Errors surfaced by the codec. Framing problems (`Format`) and checksum
/// failures (`Integrity`) are distinct so callers can tell a malformed
/// stream from a damaged one.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("format error: {0}")]
    Format(String),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("{op}: {source}")]
    Io {
        op: String,
        #[source]
        source: io::Error,
    },

    #[error("unsafe path {path:?}: {reason}")]
    PathSafety { path: String, reason: &'static str },

    #[error("recovery failed: {0}")]
    Recovery(String),
}

impl StreamError {
    pub(crate) fn io(op: impl Into<String>, source: io::Error) -> Self {
        StreamError::Io {
            op: op.into(),
            source,
        }
    }

    /// True when an underlying read stopped short of the bytes it needed.
    pub fn is_truncation(&self) -> bool {
        matches!(self, StreamError::Io { source, .. }
            if source.kind() == io::ErrorKind::UnexpectedEof)
    }
}
