//! Errors raised by the framing layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TcpError {
    /// Every port in the automatic range was taken.
    #[error("no port available in range {start}-{end}")]
    NoPortAvailable { start: u16, end: u16 },

    /// The explicitly requested port could not be bound.
    #[error("port {0} is already in use")]
    PortInUse(u16),

    /// An underlying socket operation failed.
    #[error("tcp i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A connect or read did not finish in time.
    #[error("timed out: {0}")]
    Timeout(String),

    /// A short reply announced more bytes than allowed.
    #[error("reply of {0} bytes exceeds the short reply limit")]
    ReplyTooLong(usize),

    /// A message announced more bytes than the framing layer accepts.
    #[error("message of {0} bytes exceeds the message limit")]
    MessageTooLong(usize),

    /// The peer or the local writer went away.
    #[error("connection closed")]
    ConnectionClosed,
}
