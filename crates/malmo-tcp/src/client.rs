//! One-shot requests to a game client's mission control port.

use crate::error::TcpError;
use crate::framing::{write_message, Framing};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Largest reply accepted by [`send_and_get_short_reply`].
pub const MAX_SHORT_REPLY_LEN: usize = 1024;

/// Connect and reply deadlines for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientTimeouts {
    pub connect: Duration,
    pub reply: Duration,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(2),
            reply: Duration::from_secs(5),
        }
    }
}

async fn connect(address: &str, port: u16, timeouts: ClientTimeouts) -> Result<TcpStream, TcpError> {
    match timeout(timeouts.connect, TcpStream::connect((address, port))).await {
        Ok(stream) => Ok(stream?),
        Err(_) => Err(TcpError::Timeout(format!("connecting to {address}:{port}"))),
    }
}

/// Connects, sends one framed message and disconnects.
pub async fn send_message(
    address: &str,
    port: u16,
    message: &[u8],
    framing: Framing,
    timeouts: ClientTimeouts,
) -> Result<(), TcpError> {
    let mut stream = connect(address, port, timeouts).await?;
    match timeout(timeouts.reply, write_message(&mut stream, message, framing)).await {
        Ok(result) => result,
        Err(_) => Err(TcpError::Timeout(format!("sending to {address}:{port}"))),
    }
}

/// Sends one framed message and reads a length-prefixed reply of at most
/// [`MAX_SHORT_REPLY_LEN`] bytes.
pub async fn send_and_get_short_reply(
    address: &str,
    port: u16,
    message: &[u8],
    framing: Framing,
    timeouts: ClientTimeouts,
) -> Result<String, TcpError> {
    let mut stream = connect(address, port, timeouts).await?;

    let exchange = async {
        write_message(&mut stream, message, framing).await?;

        let mut header = [0u8; 4];
        read_exact_or_closed(&mut stream, &mut header).await?;
        let len = u32::from_be_bytes(header) as usize;
        if len > MAX_SHORT_REPLY_LEN {
            return Err(TcpError::ReplyTooLong(len));
        }
        let mut body = vec![0u8; len];
        read_exact_or_closed(&mut stream, &mut body).await?;
        Ok::<_, TcpError>(String::from_utf8_lossy(&body).into_owned())
    };

    match timeout(timeouts.reply, exchange).await {
        Ok(result) => result,
        Err(_) => Err(TcpError::Timeout(format!(
            "waiting for reply from {address}:{port}"
        ))),
    }
}

async fn read_exact_or_closed(stream: &mut TcpStream, buf: &mut [u8]) -> Result<(), TcpError> {
    match stream.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(TcpError::ConnectionClosed),
        Err(e) => Err(e.into()),
    }
}
