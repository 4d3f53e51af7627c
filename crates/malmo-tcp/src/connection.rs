//! Outbound command connection to a game client.

use crate::error::TcpError;
use crate::framing::{write_message, Framing};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Queued writer of newline-terminated commands.
///
/// [`CommandConnection::send`] never blocks. Lines are written in order by a
/// background task that connects on open. If the connection cannot be made,
/// or a write fails, the task logs the failure and later sends return
/// [`TcpError::ConnectionClosed`].
#[derive(Debug)]
pub struct CommandConnection {
    address: String,
    port: u16,
    sender: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl CommandConnection {
    /// Starts connecting to `address:port`. Must be called inside a tokio
    /// runtime.
    pub fn open(address: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        let address = address.into();
        let (sender, receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(write_commands(
            address.clone(),
            port,
            connect_timeout,
            receiver,
        ));
        Self {
            address,
            port,
            sender,
            task,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Queues one command line.
    pub fn send(&self, command: impl Into<String>) -> Result<(), TcpError> {
        self.sender
            .send(command.into())
            .map_err(|_| TcpError::ConnectionClosed)
    }

    /// Stops accepting commands and waits for queued lines to be written.
    pub async fn close(self) {
        drop(self.sender);
        if let Err(e) = self.task.await {
            tracing::debug!(error = %e, "command writer task ended abnormally");
        }
    }
}

async fn write_commands(
    address: String,
    port: u16,
    connect_timeout: Duration,
    mut receiver: mpsc::UnboundedReceiver<String>,
) {
    let connected = tokio::time::timeout(connect_timeout, TcpStream::connect((address.as_str(), port))).await;
    let mut stream = match connected {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            tracing::warn!(%address, port, error = %e, "failed to open command connection");
            return;
        }
        Err(_) => {
            tracing::warn!(%address, port, "timed out opening command connection");
            return;
        }
    };
    tracing::debug!(%address, port, "command connection open");

    while let Some(command) = receiver.recv().await {
        if let Err(e) = write_message(&mut stream, command.as_bytes(), Framing::LineDelimited).await {
            tracing::warn!(%address, port, error = %e, "failed to send command");
            return;
        }
    }
}
