//! Listener that delivers framed messages to a handler.

use crate::error::TcpError;
use crate::framing::{read_message, write_message, Framing};
use malmo_types::TimestampedBytes;
use rand::seq::SliceRandom;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};

/// Receives every complete message read by a [`TcpServer`].
///
/// Called on runtime threads; implementations must return quickly.
pub trait MessageHandler: Send + Sync + 'static {
    fn on_message(&self, message: TimestampedBytes);
}

impl<F> MessageHandler for F
where
    F: Fn(TimestampedBytes) + Send + Sync + 'static,
{
    fn on_message(&self, message: TimestampedBytes) {
        self(message)
    }
}

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub bind_address: IpAddr,
    pub framing: Framing,
    /// Written back, length-prefixed, after every complete message.
    pub fixed_reply: Option<Vec<u8>>,
    /// Ports tried in random order when port 0 is requested.
    pub port_range_start: u16,
    pub port_range_end: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            framing: Framing::LengthPrefixed,
            fixed_reply: None,
            port_range_start: 10000,
            port_range_end: 11000,
        }
    }
}

impl ServerOptions {
    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    pub fn with_fixed_reply(mut self, reply: impl Into<Vec<u8>>) -> Self {
        self.fixed_reply = Some(reply.into());
        self
    }

    pub fn with_port_range(mut self, start: u16, end: u16) -> Self {
        self.port_range_start = start;
        self.port_range_end = end;
        self
    }
}

/// A bound listener. Accepting begins with [`TcpServer::start`].
pub struct TcpServer {
    port: u16,
    options: ServerOptions,
    listener: Mutex<Option<TcpListener>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    closed: Arc<AtomicBool>,
}

impl TcpServer {
    /// Binds `port`, or when `port` is 0 the first free port of the
    /// configured range, tried in random order.
    pub async fn bind(port: u16, options: ServerOptions) -> Result<Self, TcpError> {
        let listener = if port == 0 {
            bind_in_range(&options).await?
        } else {
            match TcpListener::bind(SocketAddr::new(options.bind_address, port)).await {
                Ok(listener) => listener,
                Err(e) if e.kind() == ErrorKind::AddrInUse => return Err(TcpError::PortInUse(port)),
                Err(e) => return Err(e.into()),
            }
        };
        let port = listener.local_addr()?.port();
        tracing::debug!(port, framing = ?options.framing, "listener bound");

        Ok(Self {
            port,
            options,
            listener: Mutex::new(Some(listener)),
            accept_task: Mutex::new(None),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Port the listener is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn framing(&self) -> Framing {
        self.options.framing
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Starts accepting connections and delivering messages to `handler`.
    ///
    /// Calling it again after the first start has no effect.
    pub fn start(&self, handler: Arc<dyn MessageHandler>) {
        let listener = match self.listener.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(listener) = listener else {
            return;
        };

        let framing = self.options.framing;
        let reply: Option<Arc<[u8]>> = self.options.fixed_reply.clone().map(Arc::from);
        let closed = Arc::clone(&self.closed);
        let port = self.port;

        let task = tokio::spawn(async move {
            let mut connections = JoinSet::new();
            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            tracing::debug!(port, %peer, "accepted connection");
                            connections.spawn(serve_connection(
                                stream,
                                framing,
                                reply.clone(),
                                Arc::clone(&handler),
                                Arc::clone(&closed),
                            ));
                        }
                        Err(e) => {
                            tracing::warn!(port, error = %e, "accept failed");
                        }
                    },
                    Some(_) = connections.join_next(), if !connections.is_empty() => {}
                }
            }
        });

        if let Ok(mut guard) = self.accept_task.lock() {
            *guard = Some(task);
        }
    }

    /// Stops accepting and drops every open connection. No message is
    /// delivered once this returns.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut guard) = self.accept_task.lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
        if let Ok(mut guard) = self.listener.lock() {
            guard.take();
        }
        tracing::debug!(port = self.port, "listener closed");
    }
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TcpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpServer")
            .field("port", &self.port)
            .field("framing", &self.options.framing)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn bind_in_range(options: &ServerOptions) -> Result<TcpListener, TcpError> {
    let mut ports: Vec<u16> = (options.port_range_start..=options.port_range_end).collect();
    ports.shuffle(&mut rand::thread_rng());

    for port in ports {
        match TcpListener::bind(SocketAddr::new(options.bind_address, port)).await {
            Ok(listener) => return Ok(listener),
            Err(e) => tracing::trace!(port, error = %e, "port unavailable"),
        }
    }

    Err(TcpError::NoPortAvailable {
        start: options.port_range_start,
        end: options.port_range_end,
    })
}

async fn serve_connection(
    stream: TcpStream,
    framing: Framing,
    reply: Option<Arc<[u8]>>,
    handler: Arc<dyn MessageHandler>,
    closed: Arc<AtomicBool>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        match read_message(&mut reader, framing).await {
            Ok(Some(data)) => {
                let message = TimestampedBytes::now(data);
                if let Some(reply) = &reply {
                    if let Err(e) =
                        write_message(&mut write_half, reply, Framing::LengthPrefixed).await
                    {
                        tracing::debug!(error = %e, "failed to write fixed reply");
                        break;
                    }
                }
                if closed.load(Ordering::SeqCst) {
                    break;
                }
                handler.on_message(message);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "connection read failed");
                break;
            }
        }
    }
}
