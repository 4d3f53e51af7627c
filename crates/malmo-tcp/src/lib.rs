//! TCP framing layer for talking to game clients.
//!
//! Every channel between the host and a game client is a plain TCP stream
//! carrying either length-prefixed messages (a 4-byte big-endian length then
//! the body) or newline-terminated lines. This crate provides:
//!
//! - [`TcpServer`]: a listener bound to a fixed or randomly chosen port that
//!   hands each complete message to a [`MessageHandler`], optionally writing a
//!   fixed reply back first.
//! - [`send_message`] / [`send_and_get_short_reply`]: one-shot requests used
//!   by the discovery protocol.
//! - [`CommandConnection`]: an outbound, queued line writer for agent
//!   commands.

pub mod client;
pub mod connection;
pub mod error;
pub mod framing;
pub mod server;

pub use client::{send_and_get_short_reply, send_message, ClientTimeouts, MAX_SHORT_REPLY_LEN};
pub use connection::CommandConnection;
pub use error::TcpError;
pub use framing::{read_message, write_message, Framing, MAX_MESSAGE_LEN};
pub use server::{MessageHandler, ServerOptions, TcpServer};
