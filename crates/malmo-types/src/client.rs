//! Candidate game client endpoints.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Mission control port a game client listens on unless told otherwise.
pub const DEFAULT_CLIENT_PORT: u16 = 10000;

fn default_client_port() -> u16 {
    DEFAULT_CLIENT_PORT
}

/// Address and mission control port of one game client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientInfo {
    /// IP address or hostname.
    pub address: String,
    /// Mission control port.
    #[serde(default = "default_client_port")]
    pub port: u16,
}

impl ClientInfo {
    /// Creates a client entry with an explicit port.
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// Creates a client entry on [`DEFAULT_CLIENT_PORT`].
    pub fn with_default_port(address: impl Into<String>) -> Self {
        Self::new(address, DEFAULT_CLIENT_PORT)
    }
}

impl fmt::Display for ClientInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Ordered set of clients a mission may be started on.
///
/// Discovery reads the pool and may derive a reordered or truncated copy but
/// never mutates the caller's pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientPool {
    clients: Vec<ClientInfo>,
}

impl ClientPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a client to the end of the pool.
    pub fn add(&mut self, client: ClientInfo) {
        self.clients.push(client);
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ClientInfo> {
        self.clients.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ClientInfo> {
        self.clients.iter()
    }

    /// Returns the pool rotated so that the entry at `offset mod len` comes
    /// first. An empty pool yields an empty sequence.
    pub fn rotated(&self, offset: usize) -> Vec<ClientInfo> {
        if self.clients.is_empty() {
            return Vec::new();
        }
        let start = offset % self.clients.len();
        self.clients[start..]
            .iter()
            .chain(self.clients[..start].iter())
            .cloned()
            .collect()
    }
}

impl From<Vec<ClientInfo>> for ClientPool {
    fn from(clients: Vec<ClientInfo>) -> Self {
        Self { clients }
    }
}

impl FromIterator<ClientInfo> for ClientPool {
    fn from_iter<I: IntoIterator<Item = ClientInfo>>(iter: I) -> Self {
        Self {
            clients: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ClientPool {
    type Item = &'a ClientInfo;
    type IntoIter = std::slice::Iter<'a, ClientInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.clients.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_of(n: u16) -> ClientPool {
        (0..n)
            .map(|i| ClientInfo::new("127.0.0.1", 10000 + i))
            .collect()
    }

    #[test]
    fn rotation_starts_at_offset_and_wraps() {
        let pool = pool_of(5);
        let ports: Vec<u16> = pool.rotated(3).iter().map(|c| c.port).collect();
        assert_eq!(ports, vec![10003, 10004, 10000, 10001, 10002]);
    }

    #[test]
    fn rotation_offset_is_taken_modulo_len() {
        let pool = pool_of(3);
        assert_eq!(pool.rotated(4), pool.rotated(1));
        assert!(ClientPool::new().rotated(7).is_empty());
    }

    #[test]
    fn default_port_applies_when_missing_from_json() {
        let client: ClientInfo = serde_json::from_str(r#"{"address":"10.0.0.2"}"#).unwrap();
        assert_eq!(client.port, DEFAULT_CLIENT_PORT);
        assert_eq!(client.to_string(), "10.0.0.2:10000");
    }
}
