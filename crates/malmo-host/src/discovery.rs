//! Request/reply exchanges with game clients on their mission control ports.
//!
//! Every request is a newline-terminated line and every reply a short
//! length-prefixed string. A client that cannot be reached, times out or
//! answers with something unexpected is treated as having declined.

use crate::error::MissionError;
use crate::mission_init::MissionInit;
use malmo_tcp::{send_and_get_short_reply, ClientTimeouts, Framing, TcpError};
use malmo_types::{ClientInfo, ClientPool, MALMO_VERSION};

pub const REPLY_OK: &str = "MALMOOK";
pub const REPLY_BUSY: &str = "MALMOBUSY";
pub const REPLY_NOT_KILLABLE: &str = "MALMOERRORNOTKILLABLE";
pub const REPLY_SERVER_PREFIX: &str = "MALMOS";
pub const REPLY_NO_SERVER_YET: &str = "MALMONOSERVERYET";

pub const REQUEST_CANCEL: &str = "MALMO_CANCEL_REQUEST";
pub const REQUEST_KILL: &str = "MALMO_KILL_CLIENT";

#[derive(Debug, Clone, Copy)]
pub struct Discovery {
    pub timeouts: ClientTimeouts,
    /// How long a reserved client waits for the mission before giving up.
    pub reservation_timeout_ms: u64,
}

impl Default for Discovery {
    fn default() -> Self {
        Self {
            timeouts: ClientTimeouts::default(),
            reservation_timeout_ms: 60_000,
        }
    }
}

impl Discovery {
    async fn request(&self, client: &ClientInfo, message: &str) -> Result<String, TcpError> {
        let reply = send_and_get_short_reply(
            &client.address,
            client.port,
            message.as_bytes(),
            Framing::LineDelimited,
            self.timeouts,
        )
        .await;
        match &reply {
            Ok(text) => tracing::debug!(client = %client, reply = %text, "client replied"),
            Err(e) => tracing::debug!(client = %client, error = %e, "client request failed"),
        }
        reply
    }

    /// Reserves `count` clients for a multi-agent mission.
    ///
    /// Clients are asked in pool order until enough have accepted. If the pool
    /// runs out first, every reservation made is cancelled again.
    pub async fn reserve_clients(
        &self,
        pool: &ClientPool,
        count: usize,
        experiment_id: &str,
    ) -> Result<ClientPool, MissionError> {
        let request = format!(
            "MALMO_REQUEST_CLIENT:{MALMO_VERSION}:{}:{experiment_id}",
            self.reservation_timeout_ms
        );

        let mut reserved = ClientPool::new();
        for client in pool.iter() {
            if reserved.len() == count {
                break;
            }
            match self.request(client, &request).await {
                Ok(reply) if reply.starts_with(REPLY_OK) => {
                    tracing::info!(client = %client, "client reserved");
                    reserved.add(client.clone());
                }
                Ok(reply) => tracing::debug!(client = %client, reply = %reply, "reservation declined"),
                Err(e) => tracing::warn!(client = %client, error = %e, "reservation request failed"),
            }
        }

        if reserved.len() < count {
            tracing::warn!(required = count, reserved = reserved.len(), "not enough clients, cancelling reservations");
            self.cancel_reservations(&reserved).await;
            return Err(MissionError::InsufficientClients {
                required: count,
                reserved: reserved.len(),
            });
        }
        Ok(reserved)
    }

    pub async fn cancel_reservations(&self, reserved: &ClientPool) {
        for client in reserved.iter() {
            if let Err(e) = self.request(client, REQUEST_CANCEL).await {
                tracing::warn!(client = %client, error = %e, "failed to cancel reservation");
            }
        }
    }

    /// Asks the pool where the mission server for `experiment_id` is running.
    pub async fn find_server(
        &self,
        pool: &ClientPool,
        experiment_id: &str,
    ) -> Result<(String, u16), MissionError> {
        let request = format!("MALMO_FIND_SERVER{experiment_id}");
        let mut warming_up = false;

        for client in pool.iter() {
            let reply = match self.request(client, &request).await {
                Ok(reply) => reply,
                Err(_) => continue,
            };
            if let Some(location) = reply.strip_prefix(REPLY_SERVER_PREFIX) {
                return parse_server_location(location);
            }
            if reply.starts_with(REPLY_NO_SERVER_YET) {
                warming_up = true;
            }
        }

        if warming_up {
            Err(MissionError::ServerWarmingUp)
        } else {
            Err(MissionError::ServerNotFound)
        }
    }

    /// Offers the mission to each client in turn, starting at `role`, until
    /// one accepts. Returns the accepting client.
    pub async fn find_client(
        &self,
        pool: &ClientPool,
        role: usize,
        mission_init: &mut MissionInit,
    ) -> Result<ClientInfo, MissionError> {
        for client in pool.rotated(role) {
            mission_init.set_client(&client);
            let xml = mission_init.to_xml();
            match self.request(&client, &xml).await {
                Ok(reply) if reply == REPLY_OK => {
                    tracing::info!(client = %client, role, "client accepted mission");
                    return Ok(client);
                }
                Ok(reply) => tracing::debug!(client = %client, reply = %reply, "client declined mission"),
                Err(e) => tracing::debug!(client = %client, error = %e, "client unavailable"),
            }
        }
        Err(MissionError::InsufficientClientsAvailable)
    }

    /// Asks a client to shut down. `Ok(false)` means it did not answer.
    pub async fn kill_client(&self, client: &ClientInfo) -> Result<bool, MissionError> {
        match self.request(client, REQUEST_KILL).await {
            Ok(reply) if reply == REPLY_OK => Ok(true),
            Ok(reply) if reply == REPLY_BUSY => Err(MissionError::CanNotKillBusyClient),
            Ok(reply) if reply == REPLY_NOT_KILLABLE => {
                Err(MissionError::CanNotKillIrreplaceableClient)
            }
            Ok(_) | Err(_) => Ok(false),
        }
    }
}

fn parse_server_location(location: &str) -> Result<(String, u16), MissionError> {
    let (address, port) = location.split_once(':').ok_or_else(|| {
        MissionError::TransmissionError(format!("malformed server location: {location}"))
    })?;
    let port = port.trim().parse().map_err(|_| {
        MissionError::TransmissionError(format!("malformed server port: {port}"))
    })?;
    Ok((address.to_string(), port))
}
