//! Agent-side orchestration of Malmo missions.
//!
//! An [`AgentHost`] opens the listeners a game client streams a mission's
//! data to, finds a client in a [`malmo_types::ClientPool`] willing to run the
//! mission, and follows the mission through its [`MissionPhase`]s as control
//! messages arrive. Agents poll the accumulated world state between actions
//! and send commands back over the client's command port.
//!
//! Multi-agent missions coordinate through the same pool: role 0 reserves a
//! client for every agent, later roles ask the pool where the mission server
//! is running.

pub mod agent_host;
pub mod config;
pub mod discovery;
pub mod error;
pub mod installation;
pub mod mission_ended;
pub mod mission_init;
pub mod state;
pub mod xml;

pub use agent_host::{AgentHost, HostSettings};
pub use config::{load_config, ConfigError, HostConfig};
pub use discovery::Discovery;
pub use error::MissionError;
pub use installation::{check_installation, check_installation_once};
pub use mission_ended::{MissionEnded, VideoDiagnostics};
pub use mission_init::{ClientAgentConnection, MissionInit};
pub use state::{transition, MissionEvent, MissionPhase};
