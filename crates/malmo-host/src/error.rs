//! Error types for starting, running and controlling a mission.

use crate::state::{MissionEvent, MissionPhase};
use crate::xml::XmlError;
use malmo_recording::RecordingError;
use malmo_tcp::TcpError;
use thiserror::Error;

/// Errors returned by [`crate::AgentHost`] operations.
#[derive(Debug, Error)]
pub enum MissionError {
    /// The requested role is outside the mission's agent range.
    #[error("role {role} requested but the mission has {agents} agent(s)")]
    BadRoleRequest { role: usize, agents: usize },

    /// Video width must be a multiple of 4 and height a multiple of 2.
    #[error("requested video size {width}x{height} is not supported")]
    BadVideoRequest { width: u16, height: u16 },

    /// A mission is already running or being started.
    #[error("a mission is already running")]
    AlreadyRunning,

    /// No client in the pool accepted the mission.
    #[error("no client in the pool accepted the mission")]
    InsufficientClientsAvailable,

    /// Too few clients could be reserved for a multi-agent mission.
    #[error("reserved {reserved} of {required} required clients")]
    InsufficientClients { required: usize, reserved: usize },

    /// A client knows of the mission but its server is not up yet.
    #[error("the mission server is still warming up")]
    ServerWarmingUp,

    /// No client reported a server for this experiment.
    #[error("no mission server found for this experiment")]
    ServerNotFound,

    /// A peer replied with something that could not be interpreted.
    #[error("transmission error: {0}")]
    TransmissionError(String),

    /// There is no command connection to send on.
    #[error("no command port is available")]
    NoCommandPort,

    /// The schema files are missing or do not match this version.
    #[error("bad installation: {0}")]
    BadInstallation(String),

    /// The client is in a mission and refused to be killed.
    #[error("the client is busy and cannot be killed")]
    CanNotKillBusyClient,

    /// The client cannot be relaunched and refused to be killed.
    #[error("the client is not replaceable and cannot be killed")]
    CanNotKillIrreplaceableClient,

    /// An event arrived that the current phase does not accept.
    #[error("event {event:?} is not valid in phase {from:?}")]
    InvalidTransition {
        from: MissionPhase,
        event: MissionEvent,
    },

    /// A listener could not be opened.
    #[error("listener error: {0}")]
    Listener(#[from] TcpError),

    /// A recording could not be created or written.
    #[error("recording error: {0}")]
    Recording(#[from] RecordingError),

    /// A control document could not be read.
    #[error("xml error: {0}")]
    Xml(#[from] XmlError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
