//! Mission lifecycle phases and their transitions.

use crate::error::MissionError;
use serde::Serialize;
use std::fmt;

/// Where a host is in the lifecycle of its current mission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionPhase {
    #[default]
    Idle,
    Validating,
    ServersUp,
    Reserving,
    FindingServer,
    FindingClient,
    /// A client accepted the mission; waiting for its mission init.
    AwaitingStart,
    Running,
    Ended,
    Closed,
}

impl MissionPhase {
    /// Phases in which a start request is still being processed.
    pub fn is_starting(self) -> bool {
        matches!(
            self,
            Self::Validating
                | Self::ServersUp
                | Self::Reserving
                | Self::FindingServer
                | Self::FindingClient
        )
    }
}

impl fmt::Display for MissionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionEvent {
    StartRequested,
    Validated,
    BeginReservation,
    BeginServerSearch,
    BeginClientSearch,
    ClientAccepted,
    MissionInitReceived,
    MissionEndedReceived,
    TeardownComplete,
    Failed,
    CloseRequested,
}

/// Returns the phase reached from `from` on `event`.
///
/// A start request replaces a mission that was accepted but never began, so
/// it is allowed from `AwaitingStart` as well as from the resting phases.
pub fn transition(from: MissionPhase, event: MissionEvent) -> Result<MissionPhase, MissionError> {
    use MissionEvent as E;
    use MissionPhase as P;

    let next = match (from, event) {
        (_, E::Failed) | (_, E::CloseRequested) => P::Closed,

        (P::Idle | P::Closed | P::AwaitingStart, E::StartRequested) => P::Validating,
        (p, E::StartRequested) if p.is_starting() || p == P::Running || p == P::Ended => {
            return Err(MissionError::AlreadyRunning)
        }

        (P::Validating, E::Validated) => P::ServersUp,
        (P::ServersUp, E::BeginReservation) => P::Reserving,
        (P::ServersUp, E::BeginServerSearch) => P::FindingServer,
        (P::ServersUp | P::Reserving | P::FindingServer, E::BeginClientSearch) => P::FindingClient,
        (P::FindingClient, E::ClientAccepted) => P::AwaitingStart,
        (P::AwaitingStart, E::MissionInitReceived) => P::Running,
        (P::Running | P::AwaitingStart, E::MissionEndedReceived) => P::Ended,
        (P::Ended, E::TeardownComplete) => P::Closed,

        (from, event) => return Err(MissionError::InvalidTransition { from, event }),
    };
    Ok(next)
}
