//! The parts of a mission the host needs to read.
//!
//! The mission document itself is opaque text; it is embedded verbatim in the
//! mission init handshake. The per-agent frame requests decide which listeners
//! get opened and what frame sizes they accept.

use crate::frame::FrameType;
use serde::{Deserialize, Serialize};

/// Colour video request for one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRequest {
    pub width: u16,
    pub height: u16,
    /// Adds a depth plane as a fourth channel.
    #[serde(default)]
    pub want_depth: bool,
}

/// Request for a depth, luminance or colour-map stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRequest {
    pub width: u16,
    pub height: u16,
}

/// Everything requested for one agent role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    #[serde(default)]
    pub video: Option<VideoRequest>,
    #[serde(default)]
    pub depth: Option<FrameRequest>,
    #[serde(default)]
    pub luminance: Option<FrameRequest>,
    #[serde(default)]
    pub colour_map: Option<FrameRequest>,
}

impl AgentSpec {
    /// Returns `(width, height, channels)` for a requested frame channel.
    pub fn frame_geometry(&self, frame_type: FrameType) -> Option<(u16, u16, u8)> {
        match frame_type {
            FrameType::Video => self
                .video
                .map(|v| (v.width, v.height, if v.want_depth { 4 } else { 3 })),
            FrameType::DepthMap => self.depth.map(|r| (r.width, r.height, 4)),
            FrameType::Luminance => self.luminance.map(|r| (r.width, r.height, 1)),
            FrameType::ColourMap => self.colour_map.map(|r| (r.width, r.height, 3)),
        }
    }

    /// Frame channels this agent asked for, in [`FrameType::ALL`] order.
    pub fn requested_frames(&self) -> Vec<FrameType> {
        FrameType::ALL
            .into_iter()
            .filter(|t| self.frame_geometry(*t).is_some())
            .collect()
    }
}

/// A mission as seen by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mission {
    /// Full mission document, embedded verbatim into mission init.
    pub document: String,
    /// One entry per agent role.
    pub agents: Vec<AgentSpec>,
}

impl Mission {
    pub fn new(document: impl Into<String>, agents: Vec<AgentSpec>) -> Self {
        Self {
            document: document.into(),
            agents,
        }
    }

    pub fn number_of_agents(&self) -> usize {
        self.agents.len()
    }

    pub fn agent(&self, role: usize) -> Option<&AgentSpec> {
        self.agents.get(role)
    }

    pub fn is_multi_agent(&self) -> bool {
        self.agents.len() > 1
    }
}
