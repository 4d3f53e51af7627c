//! Shared value types for the Malmo agent host.
//!
//! This crate holds the data model that every other crate in the workspace
//! exchanges: the candidate client pool, the mission requests the host reads,
//! the mission record specification, timestamped records arriving on each
//! channel, and the world state snapshot handed to the agent.
//!
//! Nothing here performs I/O. Types are plain data with `serde` support so the
//! host binary can load them from configuration and log them as JSON.

pub mod client;
pub mod frame;
pub mod mission;
pub mod record_spec;
pub mod reward;
pub mod timestamped;
pub mod world_state;

pub use client::{ClientInfo, ClientPool, DEFAULT_CLIENT_PORT};
pub use frame::{FrameDecodeError, FrameType, Pose, TimestampedVideoFrame, FRAME_HEADER_SIZE};
pub use mission::{AgentSpec, FrameRequest, Mission, VideoRequest};
pub use record_spec::{FrameRecordingSpec, MissionRecordSpec};
pub use reward::{RewardParseError, TimestampedReward};
pub use timestamped::{iso_timestamp, TimestampedBytes, TimestampedString};
pub use world_state::{ObservationsPolicy, RewardsPolicy, VideoPolicy, WorldState};

/// Version string exchanged with game clients during reservation and checked
/// against installed schema files.
pub const MALMO_VERSION: &str = "0.37.0";
