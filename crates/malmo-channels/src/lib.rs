//! Channel servers and world state aggregation.
//!
//! Each data channel from a game client (control, rewards, observations and
//! the four frame channels) is served by a listener that turns complete
//! messages into [`ChannelEvent`]s and sends them into the orchestrator's
//! event queue. The orchestrator applies data events to a
//! [`WorldStateStore`], which merges them under the configured policies and
//! hands out snapshots.
//!
//! Frame channels additionally forward every accepted frame to the recording
//! pipelines attached for the current mission.

pub mod events;
pub mod string_server;
pub mod video_server;
pub mod world_state;

pub use events::{ChannelEvent, EventReceiver, EventSender};
pub use string_server::{StringChannel, StringServer};
pub use video_server::VideoServer;
pub use world_state::WorldStateStore;
