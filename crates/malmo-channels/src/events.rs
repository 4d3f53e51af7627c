use malmo_types::{TimestampedString, TimestampedVideoFrame};
use tokio::sync::mpsc;

/// A complete message received on one of the channels.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// XML from the mission control channel.
    Control(TimestampedString),
    /// A decoded frame that passed size validation.
    Frame(TimestampedVideoFrame),
    /// Raw `<dimension>:<value>,...` reward text.
    Reward(TimestampedString),
    /// Observation text, usually JSON.
    Observation(TimestampedString),
}

impl ChannelEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Control(_) => "control",
            Self::Frame(_) => "frame",
            Self::Reward(_) => "reward",
            Self::Observation(_) => "observation",
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<ChannelEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ChannelEvent>;
