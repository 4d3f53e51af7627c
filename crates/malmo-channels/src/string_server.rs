//! Listener for text channels.

use crate::events::{ChannelEvent, EventSender};
use malmo_recording::RecordFile;
use malmo_tcp::{MessageHandler, ServerOptions, TcpError, TcpServer};
use malmo_types::{TimestampedBytes, TimestampedString};
use std::fmt;
use std::sync::{Arc, Mutex};

/// Which text channel a [`StringServer`] serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringChannel {
    Control,
    Rewards,
    Observations,
}

impl StringChannel {
    fn event(self, text: TimestampedString) -> ChannelEvent {
        match self {
            Self::Control => ChannelEvent::Control(text),
            Self::Rewards => ChannelEvent::Reward(text),
            Self::Observations => ChannelEvent::Observation(text),
        }
    }
}

impl fmt::Display for StringChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Control => "control",
            Self::Rewards => "rewards",
            Self::Observations => "observations",
        })
    }
}

type RecordSlot = Arc<Mutex<Option<Arc<RecordFile>>>>;

struct StringHandler {
    channel: StringChannel,
    events: EventSender,
    record: RecordSlot,
}

impl MessageHandler for StringHandler {
    fn on_message(&self, message: TimestampedBytes) {
        let text = TimestampedString::from_bytes(&message);

        let record = self
            .record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(record) = record {
            if let Err(e) = record.append(&text) {
                tracing::warn!(channel = %self.channel, error = %e, "failed to record message");
            }
        }

        if self.events.send(self.channel.event(text)).is_err() {
            tracing::debug!(channel = %self.channel, "event queue closed, message discarded");
        }
    }
}

/// Serves one text channel. Listens from construction until closed.
pub struct StringServer {
    channel: StringChannel,
    server: TcpServer,
    record: RecordSlot,
}

impl StringServer {
    pub async fn bind(
        port: u16,
        channel: StringChannel,
        options: ServerOptions,
        events: EventSender,
    ) -> Result<Self, TcpError> {
        let server = TcpServer::bind(port, options).await?;
        let record: RecordSlot = Arc::new(Mutex::new(None));
        server.start(Arc::new(StringHandler {
            channel,
            events,
            record: Arc::clone(&record),
        }));
        tracing::info!(channel = %channel, port = server.port(), "string channel listening");
        Ok(Self {
            channel,
            server,
            record,
        })
    }

    pub fn channel(&self) -> StringChannel {
        self.channel
    }

    pub fn port(&self) -> u16 {
        self.server.port()
    }

    /// Whether a request for `port` can be served by this listener.
    pub fn can_reuse(&self, port: u16) -> bool {
        !self.server.is_closed() && (port == 0 || port == self.port())
    }

    /// Appends every subsequent message to `record`, or stops recording.
    pub fn record_to(&self, record: Option<Arc<RecordFile>>) {
        *self
            .record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = record;
    }

    pub fn close(&self) {
        self.record_to(None);
        self.server.close();
    }
}

impl fmt::Debug for StringServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringServer")
            .field("channel", &self.channel)
            .field("port", &self.port())
            .finish()
    }
}
