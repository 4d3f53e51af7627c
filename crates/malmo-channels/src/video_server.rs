//! Listener for frame channels.

use crate::events::{ChannelEvent, EventSender};
use malmo_recording::FramePipeline;
use malmo_tcp::{MessageHandler, ServerOptions, TcpError, TcpServer};
use malmo_types::{FrameType, TimestampedBytes, TimestampedVideoFrame};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Recorders = Arc<Mutex<Vec<Arc<FramePipeline>>>>;

struct VideoHandler {
    frame_type: FrameType,
    width: u16,
    height: u16,
    channels: u8,
    events: EventSender,
    recorders: Recorders,
    received: Arc<AtomicU64>,
}

impl MessageHandler for VideoHandler {
    fn on_message(&self, message: TimestampedBytes) {
        // stale packets from a previous mission on a reused port are dropped silently
        let frame = match TimestampedVideoFrame::decode(
            &message,
            self.width,
            self.height,
            self.channels,
            self.frame_type,
        ) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::trace!(frame_type = %self.frame_type, error = %e, "dropping frame");
                return;
            }
        };
        self.received.fetch_add(1, Ordering::Relaxed);

        let recorders = self
            .recorders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        for recorder in recorders {
            if let Err(e) = recorder.push(frame.clone()) {
                tracing::debug!(pipeline = recorder.name(), error = %e, "recorder rejected frame");
            }
        }

        if self.events.send(ChannelEvent::Frame(frame)).is_err() {
            tracing::debug!(frame_type = %self.frame_type, "event queue closed, frame discarded");
        }
    }
}

/// Serves one frame channel with fixed frame dimensions.
pub struct VideoServer {
    frame_type: FrameType,
    width: u16,
    height: u16,
    channels: u8,
    server: TcpServer,
    recorders: Recorders,
    received: Arc<AtomicU64>,
}

impl VideoServer {
    pub async fn bind(
        port: u16,
        frame_type: FrameType,
        width: u16,
        height: u16,
        channels: u8,
        options: ServerOptions,
        events: EventSender,
    ) -> Result<Self, TcpError> {
        let server = TcpServer::bind(port, options).await?;
        let recorders: Recorders = Arc::new(Mutex::new(Vec::new()));
        let received = Arc::new(AtomicU64::new(0));
        server.start(Arc::new(VideoHandler {
            frame_type,
            width,
            height,
            channels,
            events,
            recorders: Arc::clone(&recorders),
            received: Arc::clone(&received),
        }));
        tracing::info!(
            frame_type = %frame_type,
            port = server.port(),
            width,
            height,
            channels,
            "frame channel listening"
        );
        Ok(Self {
            frame_type,
            width,
            height,
            channels,
            server,
            recorders,
            received,
        })
    }

    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    pub fn port(&self) -> u16 {
        self.server.port()
    }

    pub fn geometry(&self) -> (u16, u16, u8) {
        (self.width, self.height, self.channels)
    }

    /// Whether a request for `port` with these dimensions can be served by
    /// this listener.
    pub fn can_reuse(&self, port: u16, width: u16, height: u16, channels: u8) -> bool {
        !self.server.is_closed()
            && (port == 0 || port == self.port())
            && self.geometry() == (width, height, channels)
    }

    /// Frames accepted since the last reset.
    pub fn frames_received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn reset_frames_received(&self) {
        self.received.store(0, Ordering::Relaxed);
    }

    pub fn attach_recorder(&self, pipeline: Arc<FramePipeline>) {
        self.recorders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(pipeline);
    }

    pub fn detach_recorders(&self) {
        self.recorders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    pub fn close(&self) {
        self.detach_recorders();
        self.server.close();
    }
}

impl fmt::Debug for VideoServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoServer")
            .field("frame_type", &self.frame_type)
            .field("port", &self.port())
            .field("geometry", &self.geometry())
            .finish()
    }
}
