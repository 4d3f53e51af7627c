//! What to persist from a mission and where.

use crate::frame::FrameType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// How one frame channel is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameRecordingSpec {
    /// Pipe frames into an external video encoder.
    Encoder {
        fps: u32,
        bit_rate: u64,
        /// Skip frames that arrive faster than `fps`.
        #[serde(default = "default_drop_input_frames")]
        drop_input_frames: bool,
    },
    /// Store individual frames in compressed tar bundles.
    Archive {
        /// Write `.npy` arrays instead of images.
        #[serde(default)]
        numeric_arrays: bool,
    },
}

fn default_drop_input_frames() -> bool {
    true
}

impl FrameRecordingSpec {
    /// Encoder recording at 20 fps and 400 kbit/s.
    pub fn default_encoder() -> Self {
        Self::Encoder {
            fps: 20,
            bit_rate: 400_000,
            drop_input_frames: true,
        }
    }
}

/// Mission record specification. Immutable once a mission starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionRecordSpec {
    /// Archive written when the mission closes. Nothing is recorded without it.
    #[serde(default)]
    pub destination: Option<PathBuf>,
    #[serde(default)]
    pub record_commands: bool,
    #[serde(default)]
    pub record_rewards: bool,
    #[serde(default)]
    pub record_observations: bool,
    #[serde(default)]
    pub frames: BTreeMap<FrameType, FrameRecordingSpec>,
}

impl MissionRecordSpec {
    /// A specification that records nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// A specification that writes its archive to `destination`.
    pub fn with_destination(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: Some(destination.into()),
            ..Self::default()
        }
    }

    pub fn record_commands(mut self) -> Self {
        self.record_commands = true;
        self
    }

    pub fn record_rewards(mut self) -> Self {
        self.record_rewards = true;
        self
    }

    pub fn record_observations(mut self) -> Self {
        self.record_observations = true;
        self
    }

    pub fn record_frames(mut self, frame_type: FrameType, spec: FrameRecordingSpec) -> Self {
        self.frames.insert(frame_type, spec);
        self
    }

    pub fn is_recording(&self) -> bool {
        self.destination.is_some()
    }

    /// Recording settings for a frame channel, if recording is enabled at all.
    pub fn frame_spec(&self, frame_type: FrameType) -> Option<FrameRecordingSpec> {
        if !self.is_recording() {
            return None;
        }
        self.frames.get(&frame_type).copied()
    }

    pub fn is_recording_commands(&self) -> bool {
        self.is_recording() && self.record_commands
    }

    pub fn is_recording_rewards(&self) -> bool {
        self.is_recording() && self.record_rewards
    }

    pub fn is_recording_observations(&self) -> bool {
        self.is_recording() && self.record_observations
    }
}
