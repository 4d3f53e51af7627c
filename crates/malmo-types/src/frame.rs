//! Video frames received on the frame channels.

use crate::timestamped::TimestampedBytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Size of the big-endian pose header preceding every frame payload:
/// five `f32` values (x, y, z, yaw, pitch).
pub const FRAME_HEADER_SIZE: usize = 20;

/// Which producer a frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    /// Colour video, optionally with a depth plane as the fourth channel.
    Video,
    /// Depth map, one 32-bit float per pixel packed as four bytes.
    DepthMap,
    /// Single-channel luminance.
    Luminance,
    /// Semantic colour map.
    ColourMap,
}

impl FrameType {
    pub const ALL: [FrameType; 4] = [
        FrameType::Video,
        FrameType::DepthMap,
        FrameType::Luminance,
        FrameType::ColourMap,
    ];

    /// Name used in mission-ended diagnostics.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Video => "VIDEO",
            Self::DepthMap => "DEPTH_MAP",
            Self::Luminance => "LUMINANCE",
            Self::ColourMap => "COLOUR_MAP",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "VIDEO" => Some(Self::Video),
            "DEPTH_MAP" => Some(Self::DepthMap),
            "LUMINANCE" => Some(Self::Luminance),
            "COLOUR_MAP" => Some(Self::ColourMap),
            _ => None,
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Position and orientation of the player when the frame was rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub yaw: f32,
    pub pitch: f32,
}

impl Pose {
    fn from_header(header: &[u8]) -> Self {
        let read = |i: usize| {
            let mut word = [0u8; 4];
            word.copy_from_slice(&header[i * 4..i * 4 + 4]);
            f32::from_be_bytes(word)
        };
        Self {
            x: read(0),
            y: read(1),
            z: read(2),
            yaw: read(3),
            pitch: read(4),
        }
    }

    /// Encodes the pose as the 20-byte big-endian header.
    pub fn to_header(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        for (i, value) in [self.x, self.y, self.z, self.yaw, self.pitch]
            .into_iter()
            .enumerate()
        {
            header[i * 4..i * 4 + 4].copy_from_slice(&value.to_be_bytes());
        }
        header
    }
}

/// Errors raised while decoding a frame payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameDecodeError {
    /// Payload size does not match header plus `width * height * channels`.
    #[error("frame payload is {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// One decoded frame with pixels stored top row first.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampedVideoFrame {
    pub timestamp: DateTime<Utc>,
    pub width: u16,
    pub height: u16,
    pub channels: u8,
    pub frame_type: FrameType,
    pub pose: Pose,
    pub pixels: Vec<u8>,
}

impl TimestampedVideoFrame {
    /// Number of payload bytes a frame of these dimensions occupies on the wire.
    pub fn expected_len(width: u16, height: u16, channels: u8) -> usize {
        FRAME_HEADER_SIZE + width as usize * height as usize * channels as usize
    }

    /// Decodes a wire payload: pose header, then scanlines bottom to top.
    pub fn decode(
        message: &TimestampedBytes,
        width: u16,
        height: u16,
        channels: u8,
        frame_type: FrameType,
    ) -> Result<Self, FrameDecodeError> {
        let expected = Self::expected_len(width, height, channels);
        if message.data.len() != expected {
            return Err(FrameDecodeError::LengthMismatch {
                expected,
                actual: message.data.len(),
            });
        }

        let pose = Pose::from_header(&message.data[..FRAME_HEADER_SIZE]);
        let body = &message.data[FRAME_HEADER_SIZE..];
        let stride = width as usize * channels as usize;
        let mut pixels = Vec::with_capacity(body.len());
        if stride > 0 {
            for row in body.chunks_exact(stride).rev() {
                pixels.extend_from_slice(row);
            }
        }

        Ok(Self {
            timestamp: message.timestamp,
            width,
            height,
            channels,
            frame_type,
            pose,
            pixels,
        })
    }

    /// Encodes the frame back into its wire layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FRAME_HEADER_SIZE + self.pixels.len());
        out.extend_from_slice(&self.pose.to_header());
        let stride = self.width as usize * self.channels as usize;
        if stride > 0 {
            for row in self.pixels.chunks_exact(stride).rev() {
                out.extend_from_slice(row);
            }
        }
        out
    }

    /// Interprets the pixels of a depth map as little-endian `f32` values.
    ///
    /// Returns `None` unless this is a four-byte-per-pixel depth map.
    pub fn depth_values(&self) -> Option<Vec<f32>> {
        if self.frame_type != FrameType::DepthMap || self.channels != 4 {
            return None;
        }
        Some(
            self.pixels
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        )
    }
}
