//! Pixel conversions and the small image formats the sinks write.

use crate::error::RecordingError;
use malmo_types::{FrameType, TimestampedVideoFrame};
use serde::{Deserialize, Serialize};

/// How four-channel colour frames are reduced to RGB for encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FourChannelMode {
    /// Keep the RGB planes and drop the depth plane.
    #[default]
    DiscardDepth,
    /// Keep only the depth plane, rendered as grey.
    DepthOnly,
}

/// Converts a frame to packed RGB suitable for a `P6` image.
pub fn to_rgb(frame: &TimestampedVideoFrame, mode: FourChannelMode) -> Result<Vec<u8>, RecordingError> {
    match (frame.frame_type, frame.channels) {
        (FrameType::DepthMap, 4) => Ok(depth_to_rgb(frame)),
        (_, 1) => Ok(frame.pixels.iter().flat_map(|&g| [g, g, g]).collect()),
        (_, 3) => Ok(frame.pixels.clone()),
        (_, 4) => Ok(match mode {
            FourChannelMode::DiscardDepth => frame
                .pixels
                .chunks_exact(4)
                .flat_map(|p| [p[0], p[1], p[2]])
                .collect(),
            FourChannelMode::DepthOnly => frame
                .pixels
                .chunks_exact(4)
                .flat_map(|p| [p[3], p[3], p[3]])
                .collect(),
        }),
        (_, n) => Err(RecordingError::UnsupportedChannels(n)),
    }
}

/// Maps each depth value onto an HSV cone: hue cycles every 6 blocks and
/// brightness fades out towards 200 blocks.
fn depth_to_rgb(frame: &TimestampedVideoFrame) -> Vec<u8> {
    let depths = frame.depth_values().unwrap_or_default();
    let mut out = Vec::with_capacity(depths.len() * 3);
    for f in depths {
        out.extend_from_slice(&hsv_cone(f));
    }
    out
}

fn hsv_cone(depth: f32) -> [u8; 3] {
    let mut h = (60.0 * depth).rem_euclid(360.0);
    let v = (1.0 - depth / 200.0).clamp(0.0, 1.0) * 255.0;
    h /= 60.0;
    let fract = h - h.floor();
    // s = 1, so p is always zero
    let p = 0.0f32;
    let q = v * (1.0 - fract);
    let t = v * fract;

    let (r, g, b) = match h as u32 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        5 => (v, p, q),
        _ => (0.0, 0.0, 0.0),
    };
    [r as u8, g as u8, b as u8]
}

/// `P6` header plus RGB data.
pub fn encode_ppm(width: u16, height: u16, rgb: &[u8]) -> Vec<u8> {
    let mut out = format!("P6\n{width} {height}\n255\n").into_bytes();
    out.extend_from_slice(rgb);
    out
}

/// `P5` header plus grey data.
pub fn encode_pgm(width: u16, height: u16, grey: &[u8]) -> Vec<u8> {
    let mut out = format!("P5\n{width} {height}\n255\n").into_bytes();
    out.extend_from_slice(grey);
    out
}

/// The fourth plane of an RGBD frame.
pub fn depth_plane(frame: &TimestampedVideoFrame) -> Vec<u8> {
    frame.pixels.chunks_exact(4).map(|p| p[3]).collect()
}

/// Encodes a frame as a version 1.0 `.npy` array: `float32 (h, w)` for depth
/// maps, `uint8 (h, w, c)` otherwise.
pub fn encode_npy(frame: &TimestampedVideoFrame) -> Vec<u8> {
    let (descr, shape, data) = match frame.depth_values() {
        Some(depths) => (
            "<f4",
            format!("({}, {})", frame.height, frame.width),
            depths.iter().flat_map(|d| d.to_le_bytes()).collect::<Vec<u8>>(),
        ),
        None => (
            "|u1",
            format!("({}, {}, {})", frame.height, frame.width, frame.channels),
            frame.pixels.clone(),
        ),
    };

    let mut header = format!("{{'descr': '{descr}', 'fortran_order': False, 'shape': {shape}, }}");
    // magic (6) + version (2) + length (2) + header + '\n' must be a multiple of 64
    let unpadded = 10 + header.len() + 1;
    header.push_str(&" ".repeat((64 - unpadded % 64) % 64));
    header.push('\n');

    let mut out = Vec::with_capacity(10 + header.len() + data.len());
    out.extend_from_slice(b"\x93NUMPY\x01\x00");
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(&data);
    out
}
