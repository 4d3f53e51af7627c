//! Per-frame index files written next to recordings.

use crate::error::RecordingError;
use malmo_types::{iso_timestamp, TimestampedVideoFrame};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes one line per frame: `<iso> <name> xyzyp: x y z yaw pitch`,
/// optionally preceded by `width=` and `height=` lines.
#[derive(Debug)]
pub struct FrameInfoWriter {
    out: BufWriter<File>,
}

impl FrameInfoWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, RecordingError> {
        Ok(Self {
            out: BufWriter::new(File::create(path)?),
        })
    }

    /// Like [`FrameInfoWriter::create`], starting with the frame dimensions.
    pub fn create_with_dimensions(
        path: impl AsRef<Path>,
        width: u16,
        height: u16,
    ) -> Result<Self, RecordingError> {
        let mut writer = Self::create(path)?;
        writeln!(writer.out, "width={width}")?;
        writeln!(writer.out, "height={height}")?;
        Ok(writer)
    }

    pub fn record(&mut self, name: &str, frame: &TimestampedVideoFrame) -> Result<(), RecordingError> {
        let pose = &frame.pose;
        writeln!(
            self.out,
            "{} {} xyzyp: {} {} {} {} {}",
            iso_timestamp(&frame.timestamp),
            name,
            pose.x,
            pose.y,
            pose.z,
            pose.yaw,
            pose.pitch
        )?;
        Ok(())
    }

    pub fn finish(&mut self) -> Result<(), RecordingError> {
        self.out.flush()?;
        Ok(())
    }
}

/// `frame_000042`
pub fn frame_name(index: u64) -> String {
    format!("frame_{index:06}")
}
