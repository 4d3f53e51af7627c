//! Recording individual frames into rolling `tar.gz` bundles.

use crate::error::RecordingError;
use crate::frame_info::{frame_name, FrameInfoWriter};
use crate::image::{depth_plane, encode_npy, encode_pgm, encode_ppm, to_rgb, FourChannelMode};
use crate::pipeline::FrameSink;
use flate2::write::GzEncoder;
use flate2::Compression;
use malmo_types::{FrameType, TimestampedVideoFrame};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Environment variable overriding the gzip level of frame bundles.
pub const COMPRESSION_LEVEL_ENV: &str = "MALMO_BMP_COMPRESSION_LEVEL";

/// Reads [`COMPRESSION_LEVEL_ENV`], clamped to 0..=9, or returns `default`.
pub fn compression_level_from_env(default: u32) -> u32 {
    std::env::var(COMPRESSION_LEVEL_ENV)
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .map(|level| level.clamp(0, 9) as u32)
        .unwrap_or(default)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSettings {
    pub numeric_arrays: bool,
    /// Uncompressed bytes per bundle before rolling over.
    pub max_bundle_bytes: u64,
    pub compression_level: u32,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            numeric_arrays: false,
            max_bundle_bytes: 1 << 30,
            compression_level: 6,
        }
    }
}

struct Bundle {
    path: PathBuf,
    builder: tar::Builder<GzEncoder<File>>,
    bytes: u64,
}

impl Bundle {
    fn finish(self) -> Result<PathBuf, RecordingError> {
        let encoder = self.builder.into_inner()?;
        encoder.finish()?;
        Ok(self.path)
    }
}

/// Writes each frame as one or two archive entries plus a `frame_info.txt`
/// index line.
pub struct ArchiveSink {
    directory: PathBuf,
    settings: ArchiveSettings,
    bundle: Option<Bundle>,
    bundles: Vec<PathBuf>,
    frame_info: FrameInfoWriter,
    frame_count: u64,
}

impl ArchiveSink {
    /// Creates `directory` if needed and the frame index inside it.
    pub fn open(directory: impl AsRef<Path>, settings: ArchiveSettings) -> Result<Self, RecordingError> {
        let directory = directory.as_ref().to_path_buf();
        std::fs::create_dir_all(&directory)?;
        let frame_info = FrameInfoWriter::create(directory.join("frame_info.txt"))?;
        Ok(Self {
            directory,
            settings,
            bundle: None,
            bundles: Vec::new(),
            frame_info,
            frame_count: 0,
        })
    }

    /// Bundles finished so far.
    pub fn bundles(&self) -> &[PathBuf] {
        &self.bundles
    }

    fn entries(&self, frame: &TimestampedVideoFrame) -> Result<Vec<(String, Vec<u8>)>, RecordingError> {
        let name = frame_name(self.frame_count);
        if self.settings.numeric_arrays {
            return Ok(vec![(format!("{name}.npy"), encode_npy(frame))]);
        }

        match (frame.frame_type, frame.channels) {
            (_, 1) => Ok(vec![(
                format!("{name}.pgm"),
                encode_pgm(frame.width, frame.height, &frame.pixels),
            )]),
            (_, 3) => Ok(vec![(
                format!("{name}.ppm"),
                encode_ppm(frame.width, frame.height, &frame.pixels),
            )]),
            (FrameType::DepthMap, 4) => {
                let rgb = to_rgb(frame, FourChannelMode::DiscardDepth)?;
                Ok(vec![(
                    format!("{name}.ppm"),
                    encode_ppm(frame.width, frame.height, &rgb),
                )])
            }
            (_, 4) => {
                let rgb = to_rgb(frame, FourChannelMode::DiscardDepth)?;
                Ok(vec![
                    (
                        format!("{name}.ppm"),
                        encode_ppm(frame.width, frame.height, &rgb),
                    ),
                    (
                        format!("{name}_depth.pgm"),
                        encode_pgm(frame.width, frame.height, &depth_plane(frame)),
                    ),
                ])
            }
            (_, n) => Err(RecordingError::UnsupportedChannels(n)),
        }
    }

    fn roll_over(&mut self) -> Result<(), RecordingError> {
        if let Some(bundle) = self.bundle.take() {
            self.bundles.push(bundle.finish()?);
        }
        let path = self
            .directory
            .join(format!("bmps_{:06}.tar.gz", self.frame_count));
        let file = File::create(&path)?;
        let encoder = GzEncoder::new(file, Compression::new(self.settings.compression_level));
        tracing::debug!(bundle = %path.display(), "created frame bundle");
        self.bundle = Some(Bundle {
            path,
            builder: tar::Builder::new(encoder),
            bytes: 0,
        });
        Ok(())
    }
}

impl FrameSink for ArchiveSink {
    fn write_frame(&mut self, frame: &TimestampedVideoFrame) -> Result<(), RecordingError> {
        let entries = self.entries(frame)?;
        let size: u64 = entries.iter().map(|(_, data)| data.len() as u64).sum();

        let needs_new_bundle = match &self.bundle {
            None => true,
            Some(bundle) => bundle.bytes + size > self.settings.max_bundle_bytes,
        };
        if needs_new_bundle {
            self.roll_over()?;
        }

        let name = frame_name(self.frame_count);
        let Some(bundle) = self.bundle.as_mut() else {
            return Err(RecordingError::PipelineClosed(self.directory.display().to_string()));
        };
        for (entry_name, data) in &entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(frame.timestamp.timestamp().max(0) as u64);
            header.set_cksum();
            bundle
                .builder
                .append_data(&mut header, entry_name, data.as_slice())?;
        }
        bundle.bytes += size;

        self.frame_info.record(&name, frame)?;
        self.frame_count += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), RecordingError> {
        if let Some(bundle) = self.bundle.take() {
            self.bundles.push(bundle.finish()?);
        }
        self.frame_info.finish()?;
        tracing::info!(
            directory = %self.directory.display(),
            frames = self.frame_count,
            bundles = self.bundles.len(),
            "frame archive finished"
        );
        Ok(())
    }
}
