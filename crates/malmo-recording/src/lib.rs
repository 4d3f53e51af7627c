//! Mission recording for the Malmo agent host.
//!
//! Video frames are recorded off the network threads: each recorded frame
//! channel gets a [`FramePipeline`], a bounded queue drained by one dedicated
//! writer thread into a [`FrameSink`]. Two sinks exist:
//!
//! - [`EncoderPipeSink`] pipes PPM images into an external `ffmpeg`/`avconv`
//!   process.
//! - [`ArchiveSink`] stores each frame as an image or numeric array inside
//!   rolling `tar.gz` bundles.
//!
//! String channels and the commands log are persisted through [`RecordFile`].
//! A [`MissionRecord`] owns the temporary artifact directory of one mission
//! and packs it into the destination archive when the mission closes.
//!
//! Pipelines must be closed in reverse order of creation; [`PipelineStack`]
//! enforces that.

pub mod archive;
pub mod encoder;
pub mod error;
pub mod frame_info;
pub mod image;
pub mod mission_record;
pub mod pipeline;
pub mod record_file;

pub use archive::{compression_level_from_env, ArchiveSettings, ArchiveSink};
pub use encoder::{find_encoder, EncoderPipeSink, EncoderSettings};
pub use error::RecordingError;
pub use image::FourChannelMode;
pub use mission_record::{temp_root_from_env, MissionRecord};
pub use pipeline::{
    FramePipeline, FrameSink, PipelineOptions, PipelineStack, PipelineStats, PushOutcome,
};
pub use record_file::RecordFile;
