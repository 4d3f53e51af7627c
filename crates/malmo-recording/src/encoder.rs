//! Recording through an external video encoder process.

use crate::error::RecordingError;
use crate::frame_info::{frame_name, FrameInfoWriter};
use crate::image::{encode_ppm, to_rgb, FourChannelMode};
use crate::pipeline::FrameSink;
use malmo_types::TimestampedVideoFrame;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

/// Executables tried, in order, when no encoder is configured.
const ENCODER_CANDIDATES: [&str; 2] = ["ffmpeg", "avconv"];

/// Locates the encoder: `configured` when given, otherwise the first of
/// `ffmpeg` or `avconv` found on `PATH`.
pub fn find_encoder(configured: Option<&Path>) -> Result<PathBuf, RecordingError> {
    if let Some(path) = configured {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(RecordingError::EncoderNotFound(path.display().to_string()));
    }

    let search_path = std::env::var_os("PATH").unwrap_or_default();
    for candidate in ENCODER_CANDIDATES {
        for dir in std::env::split_paths(&search_path) {
            let path = dir.join(candidate);
            if path.is_file() {
                return Ok(path);
            }
        }
    }
    Err(RecordingError::EncoderNotFound(ENCODER_CANDIDATES.join(" or ")))
}

/// Encoder invocation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSettings {
    pub encoder: PathBuf,
    pub fps: u32,
    pub bit_rate: u64,
    pub four_channel_mode: FourChannelMode,
}

impl EncoderSettings {
    fn arguments(&self, output: &Path) -> Vec<String> {
        vec![
            "-y".into(),
            "-f".into(),
            "image2pipe".into(),
            "-framerate".into(),
            self.fps.to_string(),
            "-vcodec".into(),
            "ppm".into(),
            "-i".into(),
            "-".into(),
            "-vcodec".into(),
            "libx264".into(),
            "-b:v".into(),
            self.bit_rate.to_string(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            output.display().to_string(),
        ]
    }
}

/// Pipes frames as PPM images into the encoder's standard input.
pub struct EncoderPipeSink {
    output: PathBuf,
    width: u16,
    height: u16,
    four_channel_mode: FourChannelMode,
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    frame_info: FrameInfoWriter,
    frames_written: u64,
}

impl EncoderPipeSink {
    /// Starts the encoder writing to `output`. Encoder output goes to
    /// `<output>.log`; the frame index goes to `frame_info_path`.
    pub fn open(
        settings: &EncoderSettings,
        output: impl AsRef<Path>,
        frame_info_path: impl AsRef<Path>,
        width: u16,
        height: u16,
    ) -> Result<Self, RecordingError> {
        let output = output.as_ref().to_path_buf();
        let log_path = PathBuf::from(format!("{}.log", output.display()));
        let log = File::create(&log_path)?;
        let log_err = log.try_clone()?;

        let mut child = Command::new(&settings.encoder)
            .args(settings.arguments(&output))
            .stdin(Stdio::piped())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .map_err(|e| {
                RecordingError::Spawn(format!("{}: {}", settings.encoder.display(), e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RecordingError::Spawn("encoder stdin unavailable".to_string()))?;

        tracing::info!(
            encoder = %settings.encoder.display(),
            output = %output.display(),
            fps = settings.fps,
            bit_rate = settings.bit_rate,
            "started video encoder"
        );

        Ok(Self {
            output,
            width,
            height,
            four_channel_mode: settings.four_channel_mode,
            child,
            stdin: Some(BufWriter::new(stdin)),
            frame_info: FrameInfoWriter::create_with_dimensions(frame_info_path, width, height)?,
            frames_written: 0,
        })
    }

    pub fn output(&self) -> &Path {
        &self.output
    }
}

impl FrameSink for EncoderPipeSink {
    fn write_frame(&mut self, frame: &TimestampedVideoFrame) -> Result<(), RecordingError> {
        let rgb = to_rgb(frame, self.four_channel_mode)?;
        let image = encode_ppm(frame.width, frame.height, &rgb);
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| RecordingError::PipelineClosed(self.output.display().to_string()))?;
        stdin.write_all(&image)?;
        self.frame_info
            .record(&frame_name(self.frames_written), frame)?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), RecordingError> {
        // the encoder is always reaped before the index error is reported
        let index = self.frame_info.finish();
        if let Some(mut stdin) = self.stdin.take() {
            // a broken pipe here means the encoder already exited; wait() reports why
            if let Err(e) = stdin.flush() {
                tracing::debug!(error = %e, "failed to flush encoder input");
            }
        }

        let status = self.child.wait()?;
        match status.code() {
            Some(0) => {}
            Some(code) => {
                tracing::warn!(
                    output = %self.output.display(),
                    code,
                    "encoder exited with non-zero status"
                );
            }
            None => {
                return Err(RecordingError::EncoderExitedAbnormally(status.to_string()));
            }
        }
        index?;

        tracing::info!(
            output = %self.output.display(),
            frames = self.frames_written,
            width = self.width,
            height = self.height,
            "video encoding finished"
        );
        Ok(())
    }
}
