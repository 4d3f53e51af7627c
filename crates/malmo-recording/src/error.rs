use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordingError {
    /// No encoder executable could be located.
    #[error("video encoder not found: {0}")]
    EncoderNotFound(String),

    /// The encoder process could not be started.
    #[error("failed to spawn encoder: {0}")]
    Spawn(String),

    /// The encoder was killed by a signal or otherwise did not exit normally.
    #[error("encoder exited abnormally: {0}")]
    EncoderExitedAbnormally(String),

    /// The frame has a channel count no sink can write.
    #[error("unsupported number of channels: {0}")]
    UnsupportedChannels(u8),

    #[error("recording i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame was pushed after the pipeline was closed.
    #[error("pipeline is closed: {0}")]
    PipelineClosed(String),

    /// The writer thread panicked.
    #[error("writer thread panicked: {0}")]
    WriterPanicked(String),
}
