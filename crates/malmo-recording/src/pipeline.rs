//! Bounded frame queue drained by a dedicated writer thread.

use crate::error::RecordingError;
use chrono::{DateTime, Utc};
use malmo_types::TimestampedVideoFrame;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

/// Destination of recorded frames. All methods run on the writer thread.
pub trait FrameSink: Send + 'static {
    /// Called once on the writer thread before the first frame.
    fn begin(&mut self) -> Result<(), RecordingError> {
        Ok(())
    }

    fn write_frame(&mut self, frame: &TimestampedVideoFrame) -> Result<(), RecordingError>;

    /// Called once after the queue has been drained on close.
    fn finish(&mut self) -> Result<(), RecordingError>;
}

/// Queue settings for one pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub capacity: usize,
    /// Frames closer together than this are skipped at push time.
    pub min_interval: Option<Duration>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            capacity: 300,
            min_interval: None,
        }
    }
}

impl PipelineOptions {
    /// Throttles to at most `fps` frames per second.
    pub fn throttled(mut self, fps: u32) -> Self {
        if fps > 0 {
            self.min_interval = Some(Duration::from_secs_f64(1.0 / f64::from(fps)));
        }
        self
    }
}

/// What happened to a pushed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Arrived sooner than the frame-rate limit allows.
    Throttled,
    /// The queue was full.
    Dropped,
}

/// Counters reported when a pipeline closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub received: u64,
    pub queued: u64,
    pub dropped: u64,
    pub written: u64,
}

#[derive(Default)]
struct QueueState {
    frames: VecDeque<TimestampedVideoFrame>,
    closing: bool,
    last_accepted: Option<DateTime<Utc>>,
    stats: PipelineStats,
}

struct Shared {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A recording pipeline for one frame channel.
pub struct FramePipeline {
    name: String,
    options: PipelineOptions,
    shared: Arc<Shared>,
    writer: Mutex<Option<JoinHandle<Result<(), RecordingError>>>>,
}

impl FramePipeline {
    /// Spawns the writer thread for `sink`.
    pub fn start(
        name: impl Into<String>,
        sink: impl FrameSink,
        options: PipelineOptions,
    ) -> Result<Self, RecordingError> {
        let name = name.into();
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            ready: Condvar::new(),
        });

        let thread_shared = Arc::clone(&shared);
        let thread_name = name.clone();
        let writer = std::thread::Builder::new()
            .name(format!("frame-writer-{name}"))
            .spawn(move || run_writer(&thread_name, sink, &thread_shared))?;

        tracing::debug!(pipeline = %name, capacity = options.capacity, "frame pipeline started");
        Ok(Self {
            name,
            options,
            shared,
            writer: Mutex::new(Some(writer)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queues a frame without blocking.
    pub fn push(&self, frame: TimestampedVideoFrame) -> Result<PushOutcome, RecordingError> {
        let mut state = self.shared.lock();
        if state.closing {
            return Err(RecordingError::PipelineClosed(self.name.clone()));
        }
        state.stats.received += 1;

        if let (Some(min), Some(last)) = (self.options.min_interval, state.last_accepted) {
            let elapsed = (frame.timestamp - last).to_std().unwrap_or_default();
            if elapsed < min {
                return Ok(PushOutcome::Throttled);
            }
        }

        if state.frames.len() >= self.options.capacity {
            state.stats.dropped += 1;
            let dropped = state.stats.dropped;
            drop(state);
            tracing::warn!(pipeline = %self.name, dropped, "frame queue full, dropping frame");
            return Ok(PushOutcome::Dropped);
        }

        state.last_accepted = Some(frame.timestamp);
        state.frames.push_back(frame);
        state.stats.queued += 1;
        drop(state);
        self.shared.ready.notify_one();
        Ok(PushOutcome::Queued)
    }

    pub fn stats(&self) -> PipelineStats {
        self.shared.lock().stats
    }

    /// Drains the queue, finishes the sink and joins the writer thread.
    /// Blocks; call from a blocking context. Closing again returns the
    /// final counters.
    pub fn close(&self) -> Result<PipelineStats, RecordingError> {
        {
            let mut state = self.shared.lock();
            state.closing = true;
        }
        self.shared.ready.notify_all();

        let handle = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            match handle.join() {
                Ok(result) => result?,
                Err(_) => return Err(RecordingError::WriterPanicked(self.name.clone())),
            }
            let stats = self.stats();
            tracing::info!(
                pipeline = %self.name,
                written = stats.written,
                dropped = stats.dropped,
                "frame pipeline closed"
            );
        }
        Ok(self.stats())
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        let open = self
            .writer
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false);
        if open {
            if let Err(e) = self.close() {
                tracing::error!(pipeline = %self.name, error = %e, "frame pipeline failed on drop");
            }
        }
    }
}

impl std::fmt::Debug for FramePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePipeline")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish()
    }
}

fn run_writer(name: &str, mut sink: impl FrameSink, shared: &Shared) -> Result<(), RecordingError> {
    let mut failure = sink.begin().err();

    loop {
        let batch = {
            let mut state = shared.lock();
            while state.frames.is_empty() && !state.closing {
                state = shared
                    .ready
                    .wait(state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
            if state.frames.is_empty() {
                break;
            }
            std::mem::take(&mut state.frames)
        };

        for frame in batch {
            if failure.is_some() {
                continue;
            }
            match sink.write_frame(&frame) {
                Ok(()) => shared.lock().stats.written += 1,
                Err(e) => {
                    tracing::error!(pipeline = %name, error = %e, "failed to write frame");
                    failure = Some(e);
                }
            }
        }
    }

    let finished = sink.finish();
    match failure {
        Some(e) => Err(e),
        None => finished,
    }
}

/// Open pipelines in creation order. Teardown closes them newest first.
#[derive(Debug, Default)]
pub struct PipelineStack {
    pipelines: Vec<Arc<FramePipeline>>,
}

impl PipelineStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pipeline: Arc<FramePipeline>) {
        self.pipelines.push(pipeline);
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Pops and closes every pipeline, last created first. Returns each
    /// pipeline's name with its outcome, in closing order.
    pub fn close_all(&mut self) -> Vec<(String, Result<PipelineStats, RecordingError>)> {
        let mut results = Vec::with_capacity(self.pipelines.len());
        while let Some(pipeline) = self.pipelines.pop() {
            let result = pipeline.close();
            if let Err(e) = &result {
                tracing::error!(pipeline = %pipeline.name(), error = %e, "recording failed");
            }
            results.push((pipeline.name().to_string(), result));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use malmo_types::{FrameType, Pose};
    use std::sync::mpsc;

    fn frame_at(timestamp: DateTime<Utc>) -> TimestampedVideoFrame {
        TimestampedVideoFrame {
            timestamp,
            width: 1,
            height: 1,
            channels: 1,
            frame_type: FrameType::Luminance,
            pose: Pose::default(),
            pixels: vec![0],
        }
    }

    struct CountingSink {
        written: Arc<Mutex<Vec<DateTime<Utc>>>>,
    }

    impl FrameSink for CountingSink {
        fn write_frame(&mut self, frame: &TimestampedVideoFrame) -> Result<(), RecordingError> {
            self.written.lock().unwrap().push(frame.timestamp);
            Ok(())
        }

        fn finish(&mut self) -> Result<(), RecordingError> {
            Ok(())
        }
    }

    #[test]
    fn throttle_skips_frames_inside_interval() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let pipeline = FramePipeline::start(
            "throttled",
            CountingSink {
                written: written.clone(),
            },
            PipelineOptions::default().throttled(10),
        )
        .unwrap();

        let t0 = Utc::now();
        assert_eq!(pipeline.push(frame_at(t0)).unwrap(), PushOutcome::Queued);
        assert_eq!(
            pipeline
                .push(frame_at(t0 + ChronoDuration::milliseconds(50)))
                .unwrap(),
            PushOutcome::Throttled
        );
        assert_eq!(
            pipeline
                .push(frame_at(t0 + ChronoDuration::milliseconds(120)))
                .unwrap(),
            PushOutcome::Queued
        );

        let stats = pipeline.close().unwrap();
        assert_eq!(stats.written, 2);
        assert_eq!(stats.received, 3);
        assert_eq!(written.lock().unwrap().len(), 2);
    }

    #[test]
    fn push_after_close_fails() {
        let pipeline = FramePipeline::start(
            "closed",
            CountingSink {
                written: Arc::new(Mutex::new(Vec::new())),
            },
            PipelineOptions::default(),
        )
        .unwrap();
        pipeline.close().unwrap();
        assert!(matches!(
            pipeline.push(frame_at(Utc::now())),
            Err(RecordingError::PipelineClosed(_))
        ));
        // closing twice is harmless
        assert!(pipeline.close().is_ok());
    }

    struct FailingSink;

    impl FrameSink for FailingSink {
        fn write_frame(&mut self, _frame: &TimestampedVideoFrame) -> Result<(), RecordingError> {
            Err(RecordingError::UnsupportedChannels(7))
        }

        fn finish(&mut self) -> Result<(), RecordingError> {
            Ok(())
        }
    }

    #[test]
    fn write_failure_is_reported_on_close() {
        let pipeline =
            FramePipeline::start("failing", FailingSink, PipelineOptions::default()).unwrap();
        pipeline.push(frame_at(Utc::now())).unwrap();
        assert!(matches!(
            pipeline.close(),
            Err(RecordingError::UnsupportedChannels(7))
        ));
    }

    struct NamedSink {
        name: &'static str,
        finished: mpsc::Sender<&'static str>,
    }

    impl FrameSink for NamedSink {
        fn write_frame(&mut self, _frame: &TimestampedVideoFrame) -> Result<(), RecordingError> {
            Ok(())
        }

        fn finish(&mut self) -> Result<(), RecordingError> {
            let _ = self.finished.send(self.name);
            Ok(())
        }
    }

    #[test]
    fn stack_closes_newest_first() {
        let (tx, rx) = mpsc::channel();
        let mut stack = PipelineStack::new();
        for name in ["video", "depth", "luminance"] {
            let sink = NamedSink {
                name,
                finished: tx.clone(),
            };
            stack.push(Arc::new(
                FramePipeline::start(name, sink, PipelineOptions::default()).unwrap(),
            ));
        }

        let results = stack.close_all();
        let closed: Vec<&str> = results.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(closed, vec!["luminance", "depth", "video"]);
        let finished: Vec<&str> = rx.try_iter().collect();
        assert_eq!(finished, vec!["luminance", "depth", "video"]);
        assert!(stack.is_empty());
    }
}
