//! Append-mode timestamped line files.

use crate::error::RecordingError;
use chrono::{DateTime, Utc};
use malmo_types::{iso_timestamp, TimestampedString};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A text file receiving `<iso-timestamp> <text>` lines.
///
/// Shared between the channel that produces lines and the orchestrator,
/// so writes go through an internal lock.
#[derive(Debug)]
pub struct RecordFile {
    path: PathBuf,
    file: Mutex<File>,
}

impl RecordFile {
    /// Opens `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RecordingError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &TimestampedString) -> Result<(), RecordingError> {
        self.append_line(&record.timestamp, &record.text)
    }

    pub fn append_line(&self, timestamp: &DateTime<Utc>, text: &str) -> Result<(), RecordingError> {
        let line = format!("{} {}\n", iso_timestamp(timestamp), text.trim_end_matches('\n'));
        let mut file = self
            .file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}
