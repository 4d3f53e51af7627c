//! The artifact directory of one recorded mission.

use crate::error::RecordingError;
use flate2::write::GzEncoder;
use flate2::Compression;
use malmo_types::{FrameType, MissionRecordSpec};
use std::fs::File;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Environment variable naming the root for temporary record directories.
pub const TEMP_PATH_ENV: &str = "MALMO_TEMP_PATH";

/// `MALMO_TEMP_PATH` if set, else the current directory.
pub fn temp_root_from_env() -> PathBuf {
    std::env::var_os(TEMP_PATH_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Collects the files of one mission under
/// `<temp-root>/mission_records/<uuid>` and packs them into the destination
/// archive on close.
///
/// Without a destination nothing is created and every path accessor returns
/// `None`.
#[derive(Debug)]
pub struct MissionRecord {
    spec: MissionRecordSpec,
    id: Uuid,
    temp_dir: Option<PathBuf>,
    closed: bool,
}

impl MissionRecord {
    pub fn create(spec: MissionRecordSpec, temp_root: impl AsRef<Path>) -> Result<Self, RecordingError> {
        let id = Uuid::new_v4();
        let temp_dir = match &spec.destination {
            Some(_) => {
                let dir = temp_root
                    .as_ref()
                    .join("mission_records")
                    .join(id.to_string());
                std::fs::create_dir_all(&dir)?;
                tracing::debug!(dir = %dir.display(), "created mission record directory");
                Some(dir)
            }
            None => None,
        };
        Ok(Self {
            spec,
            id,
            temp_dir,
            closed: false,
        })
    }

    pub fn spec(&self) -> &MissionRecordSpec {
        &self.spec
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_recording(&self) -> bool {
        self.temp_dir.is_some()
    }

    pub fn temporary_directory(&self) -> Option<&Path> {
        self.temp_dir.as_deref()
    }

    pub fn destination(&self) -> Option<&Path> {
        self.spec.destination.as_deref()
    }

    fn artifact(&self, name: &str, enabled: bool) -> Option<PathBuf> {
        match &self.temp_dir {
            Some(dir) if enabled => Some(dir.join(name)),
            _ => None,
        }
    }

    pub fn commands_path(&self) -> Option<PathBuf> {
        self.artifact("commands.txt", self.spec.record_commands)
    }

    pub fn rewards_path(&self) -> Option<PathBuf> {
        self.artifact("rewards.txt", self.spec.record_rewards)
    }

    pub fn observations_path(&self) -> Option<PathBuf> {
        self.artifact("observations.txt", self.spec.record_observations)
    }

    pub fn mission_init_path(&self) -> Option<PathBuf> {
        self.artifact("missionInit.xml", true)
    }

    pub fn mission_ended_path(&self) -> Option<PathBuf> {
        self.artifact("missionEnded.xml", true)
    }

    /// Encoder output file for a frame channel.
    pub fn video_path(&self, frame_type: FrameType) -> Option<PathBuf> {
        let name = match frame_type {
            FrameType::Video => "video.mp4",
            FrameType::DepthMap => "depth_video.mp4",
            FrameType::Luminance => "luminance_video.mp4",
            FrameType::ColourMap => "colourmap_video.mp4",
        };
        self.artifact(name, self.spec.frames.contains_key(&frame_type))
    }

    /// Frame index written alongside encoder output.
    pub fn frame_info_path(&self, frame_type: FrameType) -> Option<PathBuf> {
        let name = match frame_type {
            FrameType::Video => "frame_info.txt",
            FrameType::DepthMap => "depth_frame_info.txt",
            FrameType::Luminance => "luminance_frame_info.txt",
            FrameType::ColourMap => "colour_map_info.txt",
        };
        self.artifact(name, self.spec.frames.contains_key(&frame_type))
    }

    /// Directory receiving archive bundles for a frame channel.
    pub fn frames_directory(&self, frame_type: FrameType) -> Option<PathBuf> {
        let name = match frame_type {
            FrameType::Video => "video_frames",
            FrameType::DepthMap => "depth_frames",
            FrameType::Luminance => "luminance_frames",
            FrameType::ColourMap => "colour_map_frames",
        };
        self.artifact(name, self.spec.frames.contains_key(&frame_type))
    }

    pub fn write_mission_init(&self, xml: &str) -> Result<(), RecordingError> {
        if let Some(path) = self.mission_init_path() {
            std::fs::write(path, xml)?;
        }
        Ok(())
    }

    pub fn write_mission_ended(&self, xml: &str) -> Result<(), RecordingError> {
        if let Some(path) = self.mission_ended_path() {
            std::fs::write(path, xml)?;
        }
        Ok(())
    }

    /// Packs the directory into the destination as `tar.gz`, every entry
    /// under a `<uuid>/` prefix, then removes the directory. Returns the
    /// archive path. Closing again does nothing.
    pub fn close(&mut self) -> Result<Option<PathBuf>, RecordingError> {
        if self.closed {
            return Ok(None);
        }
        self.closed = true;

        let (Some(dir), Some(destination)) = (self.temp_dir.as_ref(), self.spec.destination.as_ref())
        else {
            return Ok(None);
        };

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(destination)?;
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        builder.append_dir_all(self.id.to_string(), dir)?;
        builder.into_inner()?.finish()?;

        std::fs::remove_dir_all(dir)?;
        tracing::info!(destination = %destination.display(), "mission record written");
        Ok(Some(destination.clone()))
    }
}

impl Drop for MissionRecord {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(error = %e, "failed to finalise mission record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;

    #[test]
    fn no_destination_creates_nothing() {
        let root = tempfile::tempdir().unwrap();
        let mut record = MissionRecord::create(MissionRecordSpec::new(), root.path()).unwrap();
        assert!(!record.is_recording());
        assert!(record.rewards_path().is_none());
        assert!(!root.path().join("mission_records").exists());
        assert_eq!(record.close().unwrap(), None);
    }

    #[test]
    fn close_packs_under_uuid_prefix_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let destination = root.path().join("out").join("record.tgz");
        let spec = MissionRecordSpec::with_destination(&destination).record_rewards();
        let mut record = MissionRecord::create(spec, root.path()).unwrap();

        let dir = record.temporary_directory().unwrap().to_path_buf();
        assert!(dir.starts_with(root.path().join("mission_records")));
        std::fs::write(record.rewards_path().unwrap(), "20240101T000000.000000 0:1\n").unwrap();
        record.write_mission_init("<MissionInit/>").unwrap();
        assert!(record.commands_path().is_none());

        assert_eq!(record.close().unwrap(), Some(destination.clone()));
        assert!(!dir.exists());
        assert_eq!(record.close().unwrap(), None);

        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&destination).unwrap()));
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().display().to_string())
            .collect();
        let prefix = record.id().to_string();
        assert!(names.contains(&format!("{prefix}/rewards.txt")));
        assert!(names.contains(&format!("{prefix}/missionInit.xml")));
    }
}
