//! Host configuration loading from file and environment variables.

use malmo_recording::archive::COMPRESSION_LEVEL_ENV;
use malmo_recording::{compression_level_from_env, FourChannelMode};
use malmo_types::{
    AgentSpec, ClientInfo, MissionRecordSpec, ObservationsPolicy, RewardsPolicy, VideoPolicy,
};
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level host configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostConfig {
    /// Agent-side network settings.
    #[serde(default)]
    pub host: HostSection,

    /// Requested listener ports.
    #[serde(default)]
    pub ports: PortsConfig,

    /// World state accumulation policies.
    #[serde(default)]
    pub policies: PoliciesConfig,

    /// Client discovery timeouts.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Recording settings.
    #[serde(default)]
    pub recording: RecordingConfig,

    /// Async runtime settings.
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Mission run by the binary.
    #[serde(default)]
    pub mission: MissionConfig,

    /// Game clients to offer missions to.
    #[serde(default)]
    pub clients: Vec<ClientInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostSection {
    /// Address game clients use to reach this host.
    #[serde(default = "default_agent_address")]
    pub agent_address: String,

    /// First port tried when a listener is auto-assigned.
    #[serde(default = "default_port_range_start")]
    pub port_range_start: u16,

    /// End (exclusive) of the auto-assign range.
    #[serde(default = "default_port_range_end")]
    pub port_range_end: u16,

    /// Directory holding the `.xsd` files; enables the installation check.
    #[serde(default)]
    pub schema_dir: Option<PathBuf>,
}

/// Listener ports. Zero picks a free port from the configured range.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PortsConfig {
    #[serde(default)]
    pub control: u16,
    #[serde(default)]
    pub video: u16,
    #[serde(default)]
    pub depth: u16,
    #[serde(default)]
    pub luminance: u16,
    #[serde(default)]
    pub colour_map: u16,
    #[serde(default)]
    pub rewards: u16,
    #[serde(default)]
    pub observations: u16,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PoliciesConfig {
    #[serde(default)]
    pub video: VideoPolicy,
    #[serde(default)]
    pub rewards: RewardsPolicy,
    #[serde(default)]
    pub observations: ObservationsPolicy,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,

    /// How long a reserved client holds itself for this mission.
    #[serde(default = "default_reservation_timeout_ms")]
    pub reservation_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordingConfig {
    /// Parent of the per-mission temporary directories.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Video encoder executable. Searched on `PATH` when unset.
    #[serde(default)]
    pub encoder_path: Option<PathBuf>,

    /// Frames buffered per recording pipeline before new ones are dropped.
    #[serde(default = "default_frame_queue_capacity")]
    pub frame_queue_capacity: usize,

    /// Size at which a frame archive bundle is rolled over.
    #[serde(default = "default_archive_max_bytes")]
    pub archive_max_bytes: u64,

    /// Gzip level for frame archive bundles (0-9).
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,

    #[serde(default)]
    pub four_channel_mode: FourChannelMode,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "malmo_host=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MissionConfig {
    /// Mission XML document.
    #[serde(default = "default_document_path")]
    pub document_path: PathBuf,

    #[serde(default)]
    pub experiment_id: String,

    #[serde(default)]
    pub role: usize,

    /// Where the mission record archive is written. Nothing is recorded
    /// unless this is set.
    #[serde(default)]
    pub destination: Option<PathBuf>,

    /// What to record.
    #[serde(default)]
    pub record: MissionRecordSpec,

    /// World state polling interval.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// One entry per agent role.
    #[serde(default = "default_agents")]
    pub agents: Vec<AgentSpec>,
}

impl MissionConfig {
    /// The record specification with `destination` applied.
    pub fn record_spec(&self) -> MissionRecordSpec {
        let mut spec = self.record.clone();
        if self.destination.is_some() {
            spec.destination = self.destination.clone();
        }
        spec
    }
}

fn default_agent_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port_range_start() -> u16 {
    10000
}

fn default_port_range_end() -> u16 {
    11000
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

fn default_reply_timeout_ms() -> u64 {
    5000
}

fn default_reservation_timeout_ms() -> u64 {
    60_000
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_frame_queue_capacity() -> usize {
    300
}

fn default_archive_max_bytes() -> u64 {
    1 << 30
}

fn default_compression_level() -> u32 {
    6
}

fn default_worker_threads() -> usize {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_document_path() -> PathBuf {
    PathBuf::from("mission.xml")
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_agents() -> Vec<AgentSpec> {
    vec![AgentSpec::default()]
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            agent_address: default_agent_address(),
            port_range_start: default_port_range_start(),
            port_range_end: default_port_range_end(),
            schema_dir: None,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            reply_timeout_ms: default_reply_timeout_ms(),
            reservation_timeout_ms: default_reservation_timeout_ms(),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            encoder_path: None,
            frame_queue_capacity: default_frame_queue_capacity(),
            archive_max_bytes: default_archive_max_bytes(),
            compression_level: default_compression_level(),
            four_channel_mode: FourChannelMode::default(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            document_path: default_document_path(),
            experiment_id: String::new(),
            role: 0,
            destination: None,
            record: MissionRecordSpec::default(),
            poll_interval_ms: default_poll_interval_ms(),
            agents: default_agents(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `MALMO_LOG_LEVEL` overrides `logging.level`
/// - `MALMO_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `MALMO_TEMP_PATH` overrides `recording.temp_dir`
/// - `MALMO_XSD_PATH` overrides `host.schema_dir`
/// - `MALMO_BMP_COMPRESSION_LEVEL` overrides `recording.compression_level`
/// - `MALMO_ENCODER_PATH` overrides `recording.encoder_path`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<HostConfig, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                HostConfig::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => HostConfig::default(),
    };

    // Environment variable overrides
    if let Ok(level) = std::env::var("MALMO_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("MALMO_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Ok(temp) = std::env::var("MALMO_TEMP_PATH") {
        if !temp.trim().is_empty() {
            config.recording.temp_dir = PathBuf::from(temp);
        }
    }
    if let Ok(xsd) = std::env::var("MALMO_XSD_PATH") {
        if !xsd.trim().is_empty() {
            config.host.schema_dir = Some(PathBuf::from(xsd));
        }
    }
    if std::env::var_os(COMPRESSION_LEVEL_ENV).is_some() {
        config.recording.compression_level =
            compression_level_from_env(config.recording.compression_level);
    }
    if let Ok(encoder) = std::env::var("MALMO_ENCODER_PATH") {
        if !encoder.trim().is_empty() {
            config.recording.encoder_path = Some(PathBuf::from(encoder));
        }
    }

    Ok(config)
}
