//! The agent host: starts missions on game clients and gathers what they send.

use crate::config::{HostConfig, PoliciesConfig, PortsConfig, RecordingConfig};
use crate::discovery::Discovery;
use crate::error::MissionError;
use crate::installation::check_installation_once;
use crate::mission_ended::MissionEnded;
use crate::mission_init::MissionInit;
use crate::state::{transition, MissionEvent, MissionPhase};
use crate::xml::{parse_document, Element};
use chrono::Utc;
use malmo_channels::{
    ChannelEvent, EventReceiver, EventSender, StringChannel, StringServer, VideoServer,
    WorldStateStore,
};
use malmo_recording::{
    find_encoder, ArchiveSettings, ArchiveSink, EncoderPipeSink, EncoderSettings, FramePipeline,
    MissionRecord, PipelineOptions, PipelineStack, RecordFile,
};
use malmo_tcp::{ClientTimeouts, CommandConnection, ServerOptions};
use malmo_types::{
    AgentSpec, ClientInfo, ClientPool, FrameRecordingSpec, FrameType, Mission, MissionRecordSpec,
    ObservationsPolicy, RewardsPolicy, TimestampedString, VideoPolicy, WorldState,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

/// Everything an [`AgentHost`] needs besides the mission itself.
#[derive(Debug, Clone)]
pub struct HostSettings {
    /// Address game clients use to reach this host.
    pub agent_address: String,
    pub port_range_start: u16,
    pub port_range_end: u16,
    pub ports: PortsConfig,
    pub policies: PoliciesConfig,
    pub discovery: Discovery,
    pub recording: RecordingConfig,
    pub schema_dir: Option<PathBuf>,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self::from_config(&HostConfig::default())
    }
}

impl HostSettings {
    pub fn from_config(config: &HostConfig) -> Self {
        Self {
            agent_address: config.host.agent_address.clone(),
            port_range_start: config.host.port_range_start,
            port_range_end: config.host.port_range_end,
            ports: config.ports,
            policies: config.policies,
            discovery: Discovery {
                timeouts: ClientTimeouts {
                    connect: Duration::from_millis(config.discovery.connect_timeout_ms),
                    reply: Duration::from_millis(config.discovery.reply_timeout_ms),
                },
                reservation_timeout_ms: config.discovery.reservation_timeout_ms,
            },
            recording: config.recording.clone(),
            schema_dir: config.host.schema_dir.clone(),
        }
    }

    fn server_options(&self) -> ServerOptions {
        ServerOptions::default().with_port_range(self.port_range_start, self.port_range_end)
    }

    fn frame_port(&self, frame_type: FrameType) -> u16 {
        match frame_type {
            FrameType::Video => self.ports.video,
            FrameType::DepthMap => self.ports.depth,
            FrameType::Luminance => self.ports.luminance,
            FrameType::ColourMap => self.ports.colour_map,
        }
    }
}

/// Listeners and recordings of the current mission.
#[derive(Default)]
struct Session {
    control: Option<StringServer>,
    rewards: Option<StringServer>,
    observations: Option<StringServer>,
    video: BTreeMap<FrameType, VideoServer>,
    record: Option<MissionRecord>,
    pipelines: PipelineStack,
    rewards_record: Option<Arc<RecordFile>>,
}

#[derive(Default)]
struct Commands {
    connection: Option<CommandConnection>,
    record: Option<Arc<RecordFile>>,
}

struct HostInner {
    settings: HostSettings,
    phase: Mutex<MissionPhase>,
    world: WorldStateStore,
    session: tokio::sync::Mutex<Session>,
    events: EventSender,
    receiver: Mutex<Option<EventReceiver>>,
    commands: Mutex<Commands>,
    mission_init: Mutex<Option<MissionInit>>,
    temporary_directory: Mutex<Option<PathBuf>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Checks the role and requested video size before anything is touched.
fn validate_request(mission: &Mission, role: usize) -> Result<&AgentSpec, MissionError> {
    let agents = mission.number_of_agents();
    let agent = mission
        .agent(role)
        .ok_or(MissionError::BadRoleRequest { role, agents })?;
    if let Some(video) = agent.video {
        if video.width % 4 != 0 || video.height % 2 != 0 {
            return Err(MissionError::BadVideoRequest {
                width: video.width,
                height: video.height,
            });
        }
    }
    Ok(agent)
}

fn preview(text: &str, len: usize) -> &str {
    match text.char_indices().nth(len) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// Runs missions for one agent role.
///
/// A host owns the listeners the game client sends to, a world state the
/// agent polls, and the recording of each mission. It must be used inside a
/// tokio runtime; listeners and the event loop run as tasks on it.
pub struct AgentHost {
    inner: Arc<HostInner>,
}

impl AgentHost {
    pub fn new(settings: HostSettings) -> Self {
        let (events, receiver) = tokio::sync::mpsc::unbounded_channel();
        let policies = settings.policies;
        Self {
            inner: Arc::new(HostInner {
                settings,
                phase: Mutex::new(MissionPhase::Idle),
                world: WorldStateStore::with_policies(
                    policies.video,
                    policies.rewards,
                    policies.observations,
                ),
                session: tokio::sync::Mutex::new(Session::default()),
                events,
                receiver: Mutex::new(Some(receiver)),
                commands: Mutex::new(Commands::default()),
                mission_init: Mutex::new(None),
                temporary_directory: Mutex::new(None),
            }),
        }
    }

    pub fn settings(&self) -> &HostSettings {
        &self.inner.settings
    }

    /// Starts `mission` for `role` on a client from `pool`.
    ///
    /// Returns once a client has accepted the mission; the world state shows
    /// the mission running when the client confirms it has begun. On failure
    /// everything opened for the mission is closed again.
    pub async fn start_mission(
        &self,
        mission: &Mission,
        pool: &ClientPool,
        record_spec: MissionRecordSpec,
        role: usize,
        experiment_id: &str,
    ) -> Result<(), MissionError> {
        check_installation_once(self.inner.settings.schema_dir.as_deref())?;
        validate_request(mission, role)?;

        // an overlapping start now sees a starting phase and fails
        let previous = self.inner.begin_start()?;
        self.ensure_event_loop();

        let mut session = self.inner.session.lock().await;
        if previous == MissionPhase::AwaitingStart {
            tracing::info!("replacing a mission that never began");
            self.inner.teardown(&mut session, None).await;
        }

        tracing::info!(role, experiment_id, agents = mission.number_of_agents(), "starting mission");
        let result = self
            .inner
            .start_locked(&mut session, mission, pool, record_spec, role, experiment_id)
            .await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "mission start failed");
            self.inner.teardown(&mut session, None).await;
            self.inner.force_closed(MissionEvent::Failed);
        }
        result
    }

    /// Stops the current mission, if any, and closes every listener.
    ///
    /// A start still searching for a client gives up at its next step.
    pub async fn close(&self) {
        self.inner.force_closed(MissionEvent::CloseRequested);
        let mut session = self.inner.session.lock().await;
        self.inner.teardown(&mut session, None).await;
        if let Some(server) = session.control.take() {
            server.close();
        }
        if let Some(server) = session.rewards.take() {
            server.close();
        }
        if let Some(server) = session.observations.take() {
            server.close();
        }
        for (_, server) in std::mem::take(&mut session.video) {
            server.close();
        }
        self.inner.world.set_running(false);
        self.inner.force_closed(MissionEvent::CloseRequested);
    }

    /// Queues a command for the game client.
    pub fn send_command(&self, command: &str) -> Result<(), MissionError> {
        let commands = lock(&self.inner.commands);
        let connection = commands
            .connection
            .as_ref()
            .ok_or(MissionError::NoCommandPort)?;
        connection
            .send(command)
            .map_err(|_| MissionError::NoCommandPort)?;
        if let Some(record) = &commands.record {
            if let Err(e) = record.append_line(&Utc::now(), command) {
                tracing::warn!(error = %e, "failed to record command");
            }
        }
        Ok(())
    }

    /// Asks `client` to shut itself down.
    pub async fn kill_client(&self, client: &ClientInfo) -> Result<bool, MissionError> {
        self.inner.settings.discovery.kill_client(client).await
    }

    pub fn peek_world_state(&self) -> WorldState {
        self.inner.world.peek()
    }

    /// Returns everything received since the last call and clears it.
    pub fn take_world_state(&self) -> WorldState {
        self.inner.world.take_snapshot()
    }

    pub fn phase(&self) -> MissionPhase {
        self.inner.phase()
    }

    /// The mission init of the current or most recent mission.
    pub fn mission_init(&self) -> Option<MissionInit> {
        lock(&self.inner.mission_init).clone()
    }

    /// Where the current mission's artifacts are collected while it runs.
    pub fn recording_temporary_directory(&self) -> Option<PathBuf> {
        lock(&self.inner.temporary_directory).clone()
    }

    pub fn set_video_policy(&self, policy: VideoPolicy) {
        self.inner.world.set_video_policy(policy);
    }

    pub fn set_rewards_policy(&self, policy: RewardsPolicy) {
        self.inner.world.set_rewards_policy(policy);
    }

    pub fn set_observations_policy(&self, policy: ObservationsPolicy) {
        self.inner.world.set_observations_policy(policy);
    }

    fn ensure_event_loop(&self) {
        if let Some(receiver) = lock(&self.inner.receiver).take() {
            tokio::spawn(run_event_loop(Arc::downgrade(&self.inner), receiver));
        }
    }
}

impl std::fmt::Debug for AgentHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHost")
            .field("phase", &self.inner.phase())
            .finish()
    }
}

async fn run_event_loop(host: Weak<HostInner>, mut receiver: EventReceiver) {
    while let Some(event) = receiver.recv().await {
        let Some(host) = host.upgrade() else {
            break;
        };
        match event {
            ChannelEvent::Control(message) => host.on_control_message(message).await,
            data => host.world.apply(data),
        }
    }
    tracing::debug!("event loop stopped");
}

impl HostInner {
    fn phase(&self) -> MissionPhase {
        *lock(&self.phase)
    }

    fn advance(&self, event: MissionEvent) -> Result<MissionPhase, MissionError> {
        let mut phase = lock(&self.phase);
        let from = *phase;
        let next = transition(from, event)?;
        tracing::debug!(%from, to = %next, ?event, "mission phase changed");
        *phase = next;
        Ok(next)
    }

    /// Moves to `Validating`, returning the phase the start replaced.
    fn begin_start(&self) -> Result<MissionPhase, MissionError> {
        let mut phase = lock(&self.phase);
        let from = *phase;
        let next = transition(from, MissionEvent::StartRequested)?;
        tracing::debug!(%from, to = %next, "mission start claimed");
        *phase = next;
        Ok(from)
    }

    /// Failure and close are accepted from every phase.
    fn force_closed(&self, event: MissionEvent) {
        let mut phase = lock(&self.phase);
        *phase = transition(*phase, event).unwrap_or(MissionPhase::Closed);
    }

    async fn start_locked(
        &self,
        session: &mut Session,
        mission: &Mission,
        pool: &ClientPool,
        record_spec: MissionRecordSpec,
        role: usize,
        experiment_id: &str,
    ) -> Result<(), MissionError> {
        let agents = mission.number_of_agents();
        let agent = validate_request(mission, role)?;
        self.advance(MissionEvent::Validated)?;

        let mut init = MissionInit::new(
            &mission.document,
            experiment_id,
            role,
            &self.settings.agent_address,
        );
        self.open_listeners(session, agent, &mut init).await?;

        let record = MissionRecord::create(record_spec, &self.settings.recording.temp_dir)?;
        *lock(&self.temporary_directory) = record.temporary_directory().map(|p| p.to_path_buf());
        let recording = self.attach_recording(session, &record, agent);
        session.record = Some(record);
        recording?;

        let discovery = self.settings.discovery;
        let mut candidates = pool.clone();
        let mut reserved = None;
        if mission.is_multi_agent() && role == 0 {
            self.advance(MissionEvent::BeginReservation)?;
            let clients = discovery
                .reserve_clients(pool, agents, experiment_id)
                .await?;
            candidates = clients.clone();
            reserved = Some(clients);
        } else if mission.is_multi_agent() && !init.has_minecraft_server() {
            self.advance(MissionEvent::BeginServerSearch)?;
            let server = discovery.find_server(pool, experiment_id).await?;
            tracing::info!(address = %server.0, port = server.1, "found mission server");
            init.minecraft_server = Some(server);
        }

        self.advance(MissionEvent::BeginClientSearch)?;
        let client = match discovery.find_client(&candidates, role, &mut init).await {
            Ok(client) => client,
            Err(e) => {
                if let Some(reserved) = &reserved {
                    discovery.cancel_reservations(reserved).await;
                }
                return Err(e);
            }
        };
        self.world.reset();
        if let Some(record) = &session.record {
            record.write_mission_init(&init.to_xml())?;
        }
        *lock(&self.mission_init) = Some(init);

        // last step: from here a new start may replace this mission
        self.advance(MissionEvent::ClientAccepted)?;
        tracing::info!(client = %client, role, "mission accepted, waiting for it to begin");
        Ok(())
    }

    async fn open_listeners(
        &self,
        session: &mut Session,
        agent: &AgentSpec,
        init: &mut MissionInit,
    ) -> Result<(), MissionError> {
        let ports = self.settings.ports;
        init.connection.agent_mission_control_port = self
            .reuse_or_bind(&mut session.control, ports.control, StringChannel::Control)
            .await?;

        for frame_type in FrameType::ALL {
            let Some((width, height, channels)) = agent.frame_geometry(frame_type) else {
                if let Some(server) = session.video.remove(&frame_type) {
                    server.close();
                }
                continue;
            };
            let port = self.settings.frame_port(frame_type);
            let reusable = session
                .video
                .get(&frame_type)
                .is_some_and(|s| s.can_reuse(port, width, height, channels));
            if !reusable {
                if let Some(old) = session.video.remove(&frame_type) {
                    old.close();
                }
                let server = VideoServer::bind(
                    port,
                    frame_type,
                    width,
                    height,
                    channels,
                    self.settings.server_options(),
                    self.events.clone(),
                )
                .await?;
                session.video.insert(frame_type, server);
            }
            if let Some(server) = session.video.get(&frame_type) {
                server.reset_frames_received();
                init.connection.set_agent_frame_port(frame_type, server.port());
            }
        }

        init.connection.agent_rewards_port = self
            .reuse_or_bind(&mut session.rewards, ports.rewards, StringChannel::Rewards)
            .await?;
        init.connection.agent_observations_port = self
            .reuse_or_bind(
                &mut session.observations,
                ports.observations,
                StringChannel::Observations,
            )
            .await?;
        Ok(())
    }

    async fn reuse_or_bind(
        &self,
        slot: &mut Option<StringServer>,
        port: u16,
        channel: StringChannel,
    ) -> Result<u16, MissionError> {
        if let Some(server) = slot.as_ref() {
            if server.can_reuse(port) {
                return Ok(server.port());
            }
        }
        if let Some(old) = slot.take() {
            old.close();
        }
        let server =
            StringServer::bind(port, channel, self.settings.server_options(), self.events.clone())
                .await?;
        let bound = server.port();
        *slot = Some(server);
        Ok(bound)
    }

    fn attach_recording(
        &self,
        session: &mut Session,
        record: &MissionRecord,
        agent: &AgentSpec,
    ) -> Result<(), MissionError> {
        if let Some(path) = record.rewards_path() {
            let file = Arc::new(RecordFile::open(path)?);
            if let Some(server) = &session.rewards {
                server.record_to(Some(Arc::clone(&file)));
            }
            session.rewards_record = Some(file);
        }
        if let Some(path) = record.observations_path() {
            let file = Arc::new(RecordFile::open(path)?);
            if let Some(server) = &session.observations {
                server.record_to(Some(file));
            }
        }
        if let Some(path) = record.commands_path() {
            lock(&self.commands).record = Some(Arc::new(RecordFile::open(path)?));
        }

        for frame_type in agent.requested_frames() {
            let Some(spec) = record.spec().frame_spec(frame_type) else {
                continue;
            };
            let Some(server) = session.video.get(&frame_type) else {
                continue;
            };
            let (width, height, _) = server.geometry();
            let pipeline = Arc::new(self.start_pipeline(record, frame_type, spec, width, height)?);
            server.attach_recorder(Arc::clone(&pipeline));
            session.pipelines.push(pipeline);
        }
        Ok(())
    }

    fn start_pipeline(
        &self,
        record: &MissionRecord,
        frame_type: FrameType,
        spec: FrameRecordingSpec,
        width: u16,
        height: u16,
    ) -> Result<FramePipeline, MissionError> {
        let recording = &self.settings.recording;
        let name = frame_type.wire_name().to_lowercase();
        let options = PipelineOptions {
            capacity: recording.frame_queue_capacity,
            min_interval: None,
        };
        let missing = |what: &str| {
            MissionError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("mission record has no {what} for {frame_type}"),
            ))
        };

        let pipeline = match spec {
            FrameRecordingSpec::Encoder {
                fps,
                bit_rate,
                drop_input_frames,
            } => {
                let settings = EncoderSettings {
                    encoder: find_encoder(recording.encoder_path.as_deref())?,
                    fps,
                    bit_rate,
                    four_channel_mode: recording.four_channel_mode,
                };
                let output = record.video_path(frame_type).ok_or_else(|| missing("video path"))?;
                let frame_info = record
                    .frame_info_path(frame_type)
                    .ok_or_else(|| missing("frame info path"))?;
                let sink = EncoderPipeSink::open(&settings, output, frame_info, width, height)?;
                let options = if drop_input_frames {
                    options.throttled(fps)
                } else {
                    options
                };
                FramePipeline::start(name, sink, options)?
            }
            FrameRecordingSpec::Archive { numeric_arrays } => {
                let directory = record
                    .frames_directory(frame_type)
                    .ok_or_else(|| missing("frames directory"))?;
                let sink = ArchiveSink::open(
                    directory,
                    ArchiveSettings {
                        numeric_arrays,
                        max_bundle_bytes: recording.archive_max_bytes,
                        compression_level: recording.compression_level,
                    },
                )?;
                FramePipeline::start(name, sink, options)?
            }
        };
        Ok(pipeline)
    }

    /// Stops the mission's recordings and finalises its record. Listeners
    /// stay open so the next mission can reuse them.
    async fn teardown(&self, session: &mut Session, mission_ended_xml: Option<&str>) {
        for server in session.video.values() {
            server.detach_recorders();
        }
        let mut pipelines = std::mem::take(&mut session.pipelines);
        if !pipelines.is_empty() {
            match tokio::task::spawn_blocking(move || pipelines.close_all()).await {
                Ok(results) => {
                    for (name, result) in results {
                        if let Err(e) = result {
                            self.world
                                .push_error(format!("Recording of {name} frames failed: {e}"));
                        }
                    }
                }
                Err(e) => tracing::error!(error = %e, "pipeline teardown task failed"),
            }
        }

        if let Some(server) = &session.rewards {
            server.record_to(None);
        }
        if let Some(server) = &session.observations {
            server.record_to(None);
        }
        session.rewards_record = None;

        let connection = {
            let mut commands = lock(&self.commands);
            commands.record = None;
            commands.connection.take()
        };
        if let Some(connection) = connection {
            connection.close().await;
        }

        if let Some(mut record) = session.record.take() {
            if let Some(xml) = mission_ended_xml {
                if let Err(e) = record.write_mission_ended(xml) {
                    tracing::error!(error = %e, "failed to write mission ended document");
                }
            }
            match tokio::task::spawn_blocking(move || record.close()).await {
                Ok(Ok(Some(path))) => tracing::info!(path = %path.display(), "mission record written"),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "failed to finalise mission record");
                    self.world
                        .push_error(format!("Failed to write mission record: {e}"));
                }
                Err(e) => tracing::error!(error = %e, "mission record task failed"),
            }
        }
        *lock(&self.temporary_directory) = None;
    }

    async fn on_control_message(&self, message: TimestampedString) {
        let root = match parse_document(&message.text) {
            Ok(root) => root,
            Err(e) => {
                self.world.push_error(format!(
                    "Error parsing mission control message as XML: {e}: {}...",
                    preview(&message.text, 20)
                ));
                return;
            }
        };

        match root.name.as_str() {
            "MissionInit" => self.on_mission_init(&root, &message).await,
            "MissionEnded" => self.on_mission_ended(&root, &message).await,
            "ping" => {}
            other => self.wrong_control_message(other, &message),
        }
        self.world.add_mission_control_message(message);
    }

    fn wrong_control_message(&self, root: &str, message: &TimestampedString) {
        self.world.push_error(format!(
            "Unknown mission control message root node or at wrong time: {root} :{}...",
            preview(&message.text, 200)
        ));
    }

    async fn on_mission_init(&self, root: &Element, message: &TimestampedString) {
        let _session = self.session.lock().await;
        if self.phase() != MissionPhase::AwaitingStart || self.world.is_running() {
            self.wrong_control_message(&root.name, message);
            return;
        }

        let init = match MissionInit::from_element(root, &message.text) {
            Ok(init) => init,
            Err(e) => {
                self.world.push_error(format!(
                    "Error parsing MissionInit message XML: {e} :{}...",
                    preview(&message.text, 20)
                ));
                return;
            }
        };
        if let Err(e) = self.advance(MissionEvent::MissionInitReceived) {
            tracing::warn!(error = %e, "mission init ignored");
            return;
        }

        let address = init.connection.client_ip_address.clone();
        let port = init.connection.client_commands_port;
        *lock(&self.mission_init) = Some(init);
        self.world.mark_started();
        tracing::info!(%address, commands_port = port, "mission running");

        if port == 0 {
            self.world
                .push_error(MissionError::NoCommandPort.to_string());
            return;
        }
        let connection =
            CommandConnection::open(address, port, self.settings.discovery.timeouts.connect);
        let previous = lock(&self.commands).connection.replace(connection);
        if let Some(previous) = previous {
            previous.close().await;
        }
    }

    async fn on_mission_ended(&self, root: &Element, message: &TimestampedString) {
        let mut session = self.session.lock().await;
        let phase = self.phase();
        if !matches!(phase, MissionPhase::Running | MissionPhase::AwaitingStart) {
            self.wrong_control_message(&root.name, message);
            return;
        }

        match MissionEnded::from_element(root, message.timestamp) {
            Ok(ended) => {
                if !ended.is_normal() {
                    self.world.push_error(format!(
                        "Mission ended abnormally: {}",
                        ended.human_readable_status
                    ));
                }
                if self.world.is_running() {
                    if let Some(reward) = &ended.reward {
                        self.world.add_reward(reward.clone());
                        if let Some(record) = &session.rewards_record {
                            if let Err(e) =
                                record.append_line(&message.timestamp, &reward.as_simple_string())
                            {
                                tracing::warn!(error = %e, "failed to record final reward");
                            }
                        }
                    }
                }
                compare_frame_counts(&session, &ended);
                tracing::info!(status = %ended.status, "mission ended");
            }
            Err(e) => {
                self.world.push_error(format!(
                    "Error parsing MissionEnded message XML: {e} :{}...",
                    preview(&message.text, 20)
                ));
            }
        }

        if let Err(e) = self.advance(MissionEvent::MissionEndedReceived) {
            tracing::warn!(error = %e, "unexpected mission end");
        }
        self.world.set_running(false);
        self.teardown(&mut session, Some(&message.text)).await;
        if self.advance(MissionEvent::TeardownComplete).is_err() {
            self.force_closed(MissionEvent::Failed);
        }
    }
}

fn compare_frame_counts(session: &Session, ended: &MissionEnded) {
    for data in &ended.video_data {
        let Some(frame_type) = data.frame_type() else {
            tracing::debug!(frame_type = %data.frame_type, "diagnostics for unknown frame type");
            continue;
        };
        let Some(server) = session.video.get(&frame_type) else {
            continue;
        };
        let received = server.frames_received();
        if received == data.frames_sent {
            tracing::debug!(%frame_type, frames = received, "all frames received");
        } else {
            tracing::warn!(
                %frame_type,
                sent = data.frames_sent,
                received,
                "frame count mismatch"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use malmo_types::VideoRequest;

    fn single_agent(video: Option<VideoRequest>) -> Mission {
        Mission::new(
            "<Mission/>",
            vec![AgentSpec {
                video,
                ..AgentSpec::default()
            }],
        )
    }

    #[tokio::test]
    async fn bad_role_changes_nothing() {
        let host = AgentHost::new(HostSettings::default());
        let result = host
            .start_mission(&single_agent(None), &ClientPool::new(), MissionRecordSpec::new(), 1, "")
            .await;
        match result {
            Err(MissionError::BadRoleRequest { role: 1, agents: 1 }) => {}
            other => panic!("expected BadRoleRequest, got {other:?}"),
        }
        assert_eq!(host.phase(), MissionPhase::Idle);
    }

    #[tokio::test]
    async fn odd_video_size_is_rejected_before_listening() {
        let host = AgentHost::new(HostSettings::default());
        let mission = single_agent(Some(VideoRequest {
            width: 321,
            height: 240,
            want_depth: false,
        }));
        match host
            .start_mission(&mission, &ClientPool::new(), MissionRecordSpec::new(), 0, "")
            .await
        {
            Err(MissionError::BadVideoRequest { width: 321, height: 240 }) => {}
            other => panic!("expected BadVideoRequest, got {other:?}"),
        }
        assert!(host.mission_init().is_none());
        assert_eq!(host.phase(), MissionPhase::Idle);
    }

    #[tokio::test]
    async fn empty_pool_fails_and_closes() {
        let host = AgentHost::new(HostSettings::default());
        match host
            .start_mission(&single_agent(None), &ClientPool::new(), MissionRecordSpec::new(), 0, "")
            .await
        {
            Err(MissionError::InsufficientClientsAvailable) => {}
            other => panic!("expected InsufficientClientsAvailable, got {other:?}"),
        }
        assert_eq!(host.phase(), MissionPhase::Closed);
        assert!(!host.peek_world_state().is_mission_running);
    }

    #[test]
    fn send_command_without_connection() {
        let host = AgentHost::new(HostSettings::default());
        match host.send_command("move 1") {
            Err(MissionError::NoCommandPort) => {}
            other => panic!("expected NoCommandPort, got {other:?}"),
        }
    }

    #[test]
    fn preview_respects_char_boundaries() {
        assert_eq!(preview("héllo", 2), "hé");
        assert_eq!(preview("ab", 20), "ab");
    }
}
