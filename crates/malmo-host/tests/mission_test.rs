use flate2::read::GzDecoder;
use malmo_host::config::RecordingConfig;
use malmo_host::{AgentHost, HostSettings, MissionError, MissionInit, MissionPhase};
use malmo_tcp::{send_message, ClientTimeouts, Framing};
use malmo_types::{
    AgentSpec, ClientInfo, ClientPool, FrameRecordingSpec, FrameRequest, FrameType, Mission,
    MissionRecordSpec, Pose, WorldState,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

type Replier = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// A stand-in game client: answers each line request on its mission control
/// port and reports what it was asked.
async fn spawn_fake_client(
    index: usize,
    requests: mpsc::UnboundedSender<(usize, String)>,
    reply: Replier,
) -> ClientInfo {
    spawn_slow_client(index, requests, reply, Duration::ZERO).await
}

/// Like [`spawn_fake_client`], holding each reply back for `delay`.
async fn spawn_slow_client(
    index: usize,
    requests: mpsc::UnboundedSender<(usize, String)>,
    reply: Replier,
    delay: Duration,
) -> ClientInfo {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let requests = requests.clone();
            let reply = Arc::clone(&reply);
            tokio::spawn(async move {
                let mut stream = BufReader::new(stream);
                let mut line = String::new();
                if stream.read_line(&mut line).await.unwrap_or(0) == 0 {
                    return;
                }
                let line = line.trim_end().to_string();
                let answer = reply(&line);
                let _ = requests.send((index, line));
                tokio::time::sleep(delay).await;
                let mut body = (answer.len() as u32).to_be_bytes().to_vec();
                body.extend_from_slice(answer.as_bytes());
                let _ = stream.get_mut().write_all(&body).await;
            });
        }
    });
    ClientInfo::new("127.0.0.1", port)
}

async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn send(port: u16, payload: &[u8]) {
    send_message(
        "127.0.0.1",
        port,
        payload,
        Framing::LengthPrefixed,
        ClientTimeouts::default(),
    )
    .await
    .unwrap();
}

async fn wait_until(host: &AgentHost, what: &str, condition: impl Fn(&AgentHost, &WorldState) -> bool) {
    for _ in 0..500 {
        if condition(host, &host.peek_world_state()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}; state: {:?}", host.peek_world_state());
}

fn settings(temp_dir: &std::path::Path) -> HostSettings {
    HostSettings {
        recording: RecordingConfig {
            temp_dir: temp_dir.to_path_buf(),
            ..RecordingConfig::default()
        },
        ..HostSettings::default()
    }
}

fn agents(count: usize) -> Vec<AgentSpec> {
    vec![AgentSpec::default(); count]
}

fn mission_ended(status: &str, extra: &str) -> String {
    format!(
        r#"<MissionEnded xmlns="http://ProjectMalmo.microsoft.com"><Status>{status}</Status><HumanReadableStatus>status {status}</HumanReadableStatus>{extra}<MissionDiagnostics/></MissionEnded>"#
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_agent_mission_runs_and_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("records").join("mission.tgz");

    let (requests_tx, mut requests) = mpsc::unbounded_channel();
    let client = spawn_fake_client(0, requests_tx, Arc::new(|_: &str| "MALMOOK".to_string())).await;
    let pool: ClientPool = vec![client].into();

    let commands = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let commands_port = commands.local_addr().unwrap().port();
    let (command_tx, mut command_lines) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let (stream, _) = commands.accept().await.unwrap();
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let _ = command_tx.send(line);
        }
    });

    let mission = Mission::new(
        r#"<?xml version="1.0"?><Mission xmlns="http://ProjectMalmo.microsoft.com"/>"#,
        vec![AgentSpec {
            luminance: Some(FrameRequest { width: 4, height: 2 }),
            ..AgentSpec::default()
        }],
    );
    let record = MissionRecordSpec::with_destination(&destination)
        .record_commands()
        .record_rewards()
        .record_observations()
        .record_frames(FrameType::Luminance, FrameRecordingSpec::Archive { numeric_arrays: false });

    let host = AgentHost::new(settings(&dir.path().join("tmp")));
    host.start_mission(&mission, &pool, record, 0, "exp-1").await.unwrap();
    assert_eq!(host.phase(), MissionPhase::AwaitingStart);
    assert!(host.recording_temporary_directory().is_some());

    let (_, offered) = requests.recv().await.unwrap();
    let mut init = MissionInit::from_xml(&offered).unwrap();
    assert_eq!(init.experiment_uid, "exp-1");
    assert_eq!(init.client_role, 0);
    let ports = init.connection.clone();
    assert_ne!(ports.agent_mission_control_port, 0);
    assert_ne!(ports.agent_luminance_port, 0);
    assert_eq!(ports.agent_video_port, 0);

    init.connection.client_commands_port = commands_port;
    send(ports.agent_mission_control_port, init.to_xml().as_bytes()).await;
    wait_until(&host, "mission to begin", |_, s| s.is_mission_running).await;
    assert_eq!(host.phase(), MissionPhase::Running);

    match host
        .start_mission(&mission, &pool, MissionRecordSpec::new(), 0, "exp-1")
        .await
    {
        Err(MissionError::AlreadyRunning) => {}
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }
    assert_eq!(host.phase(), MissionPhase::Running);

    host.send_command("move 1").unwrap();
    let line = tokio::time::timeout(Duration::from_secs(5), command_lines.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(line, "move 1");

    send(ports.agent_rewards_port, b"0:1.5").await;
    send(ports.agent_observations_port, br#"{"XPos":1}"#).await;
    let mut frame = Pose::default().to_header().to_vec();
    frame.extend_from_slice(&[7u8; 8]);
    send(ports.agent_luminance_port, &frame).await;
    wait_until(&host, "data channels", |_, s| {
        s.number_of_rewards_since_last_state == 1
            && s.number_of_observations_since_last_state == 1
            && s.number_of_video_frames_since_last_state == 1
    })
    .await;

    let ended = mission_ended("ENDED", r#"<Reward><Value dimension="0" value="2"/></Reward>"#);
    send(ports.agent_mission_control_port, ended.as_bytes()).await;
    wait_until(&host, "mission to close", |h, _| h.phase() == MissionPhase::Closed).await;

    let state = host.take_world_state();
    assert!(!state.is_mission_running);
    assert!(state.has_mission_begun);
    assert!(state.errors.is_empty(), "unexpected errors: {:?}", state.errors);
    assert_eq!(state.mission_control_messages.len(), 2);
    assert_eq!(state.rewards.len(), 1);
    assert_eq!(state.rewards[0].total(), 3.5);
    assert!(host.recording_temporary_directory().is_none());

    let archive = std::fs::File::open(&destination).unwrap();
    let mut entries = Vec::new();
    let mut rewards = String::new();
    for entry in tar::Archive::new(GzDecoder::new(archive)).entries().unwrap() {
        let mut entry = entry.unwrap();
        let path = entry.path().unwrap().to_string_lossy().into_owned();
        if path.ends_with("/rewards.txt") {
            std::io::Read::read_to_string(&mut entry, &mut rewards).unwrap();
        }
        entries.push(path);
    }
    for expected in [
        "missionInit.xml",
        "missionEnded.xml",
        "commands.txt",
        "observations.txt",
        "rewards.txt",
        "luminance_frames/frame_info.txt",
    ] {
        assert!(
            entries.iter().any(|p| p.ends_with(expected)),
            "{expected} missing from {entries:?}"
        );
    }
    let lines: Vec<_> = rewards.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with(" 0:1.5"));
    assert!(lines[1].ends_with(" 0:2"));

    host.close().await;
    host.close().await;
    assert_eq!(host.phase(), MissionPhase::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn control_errors_become_world_state_entries() {
    let dir = tempfile::tempdir().unwrap();
    let (requests_tx, mut requests) = mpsc::unbounded_channel();
    let client = spawn_fake_client(0, requests_tx, Arc::new(|_: &str| "MALMOOK".to_string())).await;

    let host = AgentHost::new(settings(dir.path()));
    let mission = Mission::new("<Mission/>", agents(1));
    host.start_mission(&mission, &vec![client].into(), MissionRecordSpec::new(), 0, "")
        .await
        .unwrap();
    let (_, offered) = requests.recv().await.unwrap();
    let init = MissionInit::from_xml(&offered).unwrap();
    let control = init.connection.agent_mission_control_port;

    send(control, b"<ping/>").await;
    wait_until(&host, "ping", |_, s| s.mission_control_messages.len() == 1).await;
    send(control, b"<Unexpected/>").await;
    wait_until(&host, "unknown root", |_, s| s.mission_control_messages.len() == 2).await;
    send(control, b"<MissionInit").await;
    wait_until(&host, "malformed xml", |_, s| s.errors.len() == 2).await;

    // the client never reported a command port
    send(control, init.to_xml().as_bytes()).await;
    wait_until(&host, "mission to begin", |_, s| s.is_mission_running).await;
    match host.send_command("jump 1") {
        Err(MissionError::NoCommandPort) => {}
        other => panic!("expected NoCommandPort, got {other:?}"),
    }

    let broken = r#"<MissionEnded><Status>ENDED</Status></MissionEnded>"#;
    send(control, broken.as_bytes()).await;
    wait_until(&host, "mission to close", |h, _| h.phase() == MissionPhase::Closed).await;

    let state = host.take_world_state();
    assert!(!state.is_mission_running);
    let errors: Vec<_> = state.errors.iter().map(|e| e.text.as_str()).collect();
    assert_eq!(errors.len(), 4, "{errors:?}");
    assert!(errors[0].starts_with("Unknown mission control message root node or at wrong time: Unexpected"));
    assert!(errors[1].starts_with("Error parsing mission control message as XML"));
    assert!(errors[2].contains("no command port"));
    assert!(errors[3].starts_with("Error parsing MissionEnded message XML"));
    host.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn abnormal_end_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let (requests_tx, mut requests) = mpsc::unbounded_channel();
    let client = spawn_fake_client(0, requests_tx, Arc::new(|_: &str| "MALMOOK".to_string())).await;

    let host = AgentHost::new(settings(dir.path()));
    host.start_mission(
        &Mission::new("<Mission/>", agents(1)),
        &vec![client].into(),
        MissionRecordSpec::new(),
        0,
        "",
    )
    .await
    .unwrap();
    let (_, offered) = requests.recv().await.unwrap();
    let init = MissionInit::from_xml(&offered).unwrap();
    let control = init.connection.agent_mission_control_port;

    // ends before it ever began
    send(control, mission_ended("MOD_CRASHED", "").as_bytes()).await;
    wait_until(&host, "mission to close", |h, _| h.phase() == MissionPhase::Closed).await;

    let state = host.take_world_state();
    assert!(!state.has_mission_begun);
    assert_eq!(state.errors.len(), 1);
    assert_eq!(state.errors[0].text, "Mission ended abnormally: status MOD_CRASHED");
    host.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mission_is_offered_round_robin_from_role() {
    let dir = tempfile::tempdir().unwrap();
    let (requests_tx, mut requests) = mpsc::unbounded_channel();
    let reply: Replier = Arc::new(|request: &str| {
        if request.starts_with("MALMO_FIND_SERVER") {
            "MALMOS127.0.0.1:25565".to_string()
        } else {
            "MALMOBUSY".to_string()
        }
    });
    let mut pool = ClientPool::new();
    for index in 0..5 {
        pool.add(spawn_fake_client(index, requests_tx.clone(), Arc::clone(&reply)).await);
    }

    let host = AgentHost::new(settings(dir.path()));
    let result = host
        .start_mission(
            &Mission::new("<Mission/>", agents(5)),
            &pool,
            MissionRecordSpec::new(),
            3,
            "exp-rr",
        )
        .await;
    match result {
        Err(MissionError::InsufficientClientsAvailable) => {}
        other => panic!("expected InsufficientClientsAvailable, got {other:?}"),
    }
    assert_eq!(host.phase(), MissionPhase::Closed);

    drop(requests_tx);
    let mut find_server = Vec::new();
    let mut offers = Vec::new();
    while let Ok(Some((index, request))) =
        tokio::time::timeout(Duration::from_millis(500), requests.recv()).await
    {
        if request.starts_with("MALMO_FIND_SERVER") {
            assert_eq!(request, "MALMO_FIND_SERVERexp-rr");
            find_server.push(index);
        } else {
            let init = MissionInit::from_xml(&request).unwrap();
            assert_eq!(init.minecraft_server, Some(("127.0.0.1".to_string(), 25565)));
            assert_eq!(init.connection.client_mission_control_port, pool.get(index).unwrap().port);
            offers.push(index);
        }
    }
    assert_eq!(find_server, vec![0]);
    assert_eq!(offers, vec![3, 4, 0, 1, 2]);
    host.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_reservation_is_rolled_back() {
    let dir = tempfile::tempdir().unwrap();
    let (requests_tx, mut requests) = mpsc::unbounded_channel();
    let reply: Replier = Arc::new(|request: &str| {
        if request.starts_with("MALMO_REQUEST_CLIENT") {
            "MALMOOK".to_string()
        } else {
            String::new()
        }
    });
    let mut pool = ClientPool::new();
    pool.add(spawn_fake_client(0, requests_tx.clone(), Arc::clone(&reply)).await);
    pool.add(spawn_fake_client(1, requests_tx.clone(), Arc::clone(&reply)).await);
    pool.add(ClientInfo::new("127.0.0.1", unused_port().await));

    let host = AgentHost::new(settings(dir.path()));
    let result = host
        .start_mission(
            &Mission::new("<Mission/>", agents(3)),
            &pool,
            MissionRecordSpec::new(),
            0,
            "exp-r",
        )
        .await;
    match result {
        Err(MissionError::InsufficientClients { required: 3, reserved: 2 }) => {}
        other => panic!("expected InsufficientClients, got {other:?}"),
    }
    assert_eq!(host.phase(), MissionPhase::Closed);

    drop(requests_tx);
    let mut log = Vec::new();
    while let Ok(Some(entry)) =
        tokio::time::timeout(Duration::from_millis(500), requests.recv()).await
    {
        log.push(entry);
    }
    for index in [0, 1] {
        let sent: Vec<_> = log
            .iter()
            .filter(|(i, _)| *i == index)
            .map(|(_, r)| r.as_str())
            .collect();
        assert_eq!(sent.len(), 2, "{sent:?}");
        assert_eq!(sent[0], "MALMO_REQUEST_CLIENT:0.37.0:60000:exp-r");
        assert_eq!(sent[1], "MALMO_CANCEL_REQUEST");
    }
    host.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn server_search_distinguishes_warming_up() {
    let dir = tempfile::tempdir().unwrap();
    let (requests_tx, _requests) = mpsc::unbounded_channel();
    let warming = spawn_fake_client(0, requests_tx.clone(), Arc::new(|_: &str| "MALMONOSERVERYET".to_string())).await;
    let none = spawn_fake_client(1, requests_tx, Arc::new(|_: &str| "MALMONOSERVER".to_string())).await;
    let mission = Mission::new("<Mission/>", agents(2));

    let host = AgentHost::new(settings(dir.path()));
    let pool: ClientPool = vec![none.clone(), warming].into();
    match host.start_mission(&mission, &pool, MissionRecordSpec::new(), 1, "e").await {
        Err(MissionError::ServerWarmingUp) => {}
        other => panic!("expected ServerWarmingUp, got {other:?}"),
    }

    let pool: ClientPool = vec![none].into();
    match host.start_mission(&mission, &pool, MissionRecordSpec::new(), 1, "e").await {
        Err(MissionError::ServerNotFound) => {}
        other => panic!("expected ServerNotFound, got {other:?}"),
    }
    host.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn kill_client_maps_replies() {
    let (requests_tx, _requests) = mpsc::unbounded_channel();
    let host = AgentHost::new(HostSettings::default());

    let ok = spawn_fake_client(0, requests_tx.clone(), Arc::new(|_: &str| "MALMOOK".to_string())).await;
    assert!(host.kill_client(&ok).await.unwrap());

    let busy = spawn_fake_client(1, requests_tx.clone(), Arc::new(|_: &str| "MALMOBUSY".to_string())).await;
    assert!(matches!(
        host.kill_client(&busy).await,
        Err(MissionError::CanNotKillBusyClient)
    ));

    let fixed = spawn_fake_client(2, requests_tx.clone(), Arc::new(|_: &str| "MALMOERRORNOTKILLABLE".to_string())).await;
    assert!(matches!(
        host.kill_client(&fixed).await,
        Err(MissionError::CanNotKillIrreplaceableClient)
    ));

    let other = spawn_fake_client(3, requests_tx, Arc::new(|_: &str| "WHAT".to_string())).await;
    assert!(!host.kill_client(&other).await.unwrap());

    let gone = ClientInfo::new("127.0.0.1", unused_port().await);
    assert!(!host.kill_client(&gone).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn overlapping_start_is_rejected_while_searching() {
    let dir = tempfile::tempdir().unwrap();
    let (requests_tx, _requests) = mpsc::unbounded_channel();
    let client = spawn_slow_client(
        0,
        requests_tx,
        Arc::new(|_: &str| "MALMOOK".to_string()),
        Duration::from_millis(1500),
    )
    .await;
    let pool: ClientPool = vec![client].into();
    let mission = Mission::new("<Mission/>", agents(1));
    let host = AgentHost::new(settings(&dir.path().join("tmp")));

    let (first, (phase, second, waited)) = tokio::join!(
        host.start_mission(&mission, &pool, MissionRecordSpec::new(), 0, "a"),
        async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            let phase = host.phase();
            let started = Instant::now();
            let second = host
                .start_mission(&mission, &pool, MissionRecordSpec::new(), 0, "b")
                .await;
            (phase, second, started.elapsed())
        }
    );

    assert_eq!(phase, MissionPhase::FindingClient);
    match second {
        Err(MissionError::AlreadyRunning) => {}
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }
    assert!(waited < Duration::from_millis(500), "second start waited {waited:?}");
    first.unwrap();
    assert_eq!(host.phase(), MissionPhase::AwaitingStart);
    assert_eq!(host.mission_init().unwrap().experiment_uid, "a");
    host.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_start_leaves_accepted_mission_alone() {
    let dir = tempfile::tempdir().unwrap();
    let (requests_tx, _requests) = mpsc::unbounded_channel();
    let client = spawn_fake_client(0, requests_tx, Arc::new(|_: &str| "MALMOOK".to_string())).await;
    let pool: ClientPool = vec![client].into();
    let mission = Mission::new("<Mission/>", agents(1));
    let host = AgentHost::new(settings(&dir.path().join("tmp")));

    let record = MissionRecordSpec::with_destination(dir.path().join("record.tgz")).record_commands();
    host.start_mission(&mission, &pool, record, 0, "kept").await.unwrap();
    assert_eq!(host.phase(), MissionPhase::AwaitingStart);
    let temporary = host.recording_temporary_directory().unwrap();

    match host
        .start_mission(&mission, &pool, MissionRecordSpec::new(), 7, "bad")
        .await
    {
        Err(MissionError::BadRoleRequest { role: 7, agents: 1 }) => {}
        other => panic!("expected BadRoleRequest, got {other:?}"),
    }
    assert_eq!(host.phase(), MissionPhase::AwaitingStart);
    assert_eq!(host.mission_init().unwrap().experiment_uid, "kept");
    assert_eq!(host.recording_temporary_directory(), Some(temporary.clone()));
    assert!(temporary.exists());
    assert!(!dir.path().join("record.tgz").exists());
    host.close().await;
}
