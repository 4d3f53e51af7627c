//! Malmo agent host binary.
//!
//! Runs one mission described by the configuration file, logs world state
//! summaries while it runs and closes cleanly on SIGTERM/SIGINT.

use malmo_host::{load_config, AgentHost, HostConfig, HostSettings};
use malmo_types::{ClientInfo, ClientPool, Mission, WorldState};
use serde_json::json;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("MALMO_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("malmo.toml"));

    // Load configuration
    let config = load_config(selected_config_path)
        .expect("failed to load configuration: the host cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.runtime.worker_threads.max(1))
        .thread_name("malmo-io")
        .enable_all()
        .build()
        .expect("failed to build the async runtime");

    let code = runtime.block_on(run(config));
    std::process::exit(code);
}

async fn run(config: HostConfig) -> i32 {
    let document = match std::fs::read_to_string(&config.mission.document_path) {
        Ok(document) => document,
        Err(e) => {
            tracing::error!(
                path = %config.mission.document_path.display(),
                error = %e,
                "failed to read mission document"
            );
            return 1;
        }
    };
    let mission = Mission::new(document, config.mission.agents.clone());

    let mut pool: ClientPool = config.clients.iter().cloned().collect();
    if pool.is_empty() {
        pool.add(ClientInfo::with_default_port("127.0.0.1"));
    }

    let host = AgentHost::new(HostSettings::from_config(&config));
    let started = host
        .start_mission(
            &mission,
            &pool,
            config.mission.record_spec(),
            config.mission.role,
            &config.mission.experiment_id,
        )
        .await;
    if let Err(e) = started {
        tracing::error!(error = %e, "failed to start mission");
        return 1;
    }

    let poll = Duration::from_millis(config.mission.poll_interval_ms.max(1));
    let mut interval = tokio::time::interval(poll);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            _ = interval.tick() => {
                let state = host.take_world_state();
                log_world_state(&state);
                if state.has_mission_begun && !state.is_mission_running {
                    tracing::info!(phase = %host.phase(), "mission finished");
                    break;
                }
            }
        }
    }

    host.close().await;
    tracing::info!("malmo host shut down");
    0
}

fn log_world_state(state: &WorldState) {
    for error in &state.errors {
        tracing::warn!(error = %error.text, "world state error");
    }
    if state.number_of_video_frames_since_last_state == 0
        && state.number_of_rewards_since_last_state == 0
        && state.number_of_observations_since_last_state == 0
    {
        return;
    }

    let summary = json!({
        "running": state.is_mission_running,
        "video_frames": state.number_of_video_frames_since_last_state,
        "rewards": state.number_of_rewards_since_last_state,
        "observations": state.number_of_observations_since_last_state,
        "total_reward": state.rewards.iter().map(|r| r.total()).sum::<f64>(),
        "latest_observation": state.observations.last().map(|o| o.text.as_str()),
    });
    tracing::info!(summary = %summary, "world state");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, shutting down"); }
        () = terminate => { tracing::info!("received SIGTERM, shutting down"); }
    }
}
