//! Mutex-guarded world state shared by the event loop and the agent.

use crate::events::ChannelEvent;
use chrono::Utc;
use malmo_types::{
    ObservationsPolicy, RewardsPolicy, TimestampedReward, TimestampedString,
    TimestampedVideoFrame, VideoPolicy, WorldState,
};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Inner {
    state: WorldState,
    video_policy: VideoPolicy,
    rewards_policy: RewardsPolicy,
    observations_policy: ObservationsPolicy,
}

/// The single owner of a host's [`WorldState`].
///
/// Every update and every snapshot takes the same lock, so a record lands
/// either wholly in one snapshot or wholly in the next. No I/O happens while
/// the lock is held.
#[derive(Debug, Default)]
pub struct WorldStateStore {
    inner: Mutex<Inner>,
}

impl WorldStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policies(
        video: VideoPolicy,
        rewards: RewardsPolicy,
        observations: ObservationsPolicy,
    ) -> Self {
        let store = Self::new();
        store.set_video_policy(video);
        store.set_rewards_policy(rewards);
        store.set_observations_policy(observations);
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_video_policy(&self, policy: VideoPolicy) {
        self.lock().video_policy = policy;
    }

    pub fn set_rewards_policy(&self, policy: RewardsPolicy) {
        self.lock().rewards_policy = policy;
    }

    pub fn set_observations_policy(&self, policy: ObservationsPolicy) {
        self.lock().observations_policy = policy;
    }

    pub fn policies(&self) -> (VideoPolicy, RewardsPolicy, ObservationsPolicy) {
        let inner = self.lock();
        (
            inner.video_policy,
            inner.rewards_policy,
            inner.observations_policy,
        )
    }

    /// Applies a data event. Control events are interpreted by the
    /// orchestrator and ignored here.
    pub fn apply(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Frame(frame) => self.add_frame(frame),
            ChannelEvent::Reward(text) => self.add_reward_text(text),
            ChannelEvent::Observation(text) => self.add_observation(text),
            ChannelEvent::Control(_) => {
                tracing::trace!("control event ignored by world state");
            }
        }
    }

    pub fn add_frame(&self, frame: TimestampedVideoFrame) {
        let mut inner = self.lock();
        let policy = inner.video_policy;
        inner.state.add_video_frame(frame, policy);
    }

    /// Parses reward text; malformed text becomes an error entry.
    pub fn add_reward_text(&self, text: TimestampedString) {
        match TimestampedReward::parse(text.timestamp, &text.text) {
            Ok(reward) => self.add_reward(reward),
            Err(e) => {
                tracing::warn!(error = %e, "discarding malformed reward");
                self.push_error(format!("Failed to parse reward '{}': {}", text.text.trim(), e));
            }
        }
    }

    pub fn add_reward(&self, reward: TimestampedReward) {
        let mut inner = self.lock();
        let policy = inner.rewards_policy;
        inner.state.add_reward(reward, policy);
    }

    pub fn add_observation(&self, observation: TimestampedString) {
        let mut inner = self.lock();
        let policy = inner.observations_policy;
        inner.state.add_observation(observation, policy);
    }

    pub fn add_mission_control_message(&self, message: TimestampedString) {
        self.lock().state.add_mission_control_message(message);
    }

    /// Records an error entry stamped now.
    pub fn push_error(&self, text: impl Into<String>) {
        self.lock()
            .state
            .add_error(TimestampedString::new(Utc::now(), text));
    }

    /// Marks the mission as begun and running.
    pub fn mark_started(&self) {
        let mut inner = self.lock();
        inner.state.has_mission_begun = true;
        inner.state.is_mission_running = true;
    }

    pub fn set_running(&self, running: bool) {
        self.lock().state.is_mission_running = running;
    }

    pub fn is_running(&self) -> bool {
        self.lock().state.is_mission_running
    }

    /// Discards everything, flags included.
    pub fn reset(&self) {
        self.lock().state.clear();
    }

    /// Returns and clears everything received since the last snapshot.
    pub fn take_snapshot(&self) -> WorldState {
        self.lock().state.take()
    }

    /// Returns a copy without clearing.
    pub fn peek(&self) -> WorldState {
        self.lock().state.clone()
    }
}
