//! The snapshot aggregate polled by the agent, and its merge policies.

use crate::frame::TimestampedVideoFrame;
use crate::reward::TimestampedReward;
use crate::timestamped::TimestampedString;
use serde::{Deserialize, Serialize};

/// How arriving video frames are merged into the world state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoPolicy {
    #[default]
    LatestFrameOnly,
    KeepAllFrames,
}

/// How arriving rewards are merged into the world state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardsPolicy {
    LatestRewardOnly,
    /// Keep a single reward holding the per-dimension sum since the last
    /// snapshot.
    #[default]
    SumRewards,
    KeepAllRewards,
}

/// How arriving observations are merged into the world state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationsPolicy {
    #[default]
    LatestObservationOnly,
    KeepAllObservations,
}

/// Everything received since the last snapshot.
///
/// Counters count arrivals, so under a latest-only policy a counter can
/// exceed the length of its sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldState {
    pub is_mission_running: bool,
    pub has_mission_begun: bool,
    pub number_of_video_frames_since_last_state: usize,
    pub number_of_rewards_since_last_state: usize,
    pub number_of_observations_since_last_state: usize,
    pub number_of_mission_control_messages_since_last_state: usize,
    pub video_frames: Vec<TimestampedVideoFrame>,
    pub rewards: Vec<TimestampedReward>,
    pub observations: Vec<TimestampedString>,
    pub mission_control_messages: Vec<TimestampedString>,
    pub errors: Vec<TimestampedString>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears everything, including the running and begun flags.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Moves the received records out, leaving counters at zero and the
    /// running and begun flags untouched.
    pub fn take(&mut self) -> WorldState {
        let running = self.is_mission_running;
        let begun = self.has_mission_begun;
        let snapshot = std::mem::take(self);
        self.is_mission_running = running;
        self.has_mission_begun = begun;
        snapshot
    }

    pub fn add_video_frame(&mut self, frame: TimestampedVideoFrame, policy: VideoPolicy) {
        match policy {
            VideoPolicy::LatestFrameOnly => {
                self.video_frames.clear();
                self.video_frames.push(frame);
            }
            VideoPolicy::KeepAllFrames => self.video_frames.push(frame),
        }
        self.number_of_video_frames_since_last_state += 1;
    }

    pub fn add_reward(&mut self, mut reward: TimestampedReward, policy: RewardsPolicy) {
        match policy {
            RewardsPolicy::LatestRewardOnly => {
                self.rewards.clear();
                self.rewards.push(reward);
            }
            RewardsPolicy::SumRewards => {
                if let Some(previous) = self.rewards.first() {
                    reward.add(previous);
                }
                self.rewards.clear();
                self.rewards.push(reward);
            }
            RewardsPolicy::KeepAllRewards => self.rewards.push(reward),
        }
        self.number_of_rewards_since_last_state += 1;
    }

    pub fn add_observation(&mut self, observation: TimestampedString, policy: ObservationsPolicy) {
        match policy {
            ObservationsPolicy::LatestObservationOnly => {
                self.observations.clear();
                self.observations.push(observation);
            }
            ObservationsPolicy::KeepAllObservations => self.observations.push(observation),
        }
        self.number_of_observations_since_last_state += 1;
    }

    pub fn add_mission_control_message(&mut self, message: TimestampedString) {
        self.mission_control_messages.push(message);
        self.number_of_mission_control_messages_since_last_state += 1;
    }

    pub fn add_error(&mut self, error: TimestampedString) {
        self.errors.push(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn observation(text: &str) -> TimestampedString {
        TimestampedString::new(Utc::now(), text)
    }

    #[test]
    fn latest_only_keeps_one_and_counts_all() {
        let mut state = WorldState::new();
        for i in 0..5 {
            state.add_observation(
                observation(&i.to_string()),
                ObservationsPolicy::LatestObservationOnly,
            );
        }
        assert_eq!(state.observations.len(), 1);
        assert_eq!(state.observations[0].text, "4");
        assert_eq!(state.number_of_observations_since_last_state, 5);
    }

    #[test]
    fn keep_all_preserves_arrival_order() {
        let mut state = WorldState::new();
        for i in 0..4 {
            state.add_observation(
                observation(&i.to_string()),
                ObservationsPolicy::KeepAllObservations,
            );
        }
        let texts: Vec<&str> = state.observations.iter().map(|o| o.text.as_str()).collect();
        assert_eq!(texts, vec!["0", "1", "2", "3"]);
    }

    #[test]
    fn sum_rewards_merges_into_newest() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::milliseconds(10);
        let mut state = WorldState::new();
        state.add_reward(
            TimestampedReward::parse(t0, "0:1.5").unwrap(),
            RewardsPolicy::SumRewards,
        );
        state.add_reward(
            TimestampedReward::parse(t1, "0:2.0").unwrap(),
            RewardsPolicy::SumRewards,
        );
        assert_eq!(state.rewards.len(), 1);
        assert_eq!(state.rewards[0].get(0), Some(3.5));
        assert_eq!(state.rewards[0].timestamp, t1);
        assert_eq!(state.number_of_rewards_since_last_state, 2);
    }

    #[test]
    fn take_resets_counters_but_keeps_flags() {
        let mut state = WorldState::new();
        state.is_mission_running = true;
        state.has_mission_begun = true;
        state.add_observation(observation("x"), ObservationsPolicy::KeepAllObservations);
        state.add_error(observation("oops"));

        let snapshot = state.take();
        assert_eq!(snapshot.number_of_observations_since_last_state, 1);
        assert_eq!(snapshot.errors.len(), 1);
        assert!(snapshot.is_mission_running);
        assert!(state.is_mission_running);
        assert!(state.has_mission_begun);
        assert_eq!(state.number_of_observations_since_last_state, 0);
        assert!(state.observations.is_empty());
        assert!(state.errors.is_empty());
    }
}
