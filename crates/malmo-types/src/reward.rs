//! Multi-dimensional rewards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised while parsing the `<dimension>:<value>,...` reward format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewardParseError {
    /// The text contained no dimension/value pairs.
    #[error("reward text is empty")]
    Empty,

    /// A pair was not of the form `<dimension>:<value>`.
    #[error("malformed reward pair: {0}")]
    MalformedPair(String),

    /// The dimension was not an integer.
    #[error("invalid reward dimension: {0}")]
    InvalidDimension(String),

    /// The value was not a number.
    #[error("invalid reward value: {0}")]
    InvalidValue(String),
}

/// A reward received at one instant, keyed by dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampedReward {
    pub timestamp: DateTime<Utc>,
    values: BTreeMap<i32, f64>,
}

impl TimestampedReward {
    /// Creates an empty reward.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            values: BTreeMap::new(),
        }
    }

    /// Parses the comma-separated `<dimension>:<value>` format sent on the
    /// rewards channel.
    pub fn parse(timestamp: DateTime<Utc>, text: &str) -> Result<Self, RewardParseError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RewardParseError::Empty);
        }

        let mut reward = Self::new(timestamp);
        for pair in text.split(',') {
            let (dimension, value) = pair
                .split_once(':')
                .ok_or_else(|| RewardParseError::MalformedPair(pair.to_string()))?;
            let dimension: i32 = dimension
                .trim()
                .parse()
                .map_err(|_| RewardParseError::InvalidDimension(dimension.to_string()))?;
            let value: f64 = value
                .trim()
                .parse()
                .map_err(|_| RewardParseError::InvalidValue(value.to_string()))?;
            reward.values.insert(dimension, value);
        }
        Ok(reward)
    }

    /// Sets the value of one dimension.
    pub fn set(&mut self, dimension: i32, value: f64) {
        self.values.insert(dimension, value);
    }

    pub fn get(&self, dimension: i32) -> Option<f64> {
        self.values.get(&dimension).copied()
    }

    /// Sum over every dimension.
    pub fn total(&self) -> f64 {
        self.values.values().sum()
    }

    pub fn dimensions(&self) -> impl Iterator<Item = (i32, f64)> + '_ {
        self.values.iter().map(|(d, v)| (*d, *v))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Adds every dimension of `other` into this reward. The timestamp is
    /// left unchanged.
    pub fn add(&mut self, other: &TimestampedReward) {
        for (dimension, value) in &other.values {
            *self.values.entry(*dimension).or_insert(0.0) += value;
        }
    }

    /// Renders the `<dimension>:<value>,...` format, dimensions ascending.
    pub fn as_simple_string(&self) -> String {
        self.values
            .iter()
            .map(|(d, v)| format!("{d}:{v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn parses_multiple_dimensions() {
        let reward = TimestampedReward::parse(Utc::now(), "0:1.5,2:-3").unwrap();
        assert_eq!(reward.get(0), Some(1.5));
        assert_eq!(reward.get(2), Some(-3.0));
        assert_eq!(reward.get(1), None);
        assert_eq!(reward.as_simple_string(), "0:1.5,2:-3");
    }

    #[test]
    fn rejects_malformed_text() {
        let now = Utc::now();
        assert_eq!(TimestampedReward::parse(now, ""), Err(RewardParseError::Empty));
        assert!(matches!(
            TimestampedReward::parse(now, "0=1"),
            Err(RewardParseError::MalformedPair(_))
        ));
        assert!(matches!(
            TimestampedReward::parse(now, "x:1"),
            Err(RewardParseError::InvalidDimension(_))
        ));
        assert!(matches!(
            TimestampedReward::parse(now, "0:lots"),
            Err(RewardParseError::InvalidValue(_))
        ));
    }

    #[test]
    fn add_sums_per_dimension_and_keeps_timestamp() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::milliseconds(5);
        let mut newer = TimestampedReward::parse(t1, "0:2,1:1").unwrap();
        let older = TimestampedReward::parse(t0, "0:3,4:7").unwrap();
        newer.add(&older);
        assert_eq!(newer.timestamp, t1);
        assert_eq!(newer.get(0), Some(5.0));
        assert_eq!(newer.get(1), Some(1.0));
        assert_eq!(newer.get(4), Some(7.0));
        assert_eq!(newer.total(), 13.0);
    }
}
