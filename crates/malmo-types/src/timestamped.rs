//! Records stamped with their arrival time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Formats a timestamp the way record files and frame indexes expect it,
/// e.g. `20240131T235959.123456`.
pub fn iso_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y%m%dT%H%M%S%.6f").to_string()
}

/// Raw bytes delivered by a listener, stamped on receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampedBytes {
    pub timestamp: DateTime<Utc>,
    pub data: Vec<u8>,
}

impl TimestampedBytes {
    /// Stamps `data` with the current time.
    pub fn now(data: Vec<u8>) -> Self {
        Self {
            timestamp: Utc::now(),
            data,
        }
    }
}

/// A text message from a string channel or the control channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampedString {
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

impl TimestampedString {
    pub fn new(timestamp: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self {
            timestamp,
            text: text.into(),
        }
    }

    /// Decodes the payload as UTF-8, replacing invalid sequences.
    pub fn from_bytes(message: &TimestampedBytes) -> Self {
        Self {
            timestamp: message.timestamp,
            text: String::from_utf8_lossy(&message.data).into_owned(),
        }
    }

    /// Renders the `<iso-timestamp> <text>` line used by record files.
    pub fn to_record_line(&self) -> String {
        format!("{} {}", iso_timestamp(&self.timestamp), self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn record_line_uses_compact_iso_format() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap();
        let line = TimestampedString::new(ts, "move 1").to_record_line();
        assert_eq!(line, "20240131T235959.000000 move 1");
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let message = TimestampedBytes::now(vec![b'o', b'k', 0xff]);
        let text = TimestampedString::from_bytes(&message);
        assert_eq!(text.text, "ok\u{fffd}");
        assert_eq!(text.timestamp, message.timestamp);
    }
}
