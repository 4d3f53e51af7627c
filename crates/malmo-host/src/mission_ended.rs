//! The mission ended notification sent by a game client.

use crate::xml::{escape, parse_document, Element, XmlError};
use chrono::{DateTime, Utc};
use malmo_types::{FrameType, TimestampedReward};

/// Frame counts a client reports for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoDiagnostics {
    pub frame_type: String,
    pub frames_sent: u64,
    pub frames_received: Option<u64>,
    pub frames_written: Option<u64>,
}

impl VideoDiagnostics {
    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::from_wire_name(&self.frame_type)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MissionEnded {
    pub schema_version: Option<String>,
    pub status: String,
    pub human_readable_status: String,
    pub reward: Option<TimestampedReward>,
    pub video_data: Vec<VideoDiagnostics>,
}

impl MissionEnded {
    /// Statuses that count as a clean end of mission.
    pub fn is_normal(&self) -> bool {
        matches!(self.status.as_str(), "ENDED" | "PLAYER_DIED")
    }

    pub fn from_xml(xml: &str, timestamp: DateTime<Utc>) -> Result<Self, XmlError> {
        let root = parse_document(xml)?;
        Self::from_element(&root, timestamp)
    }

    pub(crate) fn from_element(root: &Element, timestamp: DateTime<Utc>) -> Result<Self, XmlError> {
        if root.name != "MissionEnded" {
            return Err(XmlError(format!("expected <MissionEnded>, found <{}>", root.name)));
        }

        let reward = match root.child("Reward") {
            Some(element) => Some(parse_reward(element, timestamp)?),
            None => None,
        };

        let mut video_data = Vec::new();
        if let Some(diagnostics) = root.child("MissionDiagnostics") {
            for data in diagnostics.children_named("VideoData") {
                video_data.push(VideoDiagnostics {
                    frame_type: data
                        .attribute("frameType")
                        .ok_or_else(|| XmlError("VideoData without frameType".to_string()))?
                        .to_string(),
                    frames_sent: parse_count(data, "framesSent")?
                        .ok_or_else(|| XmlError("VideoData without framesSent".to_string()))?,
                    frames_received: parse_count(data, "framesReceived")?,
                    frames_written: parse_count(data, "framesWritten")?,
                });
            }
        }

        Ok(Self {
            schema_version: root.attribute("SchemaVersion").map(str::to_string),
            status: root.required_text("Status")?.to_string(),
            human_readable_status: root.required_text("HumanReadableStatus")?.to_string(),
            reward,
            video_data,
        })
    }

    pub fn to_xml(&self) -> String {
        let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?><MissionEnded xmlns="http://ProjectMalmo.microsoft.com""#);
        if let Some(version) = &self.schema_version {
            xml.push_str(&format!(r#" SchemaVersion="{}""#, escape(version)));
        }
        xml.push('>');
        xml.push_str(&format!("<Status>{}</Status>", escape(&self.status)));
        xml.push_str(&format!(
            "<HumanReadableStatus>{}</HumanReadableStatus>",
            escape(&self.human_readable_status)
        ));
        if let Some(reward) = &self.reward {
            xml.push_str("<Reward>");
            for (dimension, value) in reward.dimensions() {
                xml.push_str(&format!(r#"<Value dimension="{dimension}" value="{value}"/>"#));
            }
            xml.push_str("</Reward>");
        }
        xml.push_str("<MissionDiagnostics>");
        for data in &self.video_data {
            xml.push_str(&format!(
                r#"<VideoData frameType="{}" framesSent="{}"/>"#,
                escape(&data.frame_type),
                data.frames_sent
            ));
        }
        xml.push_str("</MissionDiagnostics></MissionEnded>");
        xml
    }
}

fn parse_reward(element: &Element, timestamp: DateTime<Utc>) -> Result<TimestampedReward, XmlError> {
    let mut reward = TimestampedReward::new(timestamp);
    for value in element.children_named("Value") {
        let dimension = value
            .attribute("dimension")
            .unwrap_or("0")
            .parse::<i32>()
            .map_err(|_| XmlError("invalid reward dimension".to_string()))?;
        let amount = value
            .attribute("value")
            .ok_or_else(|| XmlError("reward value missing".to_string()))?
            .parse::<f64>()
            .map_err(|_| XmlError("invalid reward value".to_string()))?;
        reward.set(dimension, amount);
    }
    if reward.is_empty() {
        return Err(XmlError("Reward must have at least one value".to_string()));
    }
    Ok(reward)
}

fn parse_count(element: &Element, name: &str) -> Result<Option<u64>, XmlError> {
    element
        .attribute(name)
        .map(|v| {
            v.parse()
                .map_err(|_| XmlError(format!("invalid {name} attribute: {v}")))
        })
        .transpose()
}
