//! The mission init handshake document.

use crate::xml::{escape, parse_document, Element, XmlError};
use malmo_types::{ClientInfo, FrameType, DEFAULT_CLIENT_PORT, MALMO_VERSION};

pub const MALMO_NAMESPACE: &str = "http://ProjectMalmo.microsoft.com";
const XMLNS_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Ports and addresses both ends need to reach each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAgentConnection {
    pub client_ip_address: String,
    pub client_mission_control_port: u16,
    /// Filled in by the game client when it acknowledges the mission.
    pub client_commands_port: u16,
    pub agent_ip_address: String,
    pub agent_mission_control_port: u16,
    pub agent_video_port: u16,
    pub agent_depth_port: u16,
    pub agent_luminance_port: u16,
    pub agent_observations_port: u16,
    pub agent_rewards_port: u16,
    pub agent_colour_map_port: u16,
}

impl Default for ClientAgentConnection {
    fn default() -> Self {
        Self {
            client_ip_address: "127.0.0.1".to_string(),
            client_mission_control_port: DEFAULT_CLIENT_PORT,
            client_commands_port: 0,
            agent_ip_address: "127.0.0.1".to_string(),
            agent_mission_control_port: 0,
            agent_video_port: 0,
            agent_depth_port: 0,
            agent_luminance_port: 0,
            agent_observations_port: 0,
            agent_rewards_port: 0,
            agent_colour_map_port: 0,
        }
    }
}

impl ClientAgentConnection {
    pub fn agent_frame_port(&self, frame_type: FrameType) -> u16 {
        match frame_type {
            FrameType::Video => self.agent_video_port,
            FrameType::DepthMap => self.agent_depth_port,
            FrameType::Luminance => self.agent_luminance_port,
            FrameType::ColourMap => self.agent_colour_map_port,
        }
    }

    pub fn set_agent_frame_port(&mut self, frame_type: FrameType, port: u16) {
        match frame_type {
            FrameType::Video => self.agent_video_port = port,
            FrameType::DepthMap => self.agent_depth_port = port,
            FrameType::Luminance => self.agent_luminance_port = port,
            FrameType::ColourMap => self.agent_colour_map_port = port,
        }
    }
}

/// Negotiated start-up document for one role of a mission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionInit {
    pub schema_version: String,
    pub platform_version: String,
    /// The `<Mission>` element, verbatim.
    pub mission: String,
    pub experiment_uid: String,
    /// Integrated server of a multi-agent mission, once known.
    pub minecraft_server: Option<(String, u16)>,
    pub client_role: usize,
    pub connection: ClientAgentConnection,
}

impl MissionInit {
    /// Mission init for `role` with every port still unassigned.
    pub fn new(mission_document: &str, experiment_uid: &str, role: usize, agent_address: &str) -> Self {
        Self {
            schema_version: MALMO_VERSION.to_string(),
            platform_version: MALMO_VERSION.to_string(),
            mission: strip_declaration(mission_document).to_string(),
            experiment_uid: experiment_uid.to_string(),
            minecraft_server: None,
            client_role: role,
            connection: ClientAgentConnection {
                agent_ip_address: agent_address.to_string(),
                ..ClientAgentConnection::default()
            },
        }
    }

    pub fn set_client(&mut self, client: &ClientInfo) {
        self.connection.client_ip_address = client.address.clone();
        self.connection.client_mission_control_port = client.port;
    }

    pub fn has_minecraft_server(&self) -> bool {
        self.minecraft_server.is_some()
    }

    /// Serialises the document on a single line.
    pub fn to_xml(&self) -> String {
        let c = &self.connection;
        let mut xml = format!(
            r#"<?xml version="1.0" encoding="utf-8"?><MissionInit xmlns="{MALMO_NAMESPACE}" xmlns:xsi="{XMLNS_XSI}" SchemaVersion="{}" PlatformVersion="{}">"#,
            escape(&self.schema_version),
            escape(&self.platform_version),
        );
        xml.push_str(&self.mission);
        xml.push_str(&format!(
            "<ExperimentUID>{}</ExperimentUID>",
            escape(&self.experiment_uid)
        ));
        if let Some((address, port)) = &self.minecraft_server {
            xml.push_str(&format!(
                r#"<MinecraftServerConnection address="{}" port="{}"/>"#,
                escape(address),
                port
            ));
        }
        xml.push_str(&format!("<ClientRole>{}</ClientRole>", self.client_role));
        xml.push_str("<ClientAgentConnection>");
        xml.push_str(&format!(
            "<ClientIPAddress>{}</ClientIPAddress>",
            escape(&c.client_ip_address)
        ));
        for (name, port) in [
            ("ClientMissionControlPort", c.client_mission_control_port),
            ("ClientCommandsPort", c.client_commands_port),
        ] {
            xml.push_str(&format!("<{name}>{port}</{name}>"));
        }
        xml.push_str(&format!(
            "<AgentIPAddress>{}</AgentIPAddress>",
            escape(&c.agent_ip_address)
        ));
        for (name, port) in [
            ("AgentMissionControlPort", c.agent_mission_control_port),
            ("AgentVideoPort", c.agent_video_port),
            ("AgentDepthPort", c.agent_depth_port),
            ("AgentLuminancePort", c.agent_luminance_port),
            ("AgentObservationsPort", c.agent_observations_port),
            ("AgentRewardsPort", c.agent_rewards_port),
            ("AgentColourMapPort", c.agent_colour_map_port),
        ] {
            xml.push_str(&format!("<{name}>{port}</{name}>"));
        }
        xml.push_str("</ClientAgentConnection></MissionInit>");
        xml.retain(|ch| ch != '\n' && ch != '\r');
        xml
    }

    pub fn from_xml(xml: &str) -> Result<Self, XmlError> {
        let root = parse_document(xml)?;
        Self::from_element(&root, xml)
    }

    pub(crate) fn from_element(root: &Element, source: &str) -> Result<Self, XmlError> {
        if root.name != "MissionInit" {
            return Err(XmlError(format!("expected <MissionInit>, found <{}>", root.name)));
        }
        let mission = root
            .child("Mission")
            .ok_or_else(|| XmlError("missing <Mission> in <MissionInit>".to_string()))?;
        let minecraft_server = match root.child("MinecraftServerConnection") {
            Some(server) => {
                let address = server.attribute("address").unwrap_or_default().to_string();
                let port = server
                    .attribute("port")
                    .unwrap_or("0")
                    .parse()
                    .map_err(|_| XmlError("invalid MinecraftServerConnection port".to_string()))?;
                Some((address, port))
            }
            None => None,
        };
        let c = root
            .child("ClientAgentConnection")
            .ok_or_else(|| XmlError("missing <ClientAgentConnection>".to_string()))?;
        let optional_port = |name: &str| -> Result<u16, XmlError> {
            match c.child(name) {
                Some(_) => c.parse_child(name),
                None => Ok(0),
            }
        };

        Ok(Self {
            schema_version: root.attribute("SchemaVersion").unwrap_or_default().to_string(),
            platform_version: root
                .attribute("PlatformVersion")
                .unwrap_or_default()
                .to_string(),
            mission: source[mission.span.clone()].to_string(),
            experiment_uid: root.child_text("ExperimentUID").unwrap_or_default().to_string(),
            minecraft_server,
            client_role: root.parse_child("ClientRole")?,
            connection: ClientAgentConnection {
                client_ip_address: c.required_text("ClientIPAddress")?.to_string(),
                client_mission_control_port: c.parse_child("ClientMissionControlPort")?,
                client_commands_port: optional_port("ClientCommandsPort")?,
                agent_ip_address: c.required_text("AgentIPAddress")?.to_string(),
                agent_mission_control_port: c.parse_child("AgentMissionControlPort")?,
                agent_video_port: optional_port("AgentVideoPort")?,
                agent_depth_port: optional_port("AgentDepthPort")?,
                agent_luminance_port: optional_port("AgentLuminancePort")?,
                agent_observations_port: optional_port("AgentObservationsPort")?,
                agent_rewards_port: optional_port("AgentRewardsPort")?,
                agent_colour_map_port: optional_port("AgentColourMapPort")?,
            },
        })
    }
}

fn strip_declaration(document: &str) -> &str {
    let trimmed = document.trim();
    if trimmed.starts_with("<?xml") {
        if let Some(end) = trimmed.find("?>") {
            return trimmed[end + 2..].trim_start();
        }
    }
    trimmed
}
