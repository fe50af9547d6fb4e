//! Wire envelope and message payloads
//!
//! Every frame after the handshake carries one [`Envelope`]: a `type` tag
//! drawn from the closed [`MessageKind`] set and a `payload` whose schema is
//! fully determined by that tag.
//!
//! ```json
//! {"type":"motor_set","payload":{"left":0.4,"right":0.4,"target_name":"drone-3"}}
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::entity::{Entity, EntitySetMode};
use crate::types::Coordinate;

/// Message kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Query for unit information
    InfoRequest,
    /// Unit information
    InfoResponse,
    /// Query for the receiver's status
    StatusRequest,
    /// Receiver status
    StatusResponse,
    /// Motor actuation addressed to one unit
    MotorSet,
    /// Operator command
    Command,
    /// Entity set update
    EntitySet,
    /// Query for the receiver's entity set
    EntitiesRequest,
    /// Entity set contents
    EntitiesResponse,
    /// Log line to persist on the receiver
    Log,
    /// Start or stop a behavior
    BehaviorControl,
    /// Acknowledgment of a processed message
    Ack,
    /// Request that could not be served
    Rejected,
}

impl MessageKind {
    /// Every kind, in tag order
    pub const ALL: [MessageKind; 13] = [
        MessageKind::InfoRequest,
        MessageKind::InfoResponse,
        MessageKind::StatusRequest,
        MessageKind::StatusResponse,
        MessageKind::MotorSet,
        MessageKind::Command,
        MessageKind::EntitySet,
        MessageKind::EntitiesRequest,
        MessageKind::EntitiesResponse,
        MessageKind::Log,
        MessageKind::BehaviorControl,
        MessageKind::Ack,
        MessageKind::Rejected,
    ];

    /// Wire tag
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::InfoRequest => "info_request",
            MessageKind::InfoResponse => "info_response",
            MessageKind::StatusRequest => "status_request",
            MessageKind::StatusResponse => "status_response",
            MessageKind::MotorSet => "motor_set",
            MessageKind::Command => "command",
            MessageKind::EntitySet => "entity_set",
            MessageKind::EntitiesRequest => "entities_request",
            MessageKind::EntitiesResponse => "entities_response",
            MessageKind::Log => "log",
            MessageKind::BehaviorControl => "behavior_control",
            MessageKind::Ack => "ack",
            MessageKind::Rejected => "rejected",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown message tag
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown message kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for MessageKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Request for information about one or more units.
///
/// An empty `unit_ids` list asks for every unit the receiver knows.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InfoRequest {
    /// Unit identifiers of interest
    #[serde(default)]
    pub unit_ids: Vec<String>,
}

/// Snapshot of one unit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitInfo {
    /// Unit identifier
    pub unit_id: String,
    /// Network address
    #[serde(default)]
    pub address: Option<String>,
    /// Free-form status line
    #[serde(default)]
    pub status: String,
    /// Name of the running behavior
    #[serde(default)]
    pub active_behavior: Option<String>,
    /// Last known position
    #[serde(default)]
    pub position: Option<Coordinate>,
    /// Last known orientation in degrees
    #[serde(default)]
    pub orientation_deg: Option<f64>,
    /// When the unit was last heard from (Unix epoch milliseconds)
    #[serde(default)]
    pub last_seen_ms: Option<u64>,
}

/// Unit information answer
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InfoResponse {
    /// Matching units
    pub units: Vec<UnitInfo>,
}

/// Status query
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatusRequest {}

/// Status of the answering process
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusReport {
    /// Identifier of the answering unit or console
    pub unit_id: String,
    /// Free-form status line
    pub status: String,
    /// Name of the running behavior
    #[serde(default)]
    pub active_behavior: Option<String>,
    /// Behaviors that can be started
    #[serde(default)]
    pub available_behaviors: Vec<String>,
    /// Motor controllers that can be selected
    #[serde(default)]
    pub available_controllers: Vec<String>,
    /// Live inbound connections
    #[serde(default)]
    pub connected_clients: usize,
    /// Address or name of the unit this process is bound to
    #[serde(default)]
    pub connected_to: Option<String>,
    /// Seconds since the process started
    #[serde(default)]
    pub uptime_secs: f64,
}

/// Motor actuation for one specific unit
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MotorSet {
    /// Left motor speed
    pub left: f64,
    /// Right motor speed
    pub right: f64,
    /// Maximum speed allowed while the command is active
    #[serde(default)]
    pub speed_limit: Option<f64>,
    /// Trim offset between the two motors
    #[serde(default)]
    pub offset: Option<f64>,
    /// Address of the intended unit
    #[serde(default)]
    pub target_address: Option<String>,
    /// Name of the intended unit
    #[serde(default)]
    pub target_name: Option<String>,
}

/// Operator command actions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandAction {
    /// Start a behavior; `args[0]` is the behavior name, `args[1]` its arguments
    Start,
    /// Stop a behavior; `args[0]` is the behavior name
    Stop,
    /// Stop everything and zero the motors
    StopAll,
    /// Deploy the currently selected behavior
    Deploy,
    /// Push the local entity set to the targets
    DeployEntities,
    /// Set the log stamp; `args[0]` is the stamp
    SetLogStamp,
}

impl fmt::Display for CommandAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandAction::Start => "start",
            CommandAction::Stop => "stop",
            CommandAction::StopAll => "stop_all",
            CommandAction::Deploy => "deploy",
            CommandAction::DeployEntities => "deploy_entities",
            CommandAction::SetLogStamp => "set_log_stamp",
        };
        f.write_str(s)
    }
}

/// Operator command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Command {
    /// Requested action
    pub action: CommandAction,
    /// Positional arguments
    #[serde(default)]
    pub args: Vec<String>,
}

impl Command {
    /// Command without arguments
    pub fn new(action: CommandAction) -> Self {
        Self {
            action,
            args: Vec::new(),
        }
    }

    /// Command with positional arguments
    pub fn with_args(action: CommandAction, args: Vec<String>) -> Self {
        Self { action, args }
    }

    /// Positional argument, if present
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

/// Entity set update
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EntitySet {
    /// How to apply `entities`
    #[serde(default)]
    pub mode: EntitySetMode,
    /// Entities to apply
    pub entities: Vec<Entity>,
}

/// Entity set query
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EntitiesRequest {}

/// Entity set contents
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EntitiesResponse {
    /// Current entity set of the answering unit
    pub entities: Vec<Entity>,
}

/// Log line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogMessage {
    /// Text to log
    pub message: String,
    /// Optional stamp grouping related log lines
    #[serde(default)]
    pub stamp: Option<String>,
}

/// Behavior start/stop request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BehaviorControl {
    /// Behavior name
    pub behavior: String,
    /// Behavior arguments, in the behavior's own syntax
    #[serde(default)]
    pub args: String,
    /// `true` to start, `false` to stop
    pub start: bool,
}

/// Acknowledgment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ack {
    /// Kind of the acknowledged message
    pub kind: MessageKind,
}

/// Rejection of a request nobody could answer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rejection {
    /// Kind of the rejected message
    #[serde(default)]
    pub kind: Option<MessageKind>,
    /// Human-readable reason
    pub reason: String,
}

/// Typed wire message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Envelope {
    /// See [`InfoRequest`]
    InfoRequest(InfoRequest),
    /// See [`InfoResponse`]
    InfoResponse(InfoResponse),
    /// See [`StatusRequest`]
    StatusRequest(StatusRequest),
    /// See [`StatusReport`]
    StatusResponse(StatusReport),
    /// See [`MotorSet`]
    MotorSet(MotorSet),
    /// See [`Command`]
    Command(Command),
    /// See [`EntitySet`]
    EntitySet(EntitySet),
    /// See [`EntitiesRequest`]
    EntitiesRequest(EntitiesRequest),
    /// See [`EntitiesResponse`]
    EntitiesResponse(EntitiesResponse),
    /// See [`LogMessage`]
    Log(LogMessage),
    /// See [`BehaviorControl`]
    BehaviorControl(BehaviorControl),
    /// See [`Ack`]
    Ack(Ack),
    /// See [`Rejection`]
    Rejected(Rejection),
}

impl Envelope {
    /// Tag of this envelope
    pub fn kind(&self) -> MessageKind {
        match self {
            Envelope::InfoRequest(_) => MessageKind::InfoRequest,
            Envelope::InfoResponse(_) => MessageKind::InfoResponse,
            Envelope::StatusRequest(_) => MessageKind::StatusRequest,
            Envelope::StatusResponse(_) => MessageKind::StatusResponse,
            Envelope::MotorSet(_) => MessageKind::MotorSet,
            Envelope::Command(_) => MessageKind::Command,
            Envelope::EntitySet(_) => MessageKind::EntitySet,
            Envelope::EntitiesRequest(_) => MessageKind::EntitiesRequest,
            Envelope::EntitiesResponse(_) => MessageKind::EntitiesResponse,
            Envelope::Log(_) => MessageKind::Log,
            Envelope::BehaviorControl(_) => MessageKind::BehaviorControl,
            Envelope::Ack(_) => MessageKind::Ack,
            Envelope::Rejected(_) => MessageKind::Rejected,
        }
    }

    /// Acknowledgment for a message of `kind`
    pub fn ack(kind: MessageKind) -> Self {
        Envelope::Ack(Ack { kind })
    }

    /// Rejection with a reason
    pub fn rejected(kind: Option<MessageKind>, reason: impl Into<String>) -> Self {
        Envelope::Rejected(Rejection {
            kind,
            reason: reason.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_round_trip_through_from_str() {
        for kind in MessageKind::ALL {
            assert_eq!(kind.as_str().parse::<MessageKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_kind_tag_matches_serde_tag() {
        let env = Envelope::StatusRequest(StatusRequest {});
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], env.kind().as_str());
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let err = "teleport".parse::<MessageKind>().unwrap_err();
        assert_eq!(err, UnknownKind("teleport".to_string()));
    }

    #[test]
    fn test_motor_set_accepts_missing_optional_fields() {
        let json = r#"{"type":"motor_set","payload":{"left":0.5,"right":-0.5}}"#;
        let env: Envelope = serde_json::from_str(json).unwrap();
        match env {
            Envelope::MotorSet(m) => {
                assert_eq!(m.left, 0.5);
                assert!(m.target_name.is_none());
            }
            other => panic!("unexpected envelope {other:?}"),
        }
    }
}
