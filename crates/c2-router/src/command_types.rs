//! Operator command definitions
//!
//! Commands typed at the console prompt (or sent by remote clients) and their
//! translation into wire envelopes. Queries are answered by the target unit;
//! everything else is fire-and-forget.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use swarmlink_core::entity::{Entity, EntitySetMode};
use swarmlink_core::envelope::{
    BehaviorControl, Command, CommandAction, EntitiesRequest, EntitySet, Envelope, InfoRequest,
    LogMessage, MotorSet, StatusRequest,
};
use swarmlink_mesh::BoundTarget;

use crate::error::RelayError;

/// Operator command enumeration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum OperatorCommand {
    /// Start a behavior on the targets
    Start {
        /// Behavior name
        behavior: String,
        /// Behavior arguments, passed through untouched
        #[serde(default)]
        args: String,
    },
    /// Stop a behavior on the targets
    Stop {
        /// Behavior name
        behavior: String,
    },
    /// Stop everything and zero the motors
    StopAll,
    /// Deploy a behavior with its arguments
    Deploy {
        /// Behavior name
        behavior: String,
        /// Behavior arguments
        #[serde(default)]
        args: String,
    },
    /// Push the console's entity set to the targets
    DeployEntities,
    /// Write a line to the targets' logs
    Log {
        /// Text to log
        message: String,
    },
    /// Set the stamp attached to subsequent log lines
    SetLogStamp {
        /// New stamp
        stamp: String,
    },
    /// Drive the bound unit's motors
    Motors {
        /// Left motor speed
        left: f64,
        /// Right motor speed
        right: f64,
        /// Speed cap
        #[serde(default)]
        speed_limit: Option<f64>,
        /// Trim offset
        #[serde(default)]
        offset: Option<f64>,
    },
    /// Ask for the unit status
    Status,
    /// Ask for the unit's entity set
    Entities,
    /// Ask for unit information
    Info {
        /// Units of interest; empty means all
        #[serde(default)]
        unit_ids: Vec<String>,
    },
}

impl OperatorCommand {
    /// Whether the target is expected to answer
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            OperatorCommand::Status | OperatorCommand::Entities | OperatorCommand::Info { .. }
        )
    }

    /// Build the wire envelope.
    ///
    /// `entities` is the console's own set, used by `deploy-entities`.
    /// `target` is the bound unit, stamped on motor commands so only that
    /// unit applies them.
    pub fn to_envelope(&self, entities: &[Entity], target: Option<&BoundTarget>) -> Envelope {
        match self {
            OperatorCommand::Start { behavior, args } => Envelope::BehaviorControl(BehaviorControl {
                behavior: behavior.clone(),
                args: args.clone(),
                start: true,
            }),
            OperatorCommand::Stop { behavior } => Envelope::BehaviorControl(BehaviorControl {
                behavior: behavior.clone(),
                args: String::new(),
                start: false,
            }),
            OperatorCommand::StopAll => Envelope::Command(Command::new(CommandAction::StopAll)),
            OperatorCommand::Deploy { behavior, args } => Envelope::Command(Command::with_args(
                CommandAction::Deploy,
                vec![behavior.clone(), args.clone()],
            )),
            OperatorCommand::DeployEntities => Envelope::EntitySet(EntitySet {
                mode: EntitySetMode::Replace,
                entities: entities.to_vec(),
            }),
            OperatorCommand::Log { message } => Envelope::Log(LogMessage {
                message: message.clone(),
                stamp: None,
            }),
            OperatorCommand::SetLogStamp { stamp } => Envelope::Command(Command::with_args(
                CommandAction::SetLogStamp,
                vec![stamp.clone()],
            )),
            OperatorCommand::Motors {
                left,
                right,
                speed_limit,
                offset,
            } => Envelope::MotorSet(MotorSet {
                left: *left,
                right: *right,
                speed_limit: *speed_limit,
                offset: *offset,
                target_address: target.and_then(|t| t.address.clone()),
                target_name: target.and_then(|t| t.name.clone()),
            }),
            OperatorCommand::Status => Envelope::StatusRequest(StatusRequest {}),
            OperatorCommand::Entities => Envelope::EntitiesRequest(EntitiesRequest {}),
            OperatorCommand::Info { unit_ids } => Envelope::InfoRequest(InfoRequest {
                unit_ids: unit_ids.clone(),
            }),
        }
    }
}

impl fmt::Display for OperatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperatorCommand::Start { .. } => "start",
            OperatorCommand::Stop { .. } => "stop",
            OperatorCommand::StopAll => "stop-all",
            OperatorCommand::Deploy { .. } => "deploy",
            OperatorCommand::DeployEntities => "deploy-entities",
            OperatorCommand::Log { .. } => "log",
            OperatorCommand::SetLogStamp { .. } => "stamp",
            OperatorCommand::Motors { .. } => "motors",
            OperatorCommand::Status => "status",
            OperatorCommand::Entities => "entities",
            OperatorCommand::Info { .. } => "info",
        };
        f.write_str(name)
    }
}

fn number(word: Option<&str>, field: &str) -> Result<f64, RelayError> {
    let word = word.ok_or_else(|| RelayError::Parse(format!("missing {field}")))?;
    word.parse()
        .map_err(|_| RelayError::Parse(format!("{field} is not a number: {word}")))
}

fn optional_number(word: Option<&str>, field: &str) -> Result<Option<f64>, RelayError> {
    word.map(|w| number(Some(w), field)).transpose()
}

impl FromStr for OperatorCommand {
    type Err = RelayError;

    /// Parse one prompt line, e.g. `start Wander radius=5` or `motors 0.4 0.4 0.5`
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        let mut words = rest.split_whitespace();
        let behavior = |rest: &str| -> Result<(String, String), RelayError> {
            let (name, args) = match rest.split_once(char::is_whitespace) {
                Some((name, args)) => (name, args.trim()),
                None => (rest, ""),
            };
            if name.is_empty() {
                return Err(RelayError::Parse(format!("{verb} needs a behavior name")));
            }
            Ok((name.to_string(), args.to_string()))
        };

        match verb {
            "start" => {
                let (behavior, args) = behavior(rest)?;
                Ok(OperatorCommand::Start { behavior, args })
            }
            "stop" => {
                let (behavior, _) = behavior(rest)?;
                Ok(OperatorCommand::Stop { behavior })
            }
            "stop-all" => Ok(OperatorCommand::StopAll),
            "deploy" => {
                let (behavior, args) = behavior(rest)?;
                Ok(OperatorCommand::Deploy { behavior, args })
            }
            "deploy-entities" => Ok(OperatorCommand::DeployEntities),
            "log" if !rest.is_empty() => Ok(OperatorCommand::Log {
                message: rest.to_string(),
            }),
            "log" => Err(RelayError::Parse("log needs a message".into())),
            "stamp" => match words.next() {
                Some(stamp) => Ok(OperatorCommand::SetLogStamp {
                    stamp: stamp.to_string(),
                }),
                None => Err(RelayError::Parse("stamp needs a value".into())),
            },
            "motors" => Ok(OperatorCommand::Motors {
                left: number(words.next(), "left")?,
                right: number(words.next(), "right")?,
                speed_limit: optional_number(words.next(), "speed_limit")?,
                offset: optional_number(words.next(), "offset")?,
            }),
            "status" => Ok(OperatorCommand::Status),
            "entities" => Ok(OperatorCommand::Entities),
            "info" => Ok(OperatorCommand::Info {
                unit_ids: words.map(str::to_string).collect(),
            }),
            "" => Err(RelayError::Parse("empty command".into())),
            other => Err(RelayError::Parse(format!("unknown command: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmlink_core::entity::EntityKind;
    use swarmlink_core::types::Coordinate;

    #[test]
    fn test_parse_behavior_commands() {
        assert_eq!(
            "start Wander radius=5 speed=1".parse::<OperatorCommand>().unwrap(),
            OperatorCommand::Start {
                behavior: "Wander".into(),
                args: "radius=5 speed=1".into(),
            }
        );
        assert_eq!(
            "  stop   Wander ".parse::<OperatorCommand>().unwrap(),
            OperatorCommand::Stop {
                behavior: "Wander".into()
            }
        );
        assert_eq!(
            "stop-all".parse::<OperatorCommand>().unwrap(),
            OperatorCommand::StopAll
        );
        assert!("start".parse::<OperatorCommand>().is_err());
    }

    #[test]
    fn test_parse_motors() {
        assert_eq!(
            "motors 0.4 -0.4 0.5".parse::<OperatorCommand>().unwrap(),
            OperatorCommand::Motors {
                left: 0.4,
                right: -0.4,
                speed_limit: Some(0.5),
                offset: None,
            }
        );
        assert!(matches!(
            "motors fast 1".parse::<OperatorCommand>(),
            Err(RelayError::Parse(_))
        ));
        assert!("motors 1".parse::<OperatorCommand>().is_err());
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(matches!(
            "fly away".parse::<OperatorCommand>(),
            Err(RelayError::Parse(_))
        ));
        assert!("".parse::<OperatorCommand>().is_err());
        assert!("log".parse::<OperatorCommand>().is_err());
    }

    #[test]
    fn test_json_form_for_remote_clients() {
        let command: OperatorCommand =
            serde_json::from_str(r#"{"command":"motors","left":0.1,"right":0.2}"#).unwrap();
        assert_eq!(
            command,
            OperatorCommand::Motors {
                left: 0.1,
                right: 0.2,
                speed_limit: None,
                offset: None,
            }
        );
        let json = serde_json::to_value(OperatorCommand::StopAll).unwrap();
        assert_eq!(json, serde_json::json!({"command": "stop_all"}));
    }

    #[test]
    fn test_motors_are_addressed_to_the_bound_unit() {
        let target = BoundTarget::new("drone-2", "192.168.1.12");
        let envelope = "motors 0.2 0.3"
            .parse::<OperatorCommand>()
            .unwrap()
            .to_envelope(&[], Some(&target));
        match envelope {
            Envelope::MotorSet(motors) => {
                assert_eq!(motors.target_name.as_deref(), Some("drone-2"));
                assert_eq!(motors.target_address.as_deref(), Some("192.168.1.12"));
            }
            other => panic!("unexpected envelope {other:?}"),
        }
    }

    #[test]
    fn test_envelope_mapping() {
        let wp = Entity::new(
            "wp1",
            EntityKind::Waypoint {
                position: Coordinate::new(1.0, 2.0),
            },
            0,
        );
        assert_eq!(
            OperatorCommand::DeployEntities.to_envelope(&[wp.clone()], None),
            Envelope::EntitySet(EntitySet {
                mode: EntitySetMode::Replace,
                entities: vec![wp],
            })
        );
        assert_eq!(
            OperatorCommand::Deploy {
                behavior: "GoTo".into(),
                args: "wp1".into()
            }
            .to_envelope(&[], None),
            Envelope::Command(Command::with_args(
                CommandAction::Deploy,
                vec!["GoTo".into(), "wp1".into()]
            ))
        );
        assert_eq!(
            OperatorCommand::SetLogStamp { stamp: "RUN1".into() }.to_envelope(&[], None),
            Envelope::Command(Command::with_args(CommandAction::SetLogStamp, vec!["RUN1".into()]))
        );
        assert!(OperatorCommand::Status.is_query());
        assert!(!OperatorCommand::StopAll.is_query());
    }
}
