//! Broadcast beacon messages
//!
//! Beacons are best-effort, self-describing datagrams a unit emits on its own
//! schedule. Each carries the producer identity and a per-producer sequence
//! number so receivers can discard stale or reordered beacons.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::DecodeError;
use crate::entity::Entity;
use crate::error::CoreResult;
use crate::types::Coordinate;

/// Broadcast variant tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastVariant {
    /// Liveness and status
    Heartbeat,
    /// Position and orientation
    Position,
    /// One shared entity location
    SharedEntityLocation,
}

impl fmt::Display for BroadcastVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BroadcastVariant::Heartbeat => "heartbeat",
            BroadcastVariant::Position => "position",
            BroadcastVariant::SharedEntityLocation => "shared_entity_location",
        };
        f.write_str(s)
    }
}

/// Variant-specific state snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum BroadcastPayload {
    /// Liveness beacon
    Heartbeat {
        /// Status line of the unit
        status: String,
        /// Running behavior, if any
        #[serde(default)]
        active_behavior: Option<String>,
        /// Seconds since the unit started
        uptime_secs: f64,
    },
    /// Position beacon
    Position {
        /// Current position
        position: Coordinate,
        /// Current orientation in degrees
        #[serde(default)]
        orientation_deg: Option<f64>,
    },
    /// Shared entity beacon
    SharedEntityLocation {
        /// The shared entity
        entity: Entity,
    },
}

impl BroadcastPayload {
    /// Variant tag of this payload
    pub fn variant(&self) -> BroadcastVariant {
        match self {
            BroadcastPayload::Heartbeat { .. } => BroadcastVariant::Heartbeat,
            BroadcastPayload::Position { .. } => BroadcastVariant::Position,
            BroadcastPayload::SharedEntityLocation { .. } => {
                BroadcastVariant::SharedEntityLocation
            }
        }
    }
}

/// A single beacon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BroadcastMessage {
    /// Producing unit
    pub unit_id: String,
    /// Producer's command address, so receivers can connect back
    #[serde(default)]
    pub address: Option<String>,
    /// Per-producer logical timestamp, strictly increasing
    pub seq: u64,
    /// Variant payload
    pub payload: BroadcastPayload,
}

impl BroadcastMessage {
    /// Serialize into one datagram
    pub fn to_datagram(&self) -> CoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse one datagram
    pub fn from_datagram(datagram: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(datagram).map_err(|e| DecodeError::MalformedFrame(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_datagram_is_tagged() {
        let msg = BroadcastMessage {
            unit_id: "drone-1".into(),
            address: Some("192.168.1.11:10101".into()),
            seq: 7,
            payload: BroadcastPayload::Heartbeat {
                status: "Running".into(),
                active_behavior: None,
                uptime_secs: 12.5,
            },
        };

        let datagram = msg.to_datagram().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&datagram).unwrap();
        assert_eq!(json["payload"]["variant"], "heartbeat");

        let back = BroadcastMessage::from_datagram(&datagram).unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.payload.variant(), BroadcastVariant::Heartbeat);
    }

    #[test]
    fn test_truncated_datagram_is_malformed() {
        assert!(BroadcastMessage::from_datagram(br#"{"unit_id":"x","seq":"#).is_err());
    }
}
