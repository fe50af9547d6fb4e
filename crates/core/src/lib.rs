//! Core functionality for the SwarmLink messaging system.
//!
//! This crate provides the wire types, codec, provider chain and capability
//! traits shared by field units and the control console.

pub mod broadcast;
pub mod capability;
pub mod codec;
pub mod config;
pub mod entity;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod provider;
pub mod types;

pub use broadcast::{BroadcastMessage, BroadcastPayload, BroadcastVariant};
pub use capability::{ActionTrigger, UnitState};
pub use codec::{DecodeError, DEFAULT_MAX_FRAME_LEN};
pub use config::{Config, ConfigError, NodeRole};
pub use entity::{Affiliation, Entity, EntityKind, EntitySetMode, EntityStore};
pub use envelope::{
    Ack, BehaviorControl, Command, CommandAction, EntitiesRequest, EntitiesResponse, EntitySet,
    Envelope, InfoRequest, InfoResponse, LogMessage, MessageKind, MotorSet, Rejection,
    StatusReport, StatusRequest, UnitInfo, UnknownKind,
};
pub use error::{CoreError, CoreResult};
pub use provider::{MessageProvider, ProviderChain};
pub use types::{now_ms, Coordinate};
