//! SwarmLink Mesh - console/field-unit messaging layer
//!
//! Connection handling, request dispatch, outbound command delivery and
//! periodic beacons for a control console and its field units.
//!
//! # Core Components
//!
//! - **ConnectionListener / ConnectionRegistry**: accept loop and the single
//!   owner of every live connection
//! - **ConnectionHandler**: per-socket worker (handshake, framed envelopes,
//!   queued broadcasts)
//! - **Dispatcher**: closed route table from message kind to provider chain,
//!   action trigger or event bus
//! - **CommandSender**: concurrent fire-and-forget delivery to many targets
//! - **BroadcastHandler**: tick-driven heartbeat, position and shared entity
//!   beacons
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use swarmlink_mesh::{
//!     Binding, ConnectionListener, ConnectionRegistry, ConnectionSettings, Dispatcher,
//!     EventBus,
//! };
//! # use swarmlink_core::{ActionTrigger, EntitySet, MotorSet, ProviderChain};
//! # struct Noop;
//! # impl ActionTrigger for Noop {
//! #     fn apply_motor_command(&self, _: &MotorSet) {}
//! #     fn start_behavior(&self, _: &str, _: &str) {}
//! #     fn stop_behavior(&self, _: &str) {}
//! #     fn stop_all(&self) {}
//! #     fn replace_entities(&self, _: &EntitySet) {}
//! # }
//!
//! # async fn run() -> swarmlink_mesh::MeshResult<()> {
//! let dispatcher = Arc::new(Dispatcher::new(
//!     ProviderChain::new(),
//!     Arc::new(Noop),
//!     Binding::unbound(),
//!     EventBus::default(),
//! ));
//! let listener = ConnectionListener::bind(
//!     "0.0.0.0:10101".parse().unwrap(),
//!     ConnectionRegistry::new(),
//!     dispatcher,
//!     ConnectionSettings::default(),
//! )
//! .await?;
//! listener.run().await
//! # }
//! ```

#![warn(missing_docs)]

pub mod binding;
pub mod broadcast;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod handler;
pub mod listener;
pub mod registry;
pub mod sender;

// Re-export main types
pub use binding::{Binding, BoundTarget};
pub use broadcast::{
    BeaconReceiver, BeaconSink, BroadcastHandler, BroadcastThrottle, BroadcastTransport,
    SimulatedChannel, UdpBroadcastTransport,
};
pub use dispatch::{route, Dispatcher, PeerContext, Route};
pub use endpoint::LocalEndpoint;
pub use error::{MeshError, MeshResult};
pub use events::{EventBus, LinkEvent};
pub use handler::{ConnectionHandler, ConnectionSettings};
pub use listener::ConnectionListener;
pub use registry::{
    BroadcastSummary, ConnectionHandle, ConnectionId, ConnectionRegistry, ConnectionState,
    PeerSummary,
};
pub use sender::{CommandSender, DeliveryStatus, SendReport, TargetOutcome, TargetResult};
