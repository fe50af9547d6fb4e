//! C2 Router - operator command routing for the SwarmLink console
//!
//! This crate provides the console side of the command path:
//! - Operator command definitions and their line syntax
//! - Target selection against the unit roster and the console binding
//! - Command relay through the mesh `CommandSender`, with replies for queries
//! - A console `ActionTrigger` forwarding commands from remote clients
//!
//! # Architecture
//!
//! Commands flow through the following pipeline:
//! 1. Command typed at the prompt, or received from a remote client
//! 2. Parsed into an [`OperatorCommand`]
//! 3. Targets resolved by [`CommandRelay::resolve`]
//! 4. Envelope delivered by the `CommandSender`, one task per target
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use swarmlink_c2_router::{CommandRelay, OperatorCommand, TargetSelection};
//! use swarmlink_core::entity::EntityStore;
//! use swarmlink_mesh::{Binding, CommandSender};
//! use swarmlink_unit_status::{UnitRoster, DEFAULT_STALE_AFTER};
//!
//! # async fn run() -> Result<(), swarmlink_c2_router::RelayError> {
//! let relay = CommandRelay::new(
//!     CommandSender::new("console", Duration::from_secs(2)),
//!     Arc::new(UnitRoster::new(DEFAULT_STALE_AFTER, 10101)),
//!     Binding::unbound(),
//!     Arc::new(EntityStore::new()),
//! );
//! relay.select("drone-1")?;
//! let command: OperatorCommand = "start Wander radius=5".parse()?;
//! let report = relay.relay(&command, &TargetSelection::Bound).await?;
//! println!("{:?}", report.status);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod command_types;
pub mod console;
pub mod dispatcher;
pub mod error;

// Re-export commonly used types
pub use command_types::OperatorCommand;
pub use console::{console_chain, ConsoleState, RelayTrigger};
pub use dispatcher::{CommandRelay, TargetSelection};
pub use error::RelayError;
