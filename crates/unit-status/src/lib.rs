//! Unit Status - state, responders and roster for SwarmLink processes
//!
//! This crate provides the concrete pieces a unit or console plugs into the
//! messaging core:
//! - [`LocalUnit`]: in-process unit state implementing `UnitState` and
//!   `ActionTrigger`
//! - Query responders for status, unit info, entities, behavior control and
//!   log messages
//! - [`LogSink`]: non-blocking file sink for `log` messages
//! - [`UnitRoster`]: console-side view of units discovered from beacons
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use swarmlink_mesh::{Binding, BoundTarget, ConnectionRegistry};
//! use swarmlink_unit_status::{unit_chain, LocalUnit, LogSink};
//!
//! let unit = Arc::new(LocalUnit::new("drone-1", vec!["Wander".into()]));
//! let chain = unit_chain(
//!     unit,
//!     ConnectionRegistry::new(),
//!     Binding::fixed(BoundTarget::new("drone-1", "192.168.1.11")),
//!     Some("192.168.1.11:10101".into()),
//!     LogSink::tracing_only(),
//! );
//! assert_eq!(chain.len(), 5);
//! ```

#![warn(missing_docs)]

pub mod local_unit;
pub mod log_sink;
pub mod providers;
pub mod roster;

// Re-export commonly used types
pub use local_unit::{LocalUnit, MotorTargets};
pub use log_sink::{LogLine, LogSink, LogSinkError, DEFAULT_SINK_CAPACITY};
pub use providers::{
    unit_chain, BehaviorProvider, EntitiesProvider, LogProvider, SelfDirectory,
    SystemStatusProvider, UnitDirectory, UnitInfoProvider,
};
pub use roster::{UnitRoster, DEFAULT_STALE_AFTER};
