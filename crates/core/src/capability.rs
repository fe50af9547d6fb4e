//! Capability contracts consumed from collaborators
//!
//! The messaging core never touches motors, sensors or behaviors directly.
//! It reads unit state through [`UnitState`] and requests effects through
//! [`ActionTrigger`]; hardware drivers, simulators and the console each
//! provide their own implementation.

use std::time::Duration;

use crate::entity::Entity;
use crate::envelope::{EntitySet, MotorSet};
use crate::types::Coordinate;

/// Read access to the live state of a unit (or console)
pub trait UnitState: Send + Sync {
    /// Identifier announced to peers
    fn unit_id(&self) -> &str;

    /// Free-form status line
    fn status(&self) -> String;

    /// Name of the running behavior
    fn active_behavior(&self) -> Option<String>;

    /// Behaviors that can be started on this unit
    fn available_behaviors(&self) -> Vec<String> {
        Vec::new()
    }

    /// Motor controllers that can be selected on this unit
    fn available_controllers(&self) -> Vec<String> {
        Vec::new()
    }

    /// Consistent copy of the entity set
    fn entities(&self) -> Vec<Entity>;

    /// Time since the unit started
    fn time_since_start(&self) -> Duration;

    /// Current position, when the unit knows it
    fn position(&self) -> Option<Coordinate> {
        None
    }

    /// Current orientation in degrees, when the unit knows it
    fn orientation_deg(&self) -> Option<f64> {
        None
    }
}

/// Effects the messaging core can request.
///
/// Implementations must return quickly; anything slow is handed off to a
/// background task.
pub trait ActionTrigger: Send + Sync {
    /// Apply a motor command already checked against the binding
    fn apply_motor_command(&self, motors: &MotorSet);

    /// Start a behavior with its arguments
    fn start_behavior(&self, name: &str, args: &str);

    /// Stop one behavior
    fn stop_behavior(&self, name: &str);

    /// Stop everything and zero the motors
    fn stop_all(&self);

    /// Apply an entity set update
    fn replace_entities(&self, update: &EntitySet);

    /// Push the local entity set to the current targets
    fn deploy_entities(&self) {}

    /// Set the stamp attached to subsequent log lines
    fn set_log_stamp(&self, _stamp: &str) {}
}
