//! In-process unit state
//!
//! [`LocalUnit`] is the state a unit daemon exposes to the messaging core. It
//! holds what the core needs to read (status, behavior, entities, position)
//! and records the effects the core requests. Real drivers read the motor
//! targets from it on every control step.

use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};
use swarmlink_core::capability::{ActionTrigger, UnitState};
use swarmlink_core::entity::{Entity, EntityStore};
use swarmlink_core::envelope::{EntitySet, MotorSet};
use swarmlink_core::types::Coordinate;
use tracing::{debug, info, warn};

use crate::log_sink::LogSink;

/// Effective motor speeds after limits and trim
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotorTargets {
    /// Left motor
    pub left: f64,
    /// Right motor
    pub right: f64,
}

impl MotorTargets {
    /// Speeds for a motor command.
    ///
    /// `offset` trims the pair (added left, subtracted right); `speed_limit`
    /// then caps the magnitude of each side.
    pub fn from_command(motors: &MotorSet) -> Self {
        let offset = motors.offset.unwrap_or(0.0);
        let limit = motors.speed_limit.map(f64::abs).unwrap_or(f64::INFINITY);
        Self {
            left: (motors.left + offset).clamp(-limit, limit),
            right: (motors.right - offset).clamp(-limit, limit),
        }
    }
}

#[derive(Debug, Default)]
struct Condition {
    status: String,
    active_behavior: Option<String>,
    behavior_args: String,
    motors: MotorTargets,
    position: Option<Coordinate>,
    orientation_deg: Option<f64>,
}

/// State of the unit this process runs on
#[derive(Debug)]
pub struct LocalUnit {
    unit_id: String,
    started: Instant,
    behaviors: Vec<String>,
    controllers: Vec<String>,
    condition: RwLock<Condition>,
    entities: EntityStore,
    log: LogSink,
}

impl LocalUnit {
    /// Idle unit offering `behaviors`
    pub fn new(unit_id: impl Into<String>, behaviors: Vec<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            started: Instant::now(),
            behaviors,
            controllers: Vec::new(),
            condition: RwLock::new(Condition {
                status: "Idle".to_string(),
                ..Condition::default()
            }),
            entities: EntityStore::new(),
            log: LogSink::tracing_only(),
        }
    }

    /// Advertise motor `controllers` in status answers
    pub fn with_controllers(mut self, controllers: Vec<String>) -> Self {
        self.controllers = controllers;
        self
    }

    /// Route log stamps to `sink`
    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.log = sink;
        self
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Condition> {
        self.condition.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Condition> {
        self.condition.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current motor targets
    pub fn motors(&self) -> MotorTargets {
        self.read().motors
    }

    /// Arguments of the running behavior
    pub fn behavior_args(&self) -> String {
        self.read().behavior_args.clone()
    }

    /// Update position and orientation (from GPS/compass or simulation)
    pub fn set_position(&self, position: Coordinate, orientation_deg: Option<f64>) {
        let mut condition = self.write();
        condition.position = Some(position);
        condition.orientation_deg = orientation_deg;
    }

    /// Replace the status line
    pub fn set_status(&self, status: impl Into<String>) {
        self.write().status = status.into();
    }

    /// Entity set of this unit
    pub fn entity_store(&self) -> &EntityStore {
        &self.entities
    }

    /// Log sink used by this unit
    pub fn log_sink(&self) -> &LogSink {
        &self.log
    }
}

impl UnitState for LocalUnit {
    fn unit_id(&self) -> &str {
        &self.unit_id
    }

    fn status(&self) -> String {
        self.read().status.clone()
    }

    fn active_behavior(&self) -> Option<String> {
        self.read().active_behavior.clone()
    }

    fn available_behaviors(&self) -> Vec<String> {
        self.behaviors.clone()
    }

    fn available_controllers(&self) -> Vec<String> {
        self.controllers.clone()
    }

    fn entities(&self) -> Vec<Entity> {
        self.entities.snapshot()
    }

    fn time_since_start(&self) -> Duration {
        self.started.elapsed()
    }

    fn position(&self) -> Option<Coordinate> {
        self.read().position
    }

    fn orientation_deg(&self) -> Option<f64> {
        self.read().orientation_deg
    }
}

impl ActionTrigger for LocalUnit {
    fn apply_motor_command(&self, motors: &MotorSet) {
        let targets = MotorTargets::from_command(motors);
        debug!(left = targets.left, right = targets.right, "motor targets updated");
        self.write().motors = targets;
    }

    fn start_behavior(&self, name: &str, args: &str) {
        if !self.behaviors.is_empty() && !self.behaviors.iter().any(|b| b == name) {
            warn!(behavior = name, "unknown behavior, not started");
            return;
        }
        let mut condition = self.write();
        condition.active_behavior = Some(name.to_string());
        condition.behavior_args = args.to_string();
        condition.status = format!("Running {name}");
        info!(behavior = name, args, "behavior started");
    }

    fn stop_behavior(&self, name: &str) {
        let mut condition = self.write();
        if condition.active_behavior.as_deref() != Some(name) {
            debug!(behavior = name, "stop requested for inactive behavior");
            return;
        }
        condition.active_behavior = None;
        condition.behavior_args.clear();
        condition.status = "Idle".to_string();
        info!(behavior = name, "behavior stopped");
    }

    fn stop_all(&self) {
        let mut condition = self.write();
        condition.active_behavior = None;
        condition.behavior_args.clear();
        condition.motors = MotorTargets::default();
        condition.status = "Idle".to_string();
        info!("all behaviors stopped, motors zeroed");
    }

    fn replace_entities(&self, update: &EntitySet) {
        let count = self.entities.apply(update.mode, &update.entities);
        info!(mode = ?update.mode, count, "entities updated");
    }

    fn set_log_stamp(&self, stamp: &str) {
        self.log.set_stamp(stamp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmlink_core::entity::{EntityKind, EntitySetMode};

    fn unit() -> LocalUnit {
        LocalUnit::new("drone-1", vec!["Wander".into(), "GoTo".into()])
    }

    #[test]
    fn test_speed_limit_and_offset() {
        let targets = MotorTargets::from_command(&MotorSet {
            left: 0.9,
            right: 0.2,
            speed_limit: Some(0.5),
            offset: Some(0.1),
            ..MotorSet::default()
        });
        assert_eq!(targets.left, 0.5);
        assert!((targets.right - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_behavior_lifecycle() {
        let unit = unit();
        unit.start_behavior("Wander", "speed=1");
        assert_eq!(unit.active_behavior().as_deref(), Some("Wander"));
        assert_eq!(unit.behavior_args(), "speed=1");

        unit.stop_behavior("GoTo");
        assert_eq!(unit.active_behavior().as_deref(), Some("Wander"));

        unit.stop_behavior("Wander");
        assert!(unit.active_behavior().is_none());
        assert_eq!(unit.status(), "Idle");
    }

    #[test]
    fn test_unknown_behavior_is_refused() {
        let unit = unit();
        unit.start_behavior("Dance", "");
        assert!(unit.active_behavior().is_none());
    }

    #[test]
    fn test_stop_all_zeroes_motors() {
        let unit = unit();
        unit.apply_motor_command(&MotorSet {
            left: 0.3,
            right: 0.3,
            ..MotorSet::default()
        });
        unit.start_behavior("GoTo", "");
        unit.stop_all();
        assert_eq!(unit.motors(), MotorTargets::default());
        assert!(unit.active_behavior().is_none());
    }

    #[test]
    fn test_entities_and_stamp() {
        let unit = unit();
        unit.replace_entities(&EntitySet {
            mode: EntitySetMode::Replace,
            entities: vec![Entity::new(
                "wp1",
                EntityKind::Waypoint {
                    position: Coordinate::new(1.0, 1.0),
                },
                0,
            )],
        });
        assert_eq!(unit.entities().len(), 1);

        unit.set_log_stamp("RUN3");
        assert_eq!(unit.log_sink().stamp().as_deref(), Some("RUN3"));
    }
}
