//! Console-side state and action trigger
//!
//! The console runs the same listener and dispatcher as a unit. Remote
//! clients (mobile apps, scripts) connect to it and send commands; the
//! console answers queries about itself and the roster, and forwards actions
//! to the selected units through the [`CommandRelay`].

use std::sync::Arc;
use std::time::{Duration, Instant};
use swarmlink_core::capability::{ActionTrigger, UnitState};
use swarmlink_core::entity::Entity;
use swarmlink_core::envelope::{Command, CommandAction, EntitySet, Envelope, MotorSet};
use swarmlink_core::provider::ProviderChain;
use swarmlink_mesh::{Binding, ConnectionRegistry};
use swarmlink_unit_status::{
    BehaviorProvider, EntitiesProvider, LogProvider, LogSink, SystemStatusProvider,
    UnitInfoProvider,
};
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::command_types::OperatorCommand;
use crate::dispatcher::{CommandRelay, TargetSelection};

/// What the console reports about itself
pub struct ConsoleState {
    console_id: String,
    started: Instant,
    behaviors: Vec<String>,
    relay: Arc<CommandRelay>,
}

impl ConsoleState {
    /// State for console `console_id`, offering `behaviors` to its clients
    pub fn new(console_id: impl Into<String>, behaviors: Vec<String>, relay: Arc<CommandRelay>) -> Self {
        Self {
            console_id: console_id.into(),
            started: Instant::now(),
            behaviors,
            relay,
        }
    }
}

impl UnitState for ConsoleState {
    fn unit_id(&self) -> &str {
        &self.console_id
    }

    fn status(&self) -> String {
        match self.relay.binding().current().and_then(|t| t.name) {
            Some(unit) => format!("Bound to {unit}"),
            None => "Unbound".to_string(),
        }
    }

    fn active_behavior(&self) -> Option<String> {
        None
    }

    fn available_behaviors(&self) -> Vec<String> {
        self.behaviors.clone()
    }

    fn entities(&self) -> Vec<Entity> {
        self.relay.entities().snapshot()
    }

    fn time_since_start(&self) -> Duration {
        self.started.elapsed()
    }
}

/// [`ActionTrigger`] forwarding actions to field units.
///
/// Trigger calls must return quickly, so every relay runs on its own task.
pub struct RelayTrigger {
    relay: Arc<CommandRelay>,
    selection: TargetSelection,
    runtime: Handle,
}

impl RelayTrigger {
    /// Trigger relaying to `selection` on `runtime`
    pub fn new(relay: Arc<CommandRelay>, selection: TargetSelection, runtime: Handle) -> Self {
        Self {
            relay,
            selection,
            runtime,
        }
    }

    fn forward(&self, envelope: Envelope) {
        let relay = Arc::clone(&self.relay);
        let selection = self.selection.clone();
        self.runtime.spawn(async move {
            let kind = envelope.kind();
            match relay.send(&envelope, &selection).await {
                Ok(report) => info!(
                    kind = %kind,
                    status = ?report.status,
                    delivered = report.delivered_count(),
                    "forwarded to units"
                ),
                Err(e) => warn!(kind = %kind, "could not forward: {}", e),
            }
        });
    }

    fn forward_command(&self, command: OperatorCommand) {
        let envelope = command.to_envelope(
            &self.relay.entities().snapshot(),
            self.relay.binding().current().as_ref(),
        );
        self.forward(envelope);
    }
}

impl ActionTrigger for RelayTrigger {
    fn apply_motor_command(&self, motors: &MotorSet) {
        self.forward(Envelope::MotorSet(motors.clone()));
    }

    fn start_behavior(&self, name: &str, args: &str) {
        self.forward_command(OperatorCommand::Start {
            behavior: name.to_string(),
            args: args.to_string(),
        });
    }

    fn stop_behavior(&self, name: &str) {
        self.forward_command(OperatorCommand::Stop {
            behavior: name.to_string(),
        });
    }

    fn stop_all(&self) {
        self.forward(Envelope::Command(Command::new(CommandAction::StopAll)));
    }

    fn replace_entities(&self, update: &EntitySet) {
        let count = self.relay.entities().apply(update.mode, &update.entities);
        info!(mode = ?update.mode, count, "console entities updated");
    }

    fn deploy_entities(&self) {
        self.forward_command(OperatorCommand::DeployEntities);
    }

    fn set_log_stamp(&self, stamp: &str) {
        self.forward_command(OperatorCommand::SetLogStamp {
            stamp: stamp.to_string(),
        });
    }
}

/// Standard chain for the console.
///
/// `info_request` is answered from the roster, everything else from the
/// console's own state.
pub fn console_chain(
    state: Arc<ConsoleState>,
    trigger: Arc<RelayTrigger>,
    registry: Arc<ConnectionRegistry>,
    binding: Binding,
    log: LogSink,
) -> ProviderChain {
    let roster = Arc::clone(state.relay.roster());
    let state: Arc<dyn UnitState> = state;
    ProviderChain::new()
        .with(Arc::new(SystemStatusProvider::new(
            Arc::clone(&state),
            registry,
            binding,
        )))
        .with(Arc::new(UnitInfoProvider::new(roster)))
        .with(Arc::new(EntitiesProvider::new(state)))
        .with(Arc::new(BehaviorProvider::new(trigger)))
        .with(Arc::new(LogProvider::new(log)))
}
