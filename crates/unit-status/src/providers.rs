//! Query responders
//!
//! Concrete [`MessageProvider`]s for the request kinds a unit or console
//! answers. Each one handles exactly one kind and ignores the rest, so their
//! order in the chain only matters if an application adds overlapping
//! providers of its own.

use std::sync::Arc;
use swarmlink_core::capability::{ActionTrigger, UnitState};
use swarmlink_core::envelope::{
    EntitiesResponse, Envelope, InfoResponse, MessageKind, StatusReport, UnitInfo,
};
use swarmlink_core::provider::{MessageProvider, ProviderChain};
use swarmlink_core::types::now_ms;
use swarmlink_mesh::{Binding, ConnectionRegistry};

use crate::log_sink::LogSink;

/// Source of unit snapshots for `info_request`
pub trait UnitDirectory: Send + Sync {
    /// Every known unit
    fn units(&self) -> Vec<UnitInfo>;
}

/// Directory holding only the local unit
pub struct SelfDirectory {
    state: Arc<dyn UnitState>,
    address: Option<String>,
}

impl SelfDirectory {
    /// Directory for `state`, announced at `address`
    pub fn new(state: Arc<dyn UnitState>, address: Option<String>) -> Self {
        Self { state, address }
    }
}

impl UnitDirectory for SelfDirectory {
    fn units(&self) -> Vec<UnitInfo> {
        vec![UnitInfo {
            unit_id: self.state.unit_id().to_string(),
            address: self.address.clone(),
            status: self.state.status(),
            active_behavior: self.state.active_behavior(),
            position: self.state.position(),
            orientation_deg: self.state.orientation_deg(),
            last_seen_ms: Some(now_ms()),
        }]
    }
}

/// Answers `status_request`
pub struct SystemStatusProvider {
    state: Arc<dyn UnitState>,
    registry: Arc<ConnectionRegistry>,
    binding: Binding,
}

impl SystemStatusProvider {
    /// Provider reporting `state`, the connection count and the binding
    pub fn new(state: Arc<dyn UnitState>, registry: Arc<ConnectionRegistry>, binding: Binding) -> Self {
        Self {
            state,
            registry,
            binding,
        }
    }
}

impl MessageProvider for SystemStatusProvider {
    fn name(&self) -> &str {
        "system_status"
    }

    fn try_answer(&self, request: &Envelope) -> Option<Envelope> {
        let Envelope::StatusRequest(_) = request else {
            return None;
        };
        Some(Envelope::StatusResponse(StatusReport {
            unit_id: self.state.unit_id().to_string(),
            status: self.state.status(),
            active_behavior: self.state.active_behavior(),
            available_behaviors: self.state.available_behaviors(),
            available_controllers: self.state.available_controllers(),
            connected_clients: self.registry.count(),
            connected_to: self.binding.current().and_then(|t| t.label()),
            uptime_secs: self.state.time_since_start().as_secs_f64(),
        }))
    }
}

/// Answers `info_request` from a [`UnitDirectory`]
pub struct UnitInfoProvider {
    directory: Arc<dyn UnitDirectory>,
}

impl UnitInfoProvider {
    /// Provider backed by `directory`
    pub fn new(directory: Arc<dyn UnitDirectory>) -> Self {
        Self { directory }
    }
}

impl MessageProvider for UnitInfoProvider {
    fn name(&self) -> &str {
        "unit_info"
    }

    fn try_answer(&self, request: &Envelope) -> Option<Envelope> {
        let Envelope::InfoRequest(query) = request else {
            return None;
        };
        let units = self
            .directory
            .units()
            .into_iter()
            .filter(|u| query.unit_ids.is_empty() || query.unit_ids.contains(&u.unit_id))
            .collect();
        Some(Envelope::InfoResponse(InfoResponse { units }))
    }
}

/// Answers `entities_request`
pub struct EntitiesProvider {
    state: Arc<dyn UnitState>,
}

impl EntitiesProvider {
    /// Provider reading entities from `state`
    pub fn new(state: Arc<dyn UnitState>) -> Self {
        Self { state }
    }
}

impl MessageProvider for EntitiesProvider {
    fn name(&self) -> &str {
        "entities"
    }

    fn try_answer(&self, request: &Envelope) -> Option<Envelope> {
        let Envelope::EntitiesRequest(_) = request else {
            return None;
        };
        Some(Envelope::EntitiesResponse(EntitiesResponse {
            entities: self.state.entities(),
        }))
    }
}

/// Handles `behavior_control` through the action trigger
pub struct BehaviorProvider {
    trigger: Arc<dyn ActionTrigger>,
}

impl BehaviorProvider {
    /// Provider forwarding to `trigger`
    pub fn new(trigger: Arc<dyn ActionTrigger>) -> Self {
        Self { trigger }
    }
}

impl MessageProvider for BehaviorProvider {
    fn name(&self) -> &str {
        "behavior"
    }

    fn try_answer(&self, request: &Envelope) -> Option<Envelope> {
        let Envelope::BehaviorControl(control) = request else {
            return None;
        };
        if control.start {
            self.trigger.start_behavior(&control.behavior, &control.args);
        } else {
            self.trigger.stop_behavior(&control.behavior);
        }
        Some(Envelope::ack(MessageKind::BehaviorControl))
    }
}

/// Handles `log` by handing the line to the log sink
pub struct LogProvider {
    sink: LogSink,
}

impl LogProvider {
    /// Provider writing to `sink`
    pub fn new(sink: LogSink) -> Self {
        Self { sink }
    }
}

impl MessageProvider for LogProvider {
    fn name(&self) -> &str {
        "log"
    }

    fn try_answer(&self, request: &Envelope) -> Option<Envelope> {
        let Envelope::Log(line) = request else {
            return None;
        };
        self.sink.record(&line.message, line.stamp.as_deref());
        Some(Envelope::ack(MessageKind::Log))
    }
}

/// Standard chain for a field unit
pub fn unit_chain<U>(
    unit: Arc<U>,
    registry: Arc<ConnectionRegistry>,
    binding: Binding,
    address: Option<String>,
    log: LogSink,
) -> ProviderChain
where
    U: UnitState + ActionTrigger + 'static,
{
    let state: Arc<dyn UnitState> = unit.clone();
    let trigger: Arc<dyn ActionTrigger> = unit;
    ProviderChain::new()
        .with(Arc::new(SystemStatusProvider::new(
            Arc::clone(&state),
            registry,
            binding,
        )))
        .with(Arc::new(UnitInfoProvider::new(Arc::new(SelfDirectory::new(
            Arc::clone(&state),
            address,
        )))))
        .with(Arc::new(EntitiesProvider::new(state)))
        .with(Arc::new(BehaviorProvider::new(trigger)))
        .with(Arc::new(LogProvider::new(log)))
}
