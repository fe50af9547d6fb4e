//! Console command relay
//!
//! Resolves a target selection against the unit roster and the console's
//! binding, turns operator commands into envelopes and hands them to the
//! [`CommandSender`]. Fire-and-forget commands go through [`CommandRelay::relay`],
//! queries through [`CommandRelay::query`].

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use swarmlink_core::entity::EntityStore;
use swarmlink_core::envelope::Envelope;
use swarmlink_mesh::{Binding, BoundTarget, CommandSender, SendReport};
use swarmlink_unit_status::UnitRoster;
use tracing::{debug, info};

use crate::command_types::OperatorCommand;
use crate::error::RelayError;

/// Which units a command goes to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetSelection {
    /// The unit the console is bound to
    #[default]
    Bound,
    /// Every unit in the roster
    All,
    /// Named units
    Units(Vec<String>),
}

/// Relays operator commands to field units
pub struct CommandRelay {
    sender: CommandSender,
    roster: Arc<UnitRoster>,
    binding: Binding,
    entities: Arc<EntityStore>,
}

impl CommandRelay {
    /// Create a relay
    pub fn new(
        sender: CommandSender,
        roster: Arc<UnitRoster>,
        binding: Binding,
        entities: Arc<EntityStore>,
    ) -> Self {
        Self {
            sender,
            roster,
            binding,
            entities,
        }
    }

    /// Roster consulted for addresses
    pub fn roster(&self) -> &Arc<UnitRoster> {
        &self.roster
    }

    /// Console binding
    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    /// Console entity set, pushed by `deploy-entities`
    pub fn entities(&self) -> &Arc<EntityStore> {
        &self.entities
    }

    /// Bind the console to a unit from the roster
    pub fn select(&self, unit_id: &str) -> Result<BoundTarget, RelayError> {
        let unit = self
            .roster
            .get(unit_id)
            .ok_or_else(|| RelayError::UnknownUnit(unit_id.to_string()))?;
        let target = BoundTarget {
            name: Some(unit.unit_id),
            address: unit.address,
        };
        self.binding.bind(target.clone());
        info!(unit = unit_id, address = ?target.address, "console bound");
        Ok(target)
    }

    /// Resolve a selection to command addresses
    pub fn resolve(&self, selection: &TargetSelection) -> Result<Vec<SocketAddr>, RelayError> {
        let targets = match selection {
            TargetSelection::Bound => {
                let bound = self.binding.current().ok_or(RelayError::NoTargets)?;
                vec![self.bound_addr(&bound)?]
            }
            TargetSelection::All => self.roster.all_command_addrs(),
            TargetSelection::Units(ids) => ids
                .iter()
                .map(|id| self.unit_addr(id))
                .collect::<Result<Vec<_>, _>>()?,
        };
        if targets.is_empty() {
            return Err(RelayError::NoTargets);
        }
        Ok(targets)
    }

    fn unit_addr(&self, unit_id: &str) -> Result<SocketAddr, RelayError> {
        if self.roster.get(unit_id).is_none() {
            return Err(RelayError::UnknownUnit(unit_id.to_string()));
        }
        self.roster
            .command_addr(unit_id)
            .ok_or_else(|| RelayError::NoAddress(unit_id.to_string()))
    }

    fn bound_addr(&self, bound: &BoundTarget) -> Result<SocketAddr, RelayError> {
        if let Some(addr) = bound.name.as_deref().and_then(|n| self.roster.command_addr(n)) {
            return Ok(addr);
        }
        bound
            .address
            .as_deref()
            .and_then(|a| a.parse().ok())
            .ok_or_else(|| RelayError::NoAddress(bound.label().unwrap_or_default()))
    }

    /// Send a fire-and-forget command to the selected units
    pub async fn relay(
        &self,
        command: &OperatorCommand,
        selection: &TargetSelection,
    ) -> Result<SendReport, RelayError> {
        if command.is_query() {
            return Err(RelayError::QueryNotRelayable(command.to_string()));
        }
        let envelope = command.to_envelope(&self.entities.snapshot(), self.binding.current().as_ref());
        self.send(&envelope, selection).await
    }

    /// Send a prepared envelope to the selected units
    pub async fn send(
        &self,
        envelope: &Envelope,
        selection: &TargetSelection,
    ) -> Result<SendReport, RelayError> {
        let targets = self.resolve(selection)?;
        debug!(kind = %envelope.kind(), targets = targets.len(), "relaying");
        Ok(self.sender.send(envelope, &targets).await)
    }

    /// Send a query to one unit (the bound one when `unit_id` is `None`) and
    /// return its answer
    pub async fn query(
        &self,
        command: &OperatorCommand,
        unit_id: Option<&str>,
    ) -> Result<Envelope, RelayError> {
        let target = match unit_id {
            Some(id) => self.unit_addr(id)?,
            None => {
                let bound = self.binding.current().ok_or(RelayError::NoTargets)?;
                self.bound_addr(&bound)?
            }
        };
        let envelope = command.to_envelope(&self.entities.snapshot(), self.binding.current().as_ref());
        Ok(self.sender.request(&envelope, target).await?)
    }
}
