//! Console-side roster of field units
//!
//! Units are discovered from their beacons. Each beacon refreshes the unit's
//! last-seen time; units not heard from within the stale threshold are
//! pruned.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use swarmlink_core::broadcast::{BroadcastMessage, BroadcastPayload};
use swarmlink_core::entity::{Entity, EntityKind};
use swarmlink_core::envelope::UnitInfo;
use swarmlink_core::types::now_ms;
use swarmlink_mesh::BeaconSink;
use tracing::{debug, info};

use crate::providers::UnitDirectory;

/// Default stale threshold: 10 seconds
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(10);

/// Units known to the console
#[derive(Debug)]
pub struct UnitRoster {
    units: RwLock<HashMap<String, UnitInfo>>,
    shared: RwLock<HashMap<String, Entity>>,
    stale_after: Duration,
    default_port: u16,
}

impl UnitRoster {
    /// Roster pruning units silent for longer than `stale_after`.
    ///
    /// `default_port` completes beacon addresses that carry no port.
    pub fn new(stale_after: Duration, default_port: u16) -> Self {
        Self {
            units: RwLock::new(HashMap::new()),
            shared: RwLock::new(HashMap::new()),
            stale_after,
            default_port,
        }
    }

    /// Merge a beacon received at `now` (Unix epoch milliseconds)
    pub fn observe_at(&self, beacon: &BroadcastMessage, from: SocketAddr, now: u64) {
        if let BroadcastPayload::SharedEntityLocation { entity } = &beacon.payload {
            self.shared
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(entity.name.clone(), entity.clone());
        }

        let mut units = self.units.write().unwrap_or_else(PoisonError::into_inner);
        let unit = units.entry(beacon.unit_id.clone()).or_insert_with(|| {
            info!(unit = %beacon.unit_id, from = %from, "unit discovered");
            UnitInfo {
                unit_id: beacon.unit_id.clone(),
                address: None,
                status: String::new(),
                active_behavior: None,
                position: None,
                orientation_deg: None,
                last_seen_ms: None,
            }
        });

        match &beacon.address {
            Some(address) => unit.address = Some(address.clone()),
            None if unit.address.is_none() => {
                unit.address = Some(SocketAddr::new(from.ip(), self.default_port).to_string())
            }
            None => {}
        }
        unit.last_seen_ms = Some(now);

        match &beacon.payload {
            BroadcastPayload::Heartbeat {
                status,
                active_behavior,
                ..
            } => {
                unit.status = status.clone();
                unit.active_behavior = active_behavior.clone();
            }
            BroadcastPayload::Position {
                position,
                orientation_deg,
            } => {
                unit.position = Some(*position);
                unit.orientation_deg = *orientation_deg;
            }
            BroadcastPayload::SharedEntityLocation { .. } => {}
        }
    }

    /// Drop units not heard from since `now - stale_after`, along with the
    /// shared locations they observed; returns their ids
    pub fn prune_stale_at(&self, now: u64) -> Vec<String> {
        let threshold = self.stale_after.as_millis() as u64;
        let mut units = self.units.write().unwrap_or_else(PoisonError::into_inner);
        let stale: Vec<String> = units
            .values()
            .filter(|u| now.saturating_sub(u.last_seen_ms.unwrap_or(0)) > threshold)
            .map(|u| u.unit_id.clone())
            .collect();
        for id in &stale {
            units.remove(id);
            info!(unit = %id, "unit went silent, removed");
        }
        drop(units);

        if !stale.is_empty() {
            self.shared
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|_, entity| match &entity.kind {
                    EntityKind::SharedLocation { observer, .. } => !stale.contains(observer),
                    _ => true,
                });
        }
        stale
    }

    /// [`prune_stale_at`](Self::prune_stale_at) using the current time
    pub fn prune_stale(&self) -> Vec<String> {
        self.prune_stale_at(now_ms())
    }

    /// Snapshot of one unit
    pub fn get(&self, unit_id: &str) -> Option<UnitInfo> {
        self.units
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(unit_id)
            .cloned()
    }

    /// Number of known units
    pub fn len(&self) -> usize {
        self.units
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no unit is known
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Command address of a unit
    pub fn command_addr(&self, unit_id: &str) -> Option<SocketAddr> {
        let address = self.get(unit_id)?.address?;
        address.parse().ok().or_else(|| {
            address
                .parse()
                .ok()
                .map(|ip| SocketAddr::new(ip, self.default_port))
        })
    }

    /// Command addresses of every known unit
    pub fn all_command_addrs(&self) -> Vec<SocketAddr> {
        self.units()
            .iter()
            .filter_map(|u| self.command_addr(&u.unit_id))
            .collect()
    }

    /// Shared entity locations reported by units
    pub fn shared_entities(&self) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self
            .shared
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        entities.sort_by(|a, b| a.name.cmp(&b.name));
        entities
    }
}

impl UnitDirectory for UnitRoster {
    fn units(&self) -> Vec<UnitInfo> {
        let mut units: Vec<UnitInfo> = self
            .units
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        units.sort_by(|a, b| a.unit_id.cmp(&b.unit_id));
        units
    }
}

impl BeaconSink for UnitRoster {
    fn on_beacon(&self, beacon: &BroadcastMessage, from: SocketAddr) {
        debug!(unit = %beacon.unit_id, variant = %beacon.payload.variant(), "beacon");
        self.observe_at(beacon, from, now_ms());
    }
}
