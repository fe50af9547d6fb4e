//! Binding: which unit a process is bound to
//!
//! A field unit is bound to itself for its whole life. The console is bound
//! to whichever unit the operator selected and can switch at runtime. Motor
//! commands are applied only when they name the current binding.

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, PoisonError, RwLock};
use swarmlink_core::envelope::MotorSet;

/// Identity of the bound unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundTarget {
    /// Unit name
    pub name: Option<String>,
    /// Unit address (IP, optionally with port)
    pub address: Option<String>,
}

impl BoundTarget {
    /// Target with both name and address
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            address: Some(address.into()),
        }
    }

    /// Human-readable label, address first
    pub fn label(&self) -> Option<String> {
        self.address.clone().or_else(|| self.name.clone())
    }
}

/// Shared, switchable binding
#[derive(Debug, Clone, Default)]
pub struct Binding {
    target: Arc<RwLock<Option<BoundTarget>>>,
}

impl Binding {
    /// Binding that starts out bound to `target`
    pub fn fixed(target: BoundTarget) -> Self {
        Self {
            target: Arc::new(RwLock::new(Some(target))),
        }
    }

    /// Binding that starts out unbound
    pub fn unbound() -> Self {
        Self::default()
    }

    /// Switch to a new target
    pub fn bind(&self, target: BoundTarget) {
        *self.target.write().unwrap_or_else(PoisonError::into_inner) = Some(target);
    }

    /// Drop the current target
    pub fn clear(&self) {
        *self.target.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Current target, if any
    pub fn current(&self) -> Option<BoundTarget> {
        self.target
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a motor command is addressed to the bound unit.
    ///
    /// An unbound process matches nothing.
    pub fn matches(&self, motors: &MotorSet) -> bool {
        let guard = self.target.read().unwrap_or_else(PoisonError::into_inner);
        let Some(bound) = guard.as_ref() else {
            return false;
        };

        let address_match = match (&motors.target_address, &bound.address) {
            (Some(wanted), Some(ours)) => same_host(wanted, ours),
            _ => false,
        };
        let name_match = match (&motors.target_name, &bound.name) {
            (Some(wanted), Some(ours)) => wanted == ours,
            _ => false,
        };
        address_match || name_match
    }
}

fn host_of(address: &str) -> Option<IpAddr> {
    address
        .parse::<IpAddr>()
        .ok()
        .or_else(|| address.parse::<SocketAddr>().ok().map(|s| s.ip()))
}

/// Compare two addresses by host, ignoring any port
fn same_host(a: &str, b: &str) -> bool {
    match (host_of(a), host_of(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a.trim() == b.trim(),
    }
}
