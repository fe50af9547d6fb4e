//! Shared entities (waypoints, geofences, shared unit locations)
//!
//! Console and units each hold their own copy of the entity set. Copies
//! converge only through explicit `entity_set` messages, applied here by
//! [`EntityStore::apply`].

use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};

use crate::types::Coordinate;

/// Affiliation of a unit observed and shared by a peer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Affiliation {
    /// Member of our own swarm
    Friendly,
    /// Adversary unit
    Enemy,
    /// Not yet classified
    Unknown,
}

/// Entity variants
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityKind {
    /// Single point to visit
    Waypoint {
        /// Waypoint location
        position: Coordinate,
    },
    /// Closed polygon units must stay inside
    GeoFence {
        /// Polygon vertices in order
        vertices: Vec<Coordinate>,
    },
    /// Location of a unit as observed by another unit
    SharedLocation {
        /// Observed position
        position: Coordinate,
        /// Observed heading in degrees
        #[serde(default)]
        heading_deg: Option<f64>,
        /// Unit that made the observation
        observer: String,
        /// Affiliation of the observed unit
        affiliation: Affiliation,
    },
    /// Free-form labelled point
    Marker {
        /// Marker location
        position: Coordinate,
        /// Display label
        #[serde(default)]
        label: String,
    },
}

/// A named, typed entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    /// Entity name; unique within one entity set
    pub name: String,
    /// Entity payload
    #[serde(flatten)]
    pub kind: EntityKind,
    /// Creation or last update time (Unix epoch milliseconds)
    #[serde(default)]
    pub timestamp_ms: u64,
}

impl Entity {
    /// Create a new entity
    pub fn new(name: impl Into<String>, kind: EntityKind, timestamp_ms: u64) -> Self {
        Self {
            name: name.into(),
            kind,
            timestamp_ms,
        }
    }

    /// Whether this entity is a shared unit location
    pub fn is_shared_location(&self) -> bool {
        matches!(self.kind, EntityKind::SharedLocation { .. })
    }
}

/// How an `entity_set` message modifies the receiver's entity set
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntitySetMode {
    /// Replace the whole set
    #[default]
    Replace,
    /// Replace entities with the same name, add the rest
    Upsert,
    /// Remove entities with matching names
    Remove,
}

/// Thread-safe entity set owned by one process
#[derive(Debug, Default)]
pub struct EntityStore {
    entities: RwLock<Vec<Entity>>,
}

impl EntityStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Consistent copy of the current set
    pub fn snapshot(&self) -> Vec<Entity> {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of entities held
    pub fn len(&self) -> usize {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply an update atomically; returns the resulting entity count
    pub fn apply(&self, mode: EntitySetMode, update: &[Entity]) -> usize {
        let mut entities = self
            .entities
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        match mode {
            EntitySetMode::Replace => {
                *entities = update.to_vec();
            }
            EntitySetMode::Upsert => {
                for entity in update {
                    entities.retain(|e| e.name != entity.name);
                    entities.push(entity.clone());
                }
            }
            EntitySetMode::Remove => {
                entities.retain(|e| !update.iter().any(|u| u.name == e.name));
            }
        }

        entities.len()
    }
}
