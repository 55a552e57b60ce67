//! Particle specs
//!
//! A [`ParticleSpec`] is the immutable descriptor of a particle type: where
//! its implementation lives and, per named slot, whether that slot is read,
//! written, or both. Specs are plain serde data so they can travel in recipe
//! manifests.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Data-flow direction of one named slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The particle reads this slot
    Reads,
    /// The particle writes this slot
    Writes,
    /// The particle both reads and writes this slot
    ReadsWrites,
}

impl Direction {
    /// Whether a handle with this direction receives data
    pub fn is_input(&self) -> bool {
        matches!(self, Direction::Reads | Direction::ReadsWrites)
    }

    /// Whether a handle with this direction may store data
    pub fn is_output(&self) -> bool {
        matches!(self, Direction::Writes | Direction::ReadsWrites)
    }
}

/// Declared connection of one named slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSpec {
    pub direction: Direction,
}

/// Immutable descriptor of a particle type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticleSpec {
    /// Particle name, for diagnostics and recipes
    pub name: String,

    /// Implementation locator resolved by the particle loader
    /// (library name without platform prefix/extension)
    pub location: String,

    /// Declared slot connections, keyed by slot name
    #[serde(default)]
    pub connections: HashMap<String, ConnectionSpec>,
}

impl ParticleSpec {
    /// Create a spec with no declared connections
    pub fn new(name: &str, location: &str) -> Self {
        Self {
            name: name.to_string(),
            location: location.to_string(),
            connections: HashMap::new(),
        }
    }

    /// Builder pattern: declare a slot connection
    pub fn with_connection(mut self, name: &str, direction: Direction) -> Self {
        self.connections
            .insert(name.to_string(), ConnectionSpec { direction });
        self
    }

    /// Whether the named slot is an input. Unknown slots are not inputs.
    pub fn is_input(&self, name: &str) -> bool {
        self.connections
            .get(name)
            .map(|c| c.direction.is_input())
            .unwrap_or(false)
    }

    /// Whether the named slot is an output. Unknown slots are not outputs.
    pub fn is_output(&self, name: &str) -> bool {
        self.connections
            .get(name)
            .map(|c| c.direction.is_output())
            .unwrap_or(false)
    }

    /// Names of all declared slot connections
    pub fn connection_names(&self) -> impl Iterator<Item = &str> {
        self.connections.keys().map(|s| s.as_str())
    }
}
