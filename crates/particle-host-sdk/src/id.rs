//! Session-scoped id generation
//!
//! Every wiring session gets its own generator; the ids it mints are
//! hierarchical (`session:serial` or `session:serial:component`) so a handle
//! id always traces back to the session that created it.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An opaque identifier minted by an [`IdGenerator`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id(String);

impl Id {
    /// Create from a string
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generator for session-scoped ids
///
/// Cheap to share by reference; the serial counter is atomic so concurrent
/// wiring against the same session stays collision-free.
#[derive(Debug)]
pub struct IdGenerator {
    session_id: String,
    serial: AtomicU64,
}

impl IdGenerator {
    /// Start a new session with a random session id
    pub fn new_session() -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            serial: AtomicU64::new(0),
        }
    }

    /// Create a generator with a fixed session id
    pub fn with_session_id(session_id: String) -> Self {
        Self {
            session_id,
            serial: AtomicU64::new(0),
        }
    }

    /// The session id all minted ids are scoped to
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Mint the next id in this session
    pub fn next_id(&self) -> Id {
        let serial = self.serial.fetch_add(1, Ordering::Relaxed);
        Id(format!("{}:{}", self.session_id, serial))
    }

    /// Mint the next id in this session, tagged with a component name
    pub fn next_component_id(&self, component: &str) -> Id {
        let serial = self.serial.fetch_add(1, Ordering::Relaxed);
        Id(format!("{}:{}:{}", self.session_id, serial, component))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_within_session() {
        let ids = IdGenerator::new_session();
        let a = ids.next_id();
        let b = ids.next_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_component_id_carries_session_and_component() {
        let ids = IdGenerator::with_session_id("session".to_string());
        let id = ids.next_component_id("input1");
        assert_eq!(id.as_str(), "session:0:input1");
    }

    #[test]
    fn test_sessions_do_not_collide() {
        let a = IdGenerator::new_session();
        let b = IdGenerator::new_session();
        assert_ne!(a.next_id(), b.next_id());
    }
}
