//! Storage proxy port
//!
//! A storage proxy represents one live, named data slot. The host wires
//! particles to proxies through handles; each proxy keeps a registration
//! table of (particle, handle) pairs so changes to its model reach every
//! registered particle. The SDK defines the port; the host provides
//! implementations.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;

use crate::error::ProxyError;
use crate::handle::Handle;
use crate::id::Id;
use crate::particle::Particle;

/// A particle as shared by the host once wiring completes
pub type SharedParticle = Arc<Mutex<Box<dyn Particle>>>;

/// Non-owning particle reference held in proxy registration tables
pub type WeakParticle = Weak<Mutex<Box<dyn Particle>>>;

/// One entry of a proxy's registration table
///
/// The particle reference is non-owning: the host's registry owns the
/// particle, and a proxy drops dead entries when it next notifies.
pub struct RegistrationTarget {
    pub particle: WeakParticle,
    pub handle: Handle,
}

impl RegistrationTarget {
    pub fn new(particle: WeakParticle, handle: Handle) -> Self {
        Self { particle, handle }
    }
}

impl std::fmt::Debug for RegistrationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationTarget")
            .field("handle", &self.handle)
            .field("particle_alive", &(self.particle.strong_count() > 0))
            .finish()
    }
}

/// Port to one live, named data slot
///
/// Implementations must accept registrations from many particles against the
/// same proxy instance, keyed by handle id, and must be safe under
/// concurrent registration. Registering the same handle id again replaces
/// the previous entry, so unregistration is safe to retry.
#[async_trait]
pub trait StorageProxy: Send + Sync {
    /// The slot name this proxy backs
    fn name(&self) -> &str;

    /// Read the current model
    async fn get(&self) -> Result<Option<JsonValue>, ProxyError>;

    /// Replace the model and notify registered readable handles
    async fn set(&self, model: JsonValue) -> Result<(), ProxyError>;

    /// Drop the model and notify registered readable handles
    async fn clear(&self) -> Result<(), ProxyError>;

    /// Add a (particle, handle) pair to the registration table
    async fn register(&self, target: RegistrationTarget) -> Result<(), ProxyError>;

    /// Remove the registration recorded for a handle id
    ///
    /// Removing an id that was never registered is not an error.
    async fn unregister(&self, handle: &Id) -> Result<bool, ProxyError>;

    /// Number of live entries in the registration table
    async fn registration_count(&self) -> Result<usize, ProxyError>;
}
