//! Particle Host SDK - Types and traits for writing hosted particles
//!
//! This crate provides the core types and traits that particles use to
//! interact with the particle host runtime: the particle lifecycle trait,
//! handles bound to named storage slots, the storage proxy port, and the
//! shared services attached to every particle at setup time.

pub mod error;
pub mod handle;
pub mod id;
pub mod particle;
pub mod services;
pub mod spec;
pub mod storage;

pub mod prelude {
    //! Common imports for particle implementations
    pub use crate::error::{HandleError, ParticleError, ProxyError};
    pub use crate::handle::{Handle, HandleMap};
    pub use crate::id::{Id, IdGenerator};
    pub use crate::particle::{Particle, ParticleFactory};
    pub use crate::services::Services;
    pub use crate::spec::{Direction, ParticleSpec};
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{json, Value as JsonValue};
}

// Re-export key types at crate root
pub use error::{HandleError, ParticleError, ProxyError};
pub use handle::{BasicHandleFactory, Handle, HandleFactory, HandleMap};
pub use id::{Id, IdGenerator};
pub use particle::{Particle, ParticleFactory};
pub use services::{JsonCodec, Services};
pub use spec::{Direction, ParticleSpec};
pub use storage::{RegistrationTarget, SharedParticle, StorageProxy, WeakParticle};
