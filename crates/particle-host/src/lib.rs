//! Particle host runtime
//!
//! Hosts particles - units of application logic - and wires them to named
//! data slots backed by storage proxies. The central piece is the
//! [`runtime::ParticleExecutionContext`]: given a particle id, a spec, a
//! mapping of named proxies and an id generator, it resolves the particle
//! implementation, builds one handle per proxy, attaches the handle map to
//! the particle and registers every (particle, handle) pair back with its
//! proxy so data changes reach the particle.
//!
//! Particle implementations are written against the `particle-host-sdk`
//! crate and loaded either from an in-process registry or from compiled
//! particle libraries.

pub mod config;
pub mod runtime;

pub use config::HostConfig;
pub use runtime::{
    deploy_recipe, InstantiationError, LibraryLoader, LiveParticle, MemoryProxy,
    ParticleExecutionContext, ParticleLoader, ParticleState, RecipeManifest, StaticLoader,
};

// The SDK types appear throughout the host API; re-export the crate
pub use particle_host_sdk as sdk;
