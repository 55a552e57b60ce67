//! Runtime module - particle execution context and its collaborators
//!
//! This module provides:
//! - The particle execution context (instantiation, handle wiring, registry)
//! - Particle loaders (static registry and dynamic libraries)
//! - Particle lifecycle states
//! - Actor-backed storage proxies
//! - Recipe manifests and deployment

pub mod actor;
pub mod context;
pub mod lifecycle;
pub mod loader;
pub mod proxy;
pub mod recipe;

pub use context::{InstantiationError, LiveParticle, ParticleExecutionContext};
pub use lifecycle::{LifecycleError, ParticleState};
pub use loader::{LibraryLoader, ParticleLoader, StaticLoader};
pub use proxy::MemoryProxy;
pub use recipe::{deploy_recipe, DeployedRecipe, RecipeManifest};
