//! Particle trait and factory seam
//!
//! Particles are the units of application logic the host instantiates and
//! wires to named storage slots. The host drives the lifecycle callbacks;
//! storage proxies drive the data callbacks through registered handles.
//!
//! Particles compiled as shared libraries export a factory through the
//! [`register_particle!`] macro; in-process particles register a
//! [`ParticleFactory`] with the host's static loader instead.

use async_trait::async_trait;

use crate::error::ParticleError;
use crate::handle::{Handle, HandleMap};
use crate::services::Services;
use crate::spec::ParticleSpec;

/// Base trait for all particles
///
/// All callbacks default to no-ops so a particle only implements what it
/// reacts to. The wiring points (`setup`, `bind_handles`) are invoked by the
/// host exactly once per instantiation, in that order; `bind_handles`
/// receives the complete handle map in a single call, so a particle never
/// observes a partially wired state.
#[async_trait]
pub trait Particle: Send + 'static {
    /// Receive the spec and shared services. Called before any handle exists.
    fn setup(&mut self, spec: ParticleSpec, services: Services) {
        let _ = (spec, services);
    }

    /// Receive the complete slot-name to handle map in one assignment.
    fn bind_handles(&mut self, handles: HandleMap) {
        let _ = handles;
    }

    /// Called once after the particle is wired, before any data callback.
    async fn on_create(&mut self) -> Result<(), ParticleError> {
        Ok(())
    }

    /// Called when every readable handle has delivered its initial model.
    async fn on_ready(&mut self) -> Result<(), ParticleError> {
        Ok(())
    }

    /// Called when the host stops or discards the particle.
    async fn on_shutdown(&mut self) -> Result<(), ParticleError> {
        Ok(())
    }

    /// React to a change on a readable handle's proxy.
    async fn on_handle_update(&mut self, handle: &Handle) -> Result<(), ParticleError> {
        let _ = handle;
        Ok(())
    }

    /// React to a readable handle synchronizing its full model.
    ///
    /// `all_synced` is true on the callback that completes initial
    /// synchronization across all of the particle's readable handles.
    async fn on_handle_sync(
        &mut self,
        handle: &Handle,
        all_synced: bool,
    ) -> Result<(), ParticleError> {
        let _ = (handle, all_synced);
        Ok(())
    }
}

/// Factory seam the particle loader resolves locators to
///
/// A factory may legitimately produce no instance; the host treats that the
/// same as a locator that resolved to nothing.
pub trait ParticleFactory: Send + Sync {
    fn create_particle(&self) -> Option<Box<dyn Particle>>;
}

impl<F> ParticleFactory for F
where
    F: Fn() -> Option<Box<dyn Particle>> + Send + Sync,
{
    fn create_particle(&self) -> Option<Box<dyn Particle>> {
        self()
    }
}

/// Name of the symbol particle libraries export
pub const PARTICLE_ENTRY_SYMBOL: &[u8] = b"particle_entry";

/// Type of the entry point exported by particle libraries
///
/// Returning `None` means the library defines no particle; the host reports
/// a resolution failure rather than wiring a missing particle.
pub type ParticleEntryFn = unsafe extern "C" fn() -> Option<Box<dyn ParticleFactory>>;

/// Export a particle factory from a `cdylib` particle crate
///
/// # Example
///
/// ```ignore
/// use particle_host_sdk::prelude::*;
///
/// #[derive(Default)]
/// struct Greet;
///
/// #[async_trait]
/// impl Particle for Greet {}
///
/// particle_host_sdk::register_particle!(|| Some(Box::new(Greet::default()) as Box<dyn Particle>));
/// ```
#[macro_export]
macro_rules! register_particle {
    ($factory:expr) => {
        #[no_mangle]
        pub extern "C" fn particle_entry(
        ) -> Option<Box<dyn $crate::particle::ParticleFactory>> {
            Some(Box::new($factory))
        }
    };
}
