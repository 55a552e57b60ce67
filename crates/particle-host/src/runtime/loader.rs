//! Particle loading
//!
//! Resolves implementation locators to particle factories. Two loaders are
//! provided: [`StaticLoader`] keeps an in-process registry of factories and
//! [`LibraryLoader`] loads particle crates compiled as dynamic libraries
//! (.so/.dll) that export a `particle_entry` symbol.
//!
//! A locator that resolves to nothing yields `Ok(None)`, not an error; the
//! execution context turns that into a resolution failure. Errors are
//! reserved for libraries that exist but cannot be loaded.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use libloading::{Library, Symbol};
use tokio::sync::{Mutex, RwLock};

use particle_host_sdk::particle::{ParticleEntryFn, ParticleFactory, PARTICLE_ENTRY_SYMBOL};

/// Errors raised while loading a particle library
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("failed to load particle library {path:?}: {message}")]
    Library { path: PathBuf, message: String },

    #[error("particle entry symbol missing in {path:?}: {message}")]
    EntrySymbol { path: PathBuf, message: String },
}

/// Resolves an implementation locator to a particle factory
#[async_trait]
pub trait ParticleLoader: Send + Sync {
    /// Resolve `locator`. `Ok(None)` means the locator names nothing.
    async fn load_particle(
        &self,
        locator: &str,
    ) -> Result<Option<Arc<dyn ParticleFactory>>, LoaderError>;
}

/// In-process loader backed by a registry of factories
///
/// Used by tests and by hosts that link their particles statically.
pub struct StaticLoader {
    factories: RwLock<HashMap<String, Arc<dyn ParticleFactory>>>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Register a factory under a locator
    pub async fn register<F>(&self, locator: &str, factory: F)
    where
        F: ParticleFactory + 'static,
    {
        let mut factories = self.factories.write().await;
        factories.insert(locator.to_string(), Arc::new(factory));
    }

    /// Number of registered factories
    pub async fn count(&self) -> usize {
        self.factories.read().await.len()
    }
}

impl Default for StaticLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ParticleLoader for StaticLoader {
    async fn load_particle(
        &self,
        locator: &str,
    ) -> Result<Option<Arc<dyn ParticleFactory>>, LoaderError> {
        let factories = self.factories.read().await;
        Ok(factories.get(locator).cloned())
    }
}

/// A loaded particle library with its factory
struct LoadedLibrary {
    /// The loaded library (must stay alive while the factory is in use)
    _library: Library,
    factory: Arc<dyn ParticleFactory>,
}

// Safety: the factory is Send + Sync by trait bound, and the library it
// points into is kept alive alongside it for the loader's lifetime
unsafe impl Send for LoadedLibrary {}
unsafe impl Sync for LoadedLibrary {}

/// Loader for particle crates compiled as dynamic libraries
///
/// Libraries are resolved under a particles directory by platform naming
/// (`libparticle_<locator>.so` on Linux) and cached after first load; a
/// loaded library is never unloaded while the loader lives.
pub struct LibraryLoader {
    particles_dir: PathBuf,
    loaded: Mutex<HashMap<String, Arc<LoadedLibrary>>>,
}

impl LibraryLoader {
    pub fn new(particles_dir: PathBuf) -> Self {
        Self {
            particles_dir,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Create a loader rooted at the configured particles directory
    pub fn from_config(config: &crate::config::HostConfig) -> Self {
        Self::new(config.particles_dir.clone())
    }

    /// Expected library path for a locator
    pub fn library_path(&self, locator: &str) -> PathBuf {
        self.particles_dir.join(format_library_name(locator))
    }

    /// Load the library at `path` and resolve its particle factory
    ///
    /// # Safety
    /// Loads and executes code from a dynamic library. The library must
    /// export a `particle_entry` function with the correct signature.
    unsafe fn load_library(
        path: &Path,
    ) -> Result<Option<(Library, Arc<dyn ParticleFactory>)>, LoaderError> {
        let library = Library::new(path).map_err(|e| LoaderError::Library {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let entry: Symbol<ParticleEntryFn> =
            library
                .get(PARTICLE_ENTRY_SYMBOL)
                .map_err(|e| LoaderError::EntrySymbol {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
        let entry_fn: ParticleEntryFn = *entry;

        match entry_fn() {
            Some(factory) => Ok(Some((library, Arc::from(factory)))),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ParticleLoader for LibraryLoader {
    async fn load_particle(
        &self,
        locator: &str,
    ) -> Result<Option<Arc<dyn ParticleFactory>>, LoaderError> {
        let mut loaded = self.loaded.lock().await;

        if let Some(lib) = loaded.get(locator) {
            return Ok(Some(Arc::clone(&lib.factory)));
        }

        let path = self.library_path(locator);
        if !path.exists() {
            return Ok(None);
        }

        match unsafe { Self::load_library(&path)? } {
            Some((library, factory)) => {
                loaded.insert(
                    locator.to_string(),
                    Arc::new(LoadedLibrary {
                        _library: library,
                        factory: Arc::clone(&factory),
                    }),
                );
                tracing::info!(locator, ?path, "loaded particle library");
                Ok(Some(factory))
            }
            None => {
                tracing::warn!(locator, ?path, "particle library defined no factory");
                Ok(None)
            }
        }
    }
}

/// Format the library filename for the current platform
#[cfg(target_os = "windows")]
fn format_library_name(locator: &str) -> String {
    format!("particle_{}.dll", locator.replace('-', "_"))
}

#[cfg(target_os = "macos")]
fn format_library_name(locator: &str) -> String {
    format!("libparticle_{}.dylib", locator.replace('-', "_"))
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn format_library_name(locator: &str) -> String {
    format!("libparticle_{}.so", locator.replace('-', "_"))
}
