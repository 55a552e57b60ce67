//! Recipe manifest parsing and deployment
//!
//! A recipe (recipe.yaml) declares a set of stores and the particles wired
//! to them. Deploying a recipe creates one in-memory proxy per store,
//! instantiates every declared particle against its connected stores, and
//! starts them. Manifests support environment variable substitution.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use particle_host_sdk::{Direction, IdGenerator, ParticleSpec, ProxyError, StorageProxy};

use super::context::{InstantiationError, LiveParticle, ParticleExecutionContext};
use super::lifecycle::LifecycleError;
use super::proxy::MemoryProxy;

/// The recipe manifest (recipe.yaml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeManifest {
    /// Recipe metadata
    pub recipe: RecipeInfo,

    /// Stores the recipe's particles share, keyed by store name
    #[serde(default)]
    pub stores: HashMap<String, StoreConfig>,

    /// Particles to instantiate
    #[serde(default)]
    pub particles: Vec<ParticleConfig>,
}

/// Recipe metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeInfo {
    /// Recipe name (unique identifier)
    pub name: String,

    /// Semantic version
    pub version: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store kind: memory
    #[serde(default = "default_store_kind")]
    pub kind: String,

    /// Initial model, set before any particle registers
    #[serde(default)]
    pub model: Option<JsonValue>,
}

fn default_store_kind() -> String {
    "memory".to_string()
}

/// One particle declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticleConfig {
    /// Particle name, also used in minted particle ids
    pub name: String,

    /// Implementation locator resolved by the context's loader
    pub location: String,

    /// Slot connections, keyed by slot name
    #[serde(default)]
    pub connections: HashMap<String, ConnectionConfig>,
}

/// One slot connection of a declared particle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Name of the store backing this slot
    pub store: String,

    /// Data-flow direction of this slot
    pub direction: Direction,
}

impl RecipeManifest {
    /// Parse a manifest from YAML content
    pub fn parse(yaml: &str) -> Result<Self> {
        // First, substitute environment variables
        let expanded = expand_env_vars(yaml);

        // Then parse
        serde_yaml::from_str(&expanded).context("Failed to parse recipe manifest")
    }

    /// Load a manifest from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read recipe file: {:?}", path.as_ref()))?;
        Self::parse(&content)
    }

    /// Validate the manifest
    pub fn validate(&self) -> Result<()> {
        if self.recipe.name.is_empty() {
            anyhow::bail!("Recipe name is required");
        }
        if self.recipe.version.is_empty() {
            anyhow::bail!("Recipe version is required");
        }

        for particle in &self.particles {
            if particle.name.is_empty() {
                anyhow::bail!("Particle name is required");
            }
            if particle.location.is_empty() {
                anyhow::bail!("Particle '{}' must have a location", particle.name);
            }
            for (slot, connection) in &particle.connections {
                if !self.stores.contains_key(&connection.store) {
                    anyhow::bail!(
                        "Particle '{}' connects slot '{}' to undeclared store '{}'",
                        particle.name,
                        slot,
                        connection.store
                    );
                }
            }
        }
        Ok(())
    }
}

/// Expand environment variables in a string
/// Supports: ${VAR}, ${VAR:-default}, $VAR
fn expand_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    // Pattern: ${VAR:-default} or ${VAR}
    let re = regex_lite::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").unwrap();
    result = re
        .replace_all(&result, |caps: &regex_lite::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map(|m| m.as_str());

            std::env::var(var_name).unwrap_or_else(|_| default.unwrap_or("").to_string())
        })
        .to_string();

    // Pattern: $VAR (simple)
    let re = regex_lite::Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").unwrap();
    result = re
        .replace_all(&result, |caps: &regex_lite::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_default()
        })
        .to_string();

    result
}

/// Errors raised while deploying a recipe
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("invalid recipe manifest: {0}")]
    Manifest(anyhow::Error),

    #[error("unsupported store kind {kind:?} for store {name:?}")]
    UnsupportedStoreKind { name: String, kind: String },

    #[error("failed to seed store {name:?}: {source}")]
    SeedStore {
        name: String,
        #[source]
        source: ProxyError,
    },

    #[error("failed to instantiate particle {particle:?}")]
    Instantiate {
        particle: String,
        #[source]
        source: InstantiationError,
    },

    #[error("failed to start particle {particle:?}")]
    Start {
        particle: String,
        #[source]
        source: LifecycleError,
    },
}

/// A deployed recipe: its stores and started particles
pub struct DeployedRecipe {
    pub stores: HashMap<String, Arc<dyn StorageProxy>>,
    pub particles: Vec<Arc<LiveParticle>>,
}

/// Deploy a recipe against a context
///
/// Creates one proxy per declared store (seeded with its initial model
/// before any particle registers), instantiates every declared particle,
/// and starts them in declaration order. A particle that fails to
/// instantiate or start fails the deployment; already-deployed particles
/// stay tracked in the context and can be discarded by the caller.
pub async fn deploy_recipe(
    context: &ParticleExecutionContext,
    manifest: &RecipeManifest,
    ids: &IdGenerator,
) -> Result<DeployedRecipe, DeployError> {
    manifest.validate().map_err(DeployError::Manifest)?;

    let mut stores: HashMap<String, Arc<dyn StorageProxy>> = HashMap::new();
    for (name, config) in &manifest.stores {
        if config.kind != "memory" {
            return Err(DeployError::UnsupportedStoreKind {
                name: name.clone(),
                kind: config.kind.clone(),
            });
        }
        let proxy = MemoryProxy::start(name);
        if let Some(model) = &config.model {
            proxy
                .set(model.clone())
                .await
                .map_err(|source| DeployError::SeedStore {
                    name: name.clone(),
                    source,
                })?;
        }
        stores.insert(name.clone(), Arc::new(proxy));
    }

    let mut particles = Vec::with_capacity(manifest.particles.len());
    for config in &manifest.particles {
        let mut spec = ParticleSpec::new(&config.name, &config.location);
        let mut proxies: HashMap<String, Arc<dyn StorageProxy>> = HashMap::new();
        for (slot, connection) in &config.connections {
            spec = spec.with_connection(slot, connection.direction);
            // validate() checked every connection against the store table
            proxies.insert(slot.clone(), Arc::clone(&stores[&connection.store]));
        }

        let particle_id = ids.next_component_id(&config.name);
        let live = context
            .instantiate_particle(particle_id.clone(), spec, proxies, ids)
            .await
            .map_err(|source| DeployError::Instantiate {
                particle: config.name.clone(),
                source,
            })?;
        context
            .start_particle(&particle_id)
            .await
            .map_err(|source| DeployError::Start {
                particle: config.name.clone(),
                source,
            })?;
        particles.push(live);
    }

    tracing::info!(
        recipe = %manifest.recipe.name,
        stores = stores.len(),
        particles = particles.len(),
        "deployed recipe"
    );
    Ok(DeployedRecipe { stores, particles })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::loader::StaticLoader;
    use async_trait::async_trait;
    use particle_host_sdk::prelude::*;
    use particle_host_sdk::BasicHandleFactory;

    #[test]
    fn test_parse_minimal_manifest() {
        let yaml = r#"
recipe:
  name: demo
  version: 1.0.0

particles:
  - name: Show
    location: show
"#;

        let manifest = RecipeManifest::parse(yaml).unwrap();
        assert_eq!(manifest.recipe.name, "demo");
        assert_eq!(manifest.recipe.version, "1.0.0");
        assert_eq!(manifest.particles.len(), 1);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_parse_full_manifest() {
        let yaml = r#"
recipe:
  name: music-demo
  version: 0.3.0
  description: Show the current artist

stores:
  artists:
    kind: memory
    model:
      name: unknown
  plays:
    kind: memory

particles:
  - name: ShowArtist
    location: show_artist
    connections:
      artist:
        store: artists
        direction: reads
      plays:
        store: plays
        direction: writes
"#;

        let manifest = RecipeManifest::parse(yaml).unwrap();
        assert_eq!(manifest.stores.len(), 2);
        assert_eq!(manifest.particles.len(), 1);
        let particle = &manifest.particles[0];
        assert_eq!(particle.connections["artist"].direction, Direction::Reads);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_undeclared_store() {
        let yaml = r#"
recipe:
  name: demo
  version: 1.0.0

particles:
  - name: Show
    location: show
    connections:
      artist:
        store: missing
        direction: reads
"#;

        let manifest = RecipeManifest::parse(yaml).unwrap();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("RECIPE_TEST_VAR", "hello");

        let input = "value: ${RECIPE_TEST_VAR}";
        assert_eq!(expand_env_vars(input), "value: hello");

        let input_with_default = "value: ${RECIPE_MISSING_VAR:-default_value}";
        assert_eq!(expand_env_vars(input_with_default), "value: default_value");
    }

    struct Echo {
        handles: Option<HandleMap>,
    }

    #[async_trait]
    impl Particle for Echo {
        fn bind_handles(&mut self, handles: HandleMap) {
            self.handles = Some(handles);
        }

        async fn on_handle_update(&mut self, handle: &Handle) -> Result<(), ParticleError> {
            let model = handle.read().await?;
            if let (Some(model), Some(handles)) = (model, &self.handles) {
                if let Some(out) = handles.get("out") {
                    out.write(model).await?;
                }
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_deploy_wires_and_starts_particles() {
        let loader = StaticLoader::new();
        loader
            .register("echo", || {
                Some(Box::new(Echo { handles: None }) as Box<dyn Particle>)
            })
            .await;
        let context = ParticleExecutionContext::new(
            Arc::new(loader),
            Arc::new(BasicHandleFactory),
            Services::new(),
        );
        let ids = IdGenerator::new_session();

        let manifest = RecipeManifest::parse(
            r#"
recipe:
  name: echo-demo
  version: 1.0.0

stores:
  in:
    kind: memory
  out:
    kind: memory

particles:
  - name: Echo
    location: echo
    connections:
      in:
        store: in
        direction: reads
      out:
        store: out
        direction: writes
"#,
        )
        .unwrap();

        let deployed = deploy_recipe(&context, &manifest, &ids).await.unwrap();
        assert_eq!(deployed.particles.len(), 1);
        assert_eq!(context.particle_count().await, 1);

        // A write to the input store flows through the particle to the output
        deployed.stores["in"].set(json!("ping")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(deployed.stores["out"].get().await.unwrap(), Some(json!("ping")));
    }

    #[tokio::test]
    async fn test_deploy_fails_on_unresolvable_particle() {
        let context = ParticleExecutionContext::new(
            Arc::new(StaticLoader::new()),
            Arc::new(BasicHandleFactory),
            Services::new(),
        );
        let ids = IdGenerator::new_session();

        let manifest = RecipeManifest::parse(
            r#"
recipe:
  name: ghost-demo
  version: 1.0.0

particles:
  - name: Ghost
    location: ghost
"#,
        )
        .unwrap();

        let result = deploy_recipe(&context, &manifest, &ids).await;
        assert!(matches!(result, Err(DeployError::Instantiate { .. })));
    }
}
