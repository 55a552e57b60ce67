//! Particle execution context
//!
//! The context is the sole entry point for bringing a particle to life:
//! resolve its implementation through the loader, attach spec and shared
//! services, build one handle per supplied proxy, hand the complete handle
//! map to the particle, register every (particle, handle) pair with its
//! proxy, and track the particle in the live-particle registry.
//!
//! Wiring order is load-bearing: all handles are created before any
//! registration happens, so a handle-creation failure leaves every proxy
//! untouched. The context takes its collaborators (loader, handle factory,
//! shared services) explicitly at construction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use particle_host_sdk::{
    Handle, HandleError, HandleFactory, HandleMap, Id, IdGenerator, Particle, ParticleFactory,
    ParticleSpec, ProxyError, RegistrationTarget, Services, SharedParticle, StorageProxy,
};

use super::lifecycle::{LifecycleError, ParticleState, MAX_CONSECUTIVE_FAILURES};
use super::loader::{LoaderError, ParticleLoader};

/// Errors raised by [`ParticleExecutionContext::instantiate_particle`]
#[derive(Debug, thiserror::Error)]
pub enum InstantiationError {
    /// The loader failed while resolving the locator
    #[error("particle loader failed for {locator:?}")]
    Loader {
        locator: String,
        #[source]
        source: LoaderError,
    },

    /// The loader resolved nothing, or the factory produced no particle
    #[error("no particle implementation found for {locator:?}")]
    Resolution { locator: String },

    /// The spec declares slots the supplied proxies do not cover
    #[error("spec for particle {particle:?} references slots with no proxy: {missing:?}")]
    SpecMismatch {
        particle: String,
        missing: Vec<String>,
    },

    /// The handle factory failed; no proxy has been mutated
    #[error("failed to create handle for slot {name:?}")]
    HandleCreation {
        name: String,
        #[source]
        source: HandleError,
    },

    /// A proxy rejected a registration
    ///
    /// Registrations run after all handles exist, so proxies registered
    /// before the failing one keep their entries. The call has produced no
    /// usable particle; callers wanting cleanup unregister the surviving
    /// entries through [`ParticleExecutionContext::discard_particle`]-style
    /// teardown on the proxies they supplied.
    #[error("failed to register handle for slot {name:?} with its proxy")]
    Registration {
        name: String,
        #[source]
        source: ProxyError,
    },
}

/// A particle tracked by the context's live-particle registry
pub struct LiveParticle {
    id: Id,
    spec: ParticleSpec,
    particle: SharedParticle,
    handles: HandleMap,
    state: RwLock<ParticleState>,
    consecutive_failures: AtomicU32,
}

impl LiveParticle {
    /// Id the particle was instantiated under
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// The spec the particle was instantiated from
    pub fn spec(&self) -> &ParticleSpec {
        &self.spec
    }

    /// The slot-name to handle map attached to the particle
    pub fn handles(&self) -> &HandleMap {
        &self.handles
    }

    /// The particle itself, as shared with storage proxies
    pub fn particle(&self) -> &SharedParticle {
        &self.particle
    }

    /// Current lifecycle state
    pub async fn state(&self) -> ParticleState {
        *self.state.read().await
    }

    async fn set_state(&self, state: ParticleState) {
        *self.state.write().await = state;
    }

    /// Record a callback failure and move to the matching failed state
    async fn record_failure(&self, started_before: bool, max_failures: u32) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        let state = if failures >= max_failures {
            ParticleState::MaxFailed
        } else if started_before {
            ParticleState::Failed
        } else {
            ParticleState::FailedNeverStarted
        };
        tracing::warn!(particle = %self.id, failures, %state, "particle callback failed");
        self.set_state(state).await;
    }

    /// Drive the particle through create, handle sync and ready
    async fn start(&self, max_failures: u32) -> Result<(), LifecycleError> {
        let from = self.state().await;
        if from == ParticleState::MaxFailed {
            return Err(LifecycleError::MaxFailed(self.id.clone()));
        }
        if !from.can_start() {
            return Err(LifecycleError::InvalidTransition {
                from,
                event: "start",
            });
        }
        let started_before = from.has_started();

        if let Err(e) = self.particle.lock().await.on_create().await {
            self.record_failure(started_before, max_failures).await;
            return Err(LifecycleError::Callback(e));
        }
        self.set_state(ParticleState::Created).await;

        // Initial synchronization: deliver the current model of every
        // readable handle, flagging the callback that completes the set
        let readable: Vec<&Handle> = self.handles.values().filter(|h| h.is_input()).collect();
        let total = readable.len();
        for (i, handle) in readable.into_iter().enumerate() {
            let all_synced = i + 1 == total;
            let result = {
                let mut particle = self.particle.lock().await;
                particle.on_handle_sync(handle, all_synced).await
            };
            if let Err(e) = result {
                self.record_failure(started_before, max_failures).await;
                return Err(LifecycleError::Callback(e));
            }
        }
        self.set_state(ParticleState::Ready).await;

        if let Err(e) = self.particle.lock().await.on_ready().await {
            self.record_failure(started_before, max_failures).await;
            return Err(LifecycleError::Callback(e));
        }
        self.set_state(ParticleState::Started).await;
        self.consecutive_failures.store(0, Ordering::SeqCst);
        tracing::info!(particle = %self.id, "particle started");
        Ok(())
    }

    /// Drive the particle through shutdown
    async fn stop(&self, max_failures: u32) -> Result<(), LifecycleError> {
        let from = self.state().await;
        if !from.can_stop() {
            return Err(LifecycleError::InvalidTransition { from, event: "stop" });
        }

        if let Err(e) = self.particle.lock().await.on_shutdown().await {
            self.record_failure(true, max_failures).await;
            return Err(LifecycleError::Callback(e));
        }
        self.set_state(ParticleState::Stopped).await;
        tracing::info!(particle = %self.id, "particle stopped");
        Ok(())
    }
}

impl std::fmt::Debug for LiveParticle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveParticle")
            .field("id", &self.id)
            .field("spec", &self.spec.name)
            .field("handles", &self.handles.len())
            .finish()
    }
}

/// Orchestrates particle creation, handle wiring and lifecycle
pub struct ParticleExecutionContext {
    loader: Arc<dyn ParticleLoader>,
    handle_factory: Arc<dyn HandleFactory>,
    services: Services,
    particles: RwLock<HashMap<Id, Arc<LiveParticle>>>,
    max_consecutive_failures: u32,
}

impl ParticleExecutionContext {
    /// Create a context from its three collaborators
    pub fn new(
        loader: Arc<dyn ParticleLoader>,
        handle_factory: Arc<dyn HandleFactory>,
        services: Services,
    ) -> Self {
        Self {
            loader,
            handle_factory,
            services,
            particles: RwLock::new(HashMap::new()),
            max_consecutive_failures: MAX_CONSECUTIVE_FAILURES,
        }
    }

    /// Create a context configured from host configuration
    pub fn from_config(
        loader: Arc<dyn ParticleLoader>,
        handle_factory: Arc<dyn HandleFactory>,
        services: Services,
        config: &crate::config::HostConfig,
    ) -> Self {
        Self::new(loader, handle_factory, services)
            .with_max_consecutive_failures(config.max_consecutive_failures)
    }

    /// Override the consecutive failure cap
    pub fn with_max_consecutive_failures(mut self, cap: u32) -> Self {
        self.max_consecutive_failures = cap;
        self
    }

    /// Resolve, wire and track a particle
    ///
    /// `proxies` maps slot names to the storage proxies backing them; one
    /// handle is created per entry, with direction flags taken from the
    /// spec. Every created handle is registered with its proxy before this
    /// returns. On any error, no particle is returned or tracked.
    pub async fn instantiate_particle(
        &self,
        particle_id: Id,
        spec: ParticleSpec,
        proxies: HashMap<String, Arc<dyn StorageProxy>>,
        ids: &IdGenerator,
    ) -> Result<Arc<LiveParticle>, InstantiationError> {
        // Slot names declared by the spec must all be backed by a proxy
        let mut missing: Vec<String> = spec
            .connection_names()
            .filter(|name| !proxies.contains_key(*name))
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            missing.sort();
            return Err(InstantiationError::SpecMismatch {
                particle: spec.name.clone(),
                missing,
            });
        }

        // Step 1: resolve the implementation; never wire a missing particle
        let factory = self
            .loader
            .load_particle(&spec.location)
            .await
            .map_err(|source| InstantiationError::Loader {
                locator: spec.location.clone(),
                source,
            })?
            .ok_or_else(|| InstantiationError::Resolution {
                locator: spec.location.clone(),
            })?;
        let mut particle =
            factory
                .create_particle()
                .ok_or_else(|| InstantiationError::Resolution {
                    locator: spec.location.clone(),
                })?;
        tracing::debug!(particle = %particle_id, locator = %spec.location, "resolved particle");

        // Step 2: attach spec and shared services
        particle.setup(spec.clone(), self.services.clone());

        // Step 3: build every handle before touching any proxy
        let mut handles = HandleMap::new();
        let mut registrations: Vec<(Arc<dyn StorageProxy>, Handle)> = Vec::new();
        for (name, proxy) in &proxies {
            let handle = self
                .handle_factory
                .handle_for(
                    Arc::clone(proxy),
                    ids,
                    name,
                    &particle_id,
                    spec.is_input(name),
                    spec.is_output(name),
                )
                .map_err(|source| InstantiationError::HandleCreation {
                    name: name.clone(),
                    source,
                })?;
            handles.insert(name.clone(), handle.clone());
            registrations.push((Arc::clone(proxy), handle));
        }

        // Step 4: one atomic assignment of the complete handle map
        particle.bind_handles(handles.clone());

        let particle: SharedParticle = Arc::new(Mutex::new(particle));

        // Step 5: register every (particle, handle) pair with its proxy
        for (proxy, handle) in registrations {
            proxy
                .register(RegistrationTarget::new(
                    Arc::downgrade(&particle),
                    handle.clone(),
                ))
                .await
                .map_err(|source| InstantiationError::Registration {
                    name: handle.name().to_string(),
                    source,
                })?;
        }

        // Step 6: track and return
        let live = Arc::new(LiveParticle {
            id: particle_id.clone(),
            spec,
            particle,
            handles,
            state: RwLock::new(ParticleState::Instantiated),
            consecutive_failures: AtomicU32::new(0),
        });
        let mut particles = self.particles.write().await;
        particles.insert(particle_id, Arc::clone(&live));
        tracing::info!(
            particle = %live.id,
            handles = live.handles.len(),
            "instantiated particle"
        );
        Ok(live)
    }

    /// Start a tracked particle: create, sync readable handles, ready
    pub async fn start_particle(&self, id: &Id) -> Result<(), LifecycleError> {
        let live = self
            .get_particle(id)
            .await
            .ok_or_else(|| LifecycleError::UnknownParticle(id.clone()))?;
        live.start(self.max_consecutive_failures).await
    }

    /// Stop a tracked particle
    pub async fn stop_particle(&self, id: &Id) -> Result<(), LifecycleError> {
        let live = self
            .get_particle(id)
            .await
            .ok_or_else(|| LifecycleError::UnknownParticle(id.clone()))?;
        live.stop(self.max_consecutive_failures).await
    }

    /// Remove a particle from the registry and unwire it
    ///
    /// Stops the particle if it is running, then unregisters every handle
    /// from its proxy. Unregistration is best effort: a proxy that fails to
    /// unregister is logged and skipped so the remaining handles still get
    /// unwired.
    pub async fn discard_particle(&self, id: &Id) -> Result<(), LifecycleError> {
        let live = {
            let mut particles = self.particles.write().await;
            particles
                .remove(id)
                .ok_or_else(|| LifecycleError::UnknownParticle(id.clone()))?
        };

        if live.state().await.can_stop() {
            if let Err(e) = live.stop(self.max_consecutive_failures).await {
                tracing::warn!(particle = %id, error = %e, "shutdown failed during discard");
            }
        }

        for handle in live.handles.values() {
            if let Err(e) = handle.proxy().unregister(handle.id()).await {
                tracing::warn!(
                    particle = %id,
                    handle = %handle.id(),
                    error = %e,
                    "failed to unregister handle during discard"
                );
            }
        }
        tracing::info!(particle = %id, "discarded particle");
        Ok(())
    }

    /// Get a tracked particle by id
    pub async fn get_particle(&self, id: &Id) -> Option<Arc<LiveParticle>> {
        let particles = self.particles.read().await;
        particles.get(id).cloned()
    }

    /// Number of tracked particles
    pub async fn particle_count(&self) -> usize {
        let particles = self.particles.read().await;
        particles.len()
    }

    /// Ids of all tracked particles
    pub async fn particle_ids(&self) -> Vec<Id> {
        let particles = self.particles.read().await;
        particles.keys().cloned().collect()
    }
}

impl std::fmt::Debug for ParticleExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticleExecutionContext")
            .field("max_consecutive_failures", &self.max_consecutive_failures)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::loader::StaticLoader;
    use crate::runtime::proxy::MemoryProxy;
    use async_trait::async_trait;
    use particle_host_sdk::{BasicHandleFactory, Direction, JsonCodec, Particle};
    use serde_json::{json, Value as JsonValue};
    use std::collections::BTreeSet;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// State a probe particle shares with the test
    #[derive(Default)]
    struct ProbeState {
        spec_name: Option<String>,
        has_json: bool,
        handle_names: Option<BTreeSet<String>>,
        events: Vec<String>,
    }

    /// Particle that records everything the host does to it
    struct Probe {
        seen: Arc<StdMutex<ProbeState>>,
        fail_on_create: bool,
    }

    #[async_trait]
    impl Particle for Probe {
        fn setup(&mut self, spec: ParticleSpec, services: Services) {
            let mut seen = self.seen.lock().unwrap();
            seen.spec_name = Some(spec.name);
            seen.has_json = services.json().is_some();
        }

        fn bind_handles(&mut self, handles: HandleMap) {
            let mut seen = self.seen.lock().unwrap();
            seen.handle_names = Some(handles.keys().cloned().collect());
        }

        async fn on_create(&mut self) -> Result<(), particle_host_sdk::ParticleError> {
            if self.fail_on_create {
                return Err(particle_host_sdk::ParticleError::Callback("boom".into()));
            }
            self.seen.lock().unwrap().events.push("create".into());
            Ok(())
        }

        async fn on_ready(&mut self) -> Result<(), particle_host_sdk::ParticleError> {
            self.seen.lock().unwrap().events.push("ready".into());
            Ok(())
        }

        async fn on_shutdown(&mut self) -> Result<(), particle_host_sdk::ParticleError> {
            self.seen.lock().unwrap().events.push("shutdown".into());
            Ok(())
        }

        async fn on_handle_update(
            &mut self,
            handle: &Handle,
        ) -> Result<(), particle_host_sdk::ParticleError> {
            self.seen
                .lock()
                .unwrap()
                .events
                .push(format!("update:{}", handle.name()));
            Ok(())
        }

        async fn on_handle_sync(
            &mut self,
            handle: &Handle,
            all_synced: bool,
        ) -> Result<(), particle_host_sdk::ParticleError> {
            self.seen
                .lock()
                .unwrap()
                .events
                .push(format!("sync:{}:{}", handle.name(), all_synced));
            Ok(())
        }
    }

    /// Context with one registered probe particle under locator "probe"
    async fn probe_context() -> (ParticleExecutionContext, Arc<StdMutex<ProbeState>>) {
        let seen = Arc::new(StdMutex::new(ProbeState::default()));
        let loader = StaticLoader::new();
        let factory_seen = Arc::clone(&seen);
        loader
            .register("probe", move || {
                Some(Box::new(Probe {
                    seen: Arc::clone(&factory_seen),
                    fail_on_create: false,
                }) as Box<dyn Particle>)
            })
            .await;
        let context = ParticleExecutionContext::new(
            Arc::new(loader),
            Arc::new(BasicHandleFactory),
            Services::new().with_json(JsonCodec),
        );
        (context, seen)
    }

    fn in_out_spec() -> ParticleSpec {
        ParticleSpec::new("Probe", "probe")
            .with_connection("input1", Direction::Reads)
            .with_connection("output1", Direction::Writes)
    }

    fn proxies_for(
        pairs: &[(&str, &MemoryProxy)],
    ) -> HashMap<String, Arc<dyn StorageProxy>> {
        pairs
            .iter()
            .map(|(name, proxy)| {
                (
                    name.to_string(),
                    Arc::new((*proxy).clone()) as Arc<dyn StorageProxy>,
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_handle_map_matches_proxy_keys() {
        let (context, seen) = probe_context().await;
        let p1 = MemoryProxy::start("input1");
        let p2 = MemoryProxy::start("output1");
        let ids = IdGenerator::new_session();

        let live = context
            .instantiate_particle(
                Id::from("p0"),
                in_out_spec(),
                proxies_for(&[("input1", &p1), ("output1", &p2)]),
                &ids,
            )
            .await
            .unwrap();

        let keys: BTreeSet<String> = live.handles().keys().cloned().collect();
        let expected: BTreeSet<String> =
            ["input1", "output1"].iter().map(|s| s.to_string()).collect();
        assert_eq!(keys, expected);

        // The particle saw the same complete map, in one assignment
        let seen = seen.lock().unwrap();
        assert_eq!(seen.handle_names.as_ref().unwrap(), &keys);
        assert_eq!(seen.spec_name.as_deref(), Some("Probe"));
        assert!(seen.has_json);
    }

    #[tokio::test]
    async fn test_each_proxy_records_one_registration() {
        let (context, _seen) = probe_context().await;
        let p1 = MemoryProxy::start("input1");
        let p2 = MemoryProxy::start("output1");
        let ids = IdGenerator::new_session();

        context
            .instantiate_particle(
                Id::from("p0"),
                in_out_spec(),
                proxies_for(&[("input1", &p1), ("output1", &p2)]),
                &ids,
            )
            .await
            .unwrap();

        assert_eq!(p1.registration_count().await.unwrap(), 1);
        assert_eq!(p2.registration_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_direction_flags_follow_spec() {
        let (context, _seen) = probe_context().await;
        let p1 = MemoryProxy::start("input1");
        let p2 = MemoryProxy::start("output1");
        let ids = IdGenerator::new_session();

        let live = context
            .instantiate_particle(
                Id::from("p0"),
                in_out_spec(),
                proxies_for(&[("input1", &p1), ("output1", &p2)]),
                &ids,
            )
            .await
            .unwrap();

        let input = &live.handles()["input1"];
        assert!(input.is_input());
        assert!(!input.is_output());
        assert_eq!(input.particle_id(), &Id::from("p0"));

        let output = &live.handles()["output1"];
        assert!(!output.is_input());
        assert!(output.is_output());
    }

    #[tokio::test]
    async fn test_loader_miss_is_an_error_and_mutates_nothing() {
        let loader = StaticLoader::new();
        let context = ParticleExecutionContext::new(
            Arc::new(loader),
            Arc::new(BasicHandleFactory),
            Services::new(),
        );
        let p1 = MemoryProxy::start("input1");
        let ids = IdGenerator::new_session();

        let spec = ParticleSpec::new("Ghost", "ghost").with_connection("input1", Direction::Reads);
        let result = context
            .instantiate_particle(Id::from("p0"), spec, proxies_for(&[("input1", &p1)]), &ids)
            .await;

        assert!(matches!(
            result,
            Err(InstantiationError::Resolution { .. })
        ));
        assert_eq!(p1.registration_count().await.unwrap(), 0);
        assert_eq!(context.particle_count().await, 0);
    }

    #[tokio::test]
    async fn test_factory_producing_nothing_is_a_resolution_error() {
        let loader = StaticLoader::new();
        loader.register("empty", || None).await;
        let context = ParticleExecutionContext::new(
            Arc::new(loader),
            Arc::new(BasicHandleFactory),
            Services::new(),
        );
        let ids = IdGenerator::new_session();

        let result = context
            .instantiate_particle(
                Id::from("p0"),
                ParticleSpec::new("Empty", "empty"),
                HashMap::new(),
                &ids,
            )
            .await;

        assert!(matches!(
            result,
            Err(InstantiationError::Resolution { .. })
        ));
        assert_eq!(context.particle_count().await, 0);
    }

    /// Handle factory that fails for one slot name
    struct FailingHandleFactory {
        bad: &'static str,
    }

    impl HandleFactory for FailingHandleFactory {
        fn handle_for(
            &self,
            proxy: Arc<dyn StorageProxy>,
            ids: &IdGenerator,
            name: &str,
            particle_id: &Id,
            is_input: bool,
            is_output: bool,
        ) -> Result<Handle, HandleError> {
            if name == self.bad {
                return Err(HandleError::InvalidConfig(format!("no handle for {}", name)));
            }
            BasicHandleFactory.handle_for(proxy, ids, name, particle_id, is_input, is_output)
        }
    }

    #[tokio::test]
    async fn test_handle_failure_leaves_every_proxy_untouched() {
        let seen = Arc::new(StdMutex::new(ProbeState::default()));
        let loader = StaticLoader::new();
        let factory_seen = Arc::clone(&seen);
        loader
            .register("probe", move || {
                Some(Box::new(Probe {
                    seen: Arc::clone(&factory_seen),
                    fail_on_create: false,
                }) as Box<dyn Particle>)
            })
            .await;
        let context = ParticleExecutionContext::new(
            Arc::new(loader),
            Arc::new(FailingHandleFactory { bad: "output1" }),
            Services::new(),
        );
        let p1 = MemoryProxy::start("input1");
        let p2 = MemoryProxy::start("output1");
        let ids = IdGenerator::new_session();

        let result = context
            .instantiate_particle(
                Id::from("p0"),
                in_out_spec(),
                proxies_for(&[("input1", &p1), ("output1", &p2)]),
                &ids,
            )
            .await;

        assert!(matches!(
            result,
            Err(InstantiationError::HandleCreation { .. })
        ));
        // All handles are created before any registration, so a failure on
        // any slot means zero registrations everywhere
        assert_eq!(p1.registration_count().await.unwrap(), 0);
        assert_eq!(p2.registration_count().await.unwrap(), 0);
        assert_eq!(context.particle_count().await, 0);
    }

    #[tokio::test]
    async fn test_empty_proxies_wires_an_empty_handle_map() {
        let (context, seen) = probe_context().await;
        let ids = IdGenerator::new_session();

        let live = context
            .instantiate_particle(
                Id::from("p0"),
                ParticleSpec::new("Probe", "probe"),
                HashMap::new(),
                &ids,
            )
            .await
            .unwrap();

        assert!(live.handles().is_empty());
        assert!(seen.lock().unwrap().handle_names.as_ref().unwrap().is_empty());
        assert_eq!(context.particle_count().await, 1);
    }

    #[tokio::test]
    async fn test_spec_slots_must_be_backed_by_proxies() {
        let (context, _seen) = probe_context().await;
        let p1 = MemoryProxy::start("input1");
        let ids = IdGenerator::new_session();

        let result = context
            .instantiate_particle(
                Id::from("p0"),
                in_out_spec(),
                proxies_for(&[("input1", &p1)]),
                &ids,
            )
            .await;

        match result {
            Err(InstantiationError::SpecMismatch { missing, .. }) => {
                assert_eq!(missing, vec!["output1".to_string()]);
            }
            other => panic!("expected SpecMismatch, got {:?}", other.map(|_| ())),
        }
        assert_eq!(p1.registration_count().await.unwrap(), 0);
    }

    /// Proxy whose registration table rejects every entry
    struct RejectingProxy {
        name: String,
    }

    #[async_trait]
    impl StorageProxy for RejectingProxy {
        fn name(&self) -> &str {
            &self.name
        }

        async fn get(&self) -> Result<Option<JsonValue>, ProxyError> {
            Ok(None)
        }

        async fn set(&self, _model: JsonValue) -> Result<(), ProxyError> {
            Ok(())
        }

        async fn clear(&self) -> Result<(), ProxyError> {
            Ok(())
        }

        async fn register(&self, _target: RegistrationTarget) -> Result<(), ProxyError> {
            Err(ProxyError::RegistrationRejected {
                proxy: self.name.clone(),
                reason: "table full".into(),
            })
        }

        async fn unregister(&self, _handle: &Id) -> Result<bool, ProxyError> {
            Ok(false)
        }

        async fn registration_count(&self) -> Result<usize, ProxyError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_registration_failure_produces_no_usable_particle() {
        let (context, _seen) = probe_context().await;
        let ids = IdGenerator::new_session();

        let mut proxies: HashMap<String, Arc<dyn StorageProxy>> = HashMap::new();
        proxies.insert(
            "input1".to_string(),
            Arc::new(RejectingProxy {
                name: "input1".to_string(),
            }),
        );

        let spec = ParticleSpec::new("Probe", "probe").with_connection("input1", Direction::Reads);
        let result = context
            .instantiate_particle(Id::from("p0"), spec, proxies, &ids)
            .await;

        assert!(matches!(
            result,
            Err(InstantiationError::Registration { .. })
        ));
        assert_eq!(context.particle_count().await, 0);
    }

    #[tokio::test]
    async fn test_start_syncs_then_updates_flow_through() {
        let (context, seen) = probe_context().await;
        let p1 = MemoryProxy::start("input1");
        let p2 = MemoryProxy::start("output1");
        p1.set(json!({"seed": true})).await.unwrap();
        let ids = IdGenerator::new_session();
        let id = Id::from("p0");

        context
            .instantiate_particle(
                id.clone(),
                in_out_spec(),
                proxies_for(&[("input1", &p1), ("output1", &p2)]),
                &ids,
            )
            .await
            .unwrap();

        context.start_particle(&id).await.unwrap();
        assert_eq!(
            context.get_particle(&id).await.unwrap().state().await,
            ParticleState::Started
        );
        {
            let seen = seen.lock().unwrap();
            assert_eq!(
                seen.events,
                vec!["create", "sync:input1:true", "ready"]
            );
        }

        // A write on the input proxy reaches the particle through its handle
        p1.set(json!({"seed": false})).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(seen
            .lock()
            .unwrap()
            .events
            .contains(&"update:input1".to_string()));

        context.stop_particle(&id).await.unwrap();
        assert_eq!(
            context.get_particle(&id).await.unwrap().state().await,
            ParticleState::Stopped
        );
    }

    #[tokio::test]
    async fn test_discard_unregisters_and_untracks() {
        let (context, _seen) = probe_context().await;
        let p1 = MemoryProxy::start("input1");
        let p2 = MemoryProxy::start("output1");
        let ids = IdGenerator::new_session();
        let id = Id::from("p0");

        context
            .instantiate_particle(
                id.clone(),
                in_out_spec(),
                proxies_for(&[("input1", &p1), ("output1", &p2)]),
                &ids,
            )
            .await
            .unwrap();
        assert_eq!(p1.registration_count().await.unwrap(), 1);

        context.discard_particle(&id).await.unwrap();

        assert_eq!(context.particle_count().await, 0);
        assert_eq!(p1.registration_count().await.unwrap(), 0);
        assert_eq!(p2.registration_count().await.unwrap(), 0);
        assert!(matches!(
            context.discard_particle(&id).await,
            Err(LifecycleError::UnknownParticle(_))
        ));
    }

    #[tokio::test]
    async fn test_consecutive_failures_cap_the_particle() {
        let loader = StaticLoader::new();
        let seen = Arc::new(StdMutex::new(ProbeState::default()));
        let factory_seen = Arc::clone(&seen);
        loader
            .register("flaky", move || {
                Some(Box::new(Probe {
                    seen: Arc::clone(&factory_seen),
                    fail_on_create: true,
                }) as Box<dyn Particle>)
            })
            .await;
        let context = ParticleExecutionContext::new(
            Arc::new(loader),
            Arc::new(BasicHandleFactory),
            Services::new(),
        )
        .with_max_consecutive_failures(2);
        let ids = IdGenerator::new_session();
        let id = Id::from("p0");

        context
            .instantiate_particle(
                id.clone(),
                ParticleSpec::new("Flaky", "flaky"),
                HashMap::new(),
                &ids,
            )
            .await
            .unwrap();

        assert!(matches!(
            context.start_particle(&id).await,
            Err(LifecycleError::Callback(_))
        ));
        let live = context.get_particle(&id).await.unwrap();
        assert_eq!(live.state().await, ParticleState::FailedNeverStarted);

        assert!(matches!(
            context.start_particle(&id).await,
            Err(LifecycleError::Callback(_))
        ));
        assert_eq!(live.state().await, ParticleState::MaxFailed);

        // There is no restart out of MaxFailed
        assert!(matches!(
            context.start_particle(&id).await,
            Err(LifecycleError::MaxFailed(_))
        ));
    }
}
