//! In-memory storage proxy
//!
//! An actor-backed proxy holding a single optional JSON model. Writes
//! replace the model and notify every registered readable handle through
//! `on_handle_update`. The registration table is keyed by handle id;
//! entries whose particle has been dropped are pruned before notifying.
//!
//! Notifications are delivered from spawned tasks, never inline in the
//! actor loop, so a particle callback may call back into the proxy (for
//! example `handle.read()`) without deadlocking the actor.

use std::collections::HashMap;

use serde_json::Value as JsonValue;
use tokio::sync::oneshot;

use particle_host_sdk::{Id, Particle, ProxyError, RegistrationTarget};

use crate::runtime::actor::{spawn_actor, ActorHandle, ActorMessage};

/// Default command buffer size for proxy actors
pub const DEFAULT_PROXY_BUFFER: usize = 64;

/// Commands sent to the proxy actor
enum ProxyCommand {
    Get {
        reply: oneshot::Sender<Option<JsonValue>>,
    },
    Set {
        model: JsonValue,
        reply: oneshot::Sender<()>,
    },
    Clear {
        reply: oneshot::Sender<()>,
    },
    Register {
        target: RegistrationTarget,
        reply: oneshot::Sender<()>,
    },
    Unregister {
        handle: Id,
        reply: oneshot::Sender<bool>,
    },
    RegistrationCount {
        reply: oneshot::Sender<usize>,
    },
}

impl ActorMessage for ProxyCommand {}

/// In-memory storage proxy handle - cheap to clone
#[derive(Clone)]
pub struct MemoryProxy {
    name: String,
    handle: ActorHandle<ProxyCommand>,
}

impl MemoryProxy {
    /// Start a proxy actor with the default command buffer
    pub fn start(name: &str) -> Self {
        Self::start_with_buffer(name, DEFAULT_PROXY_BUFFER)
    }

    /// Start a proxy actor sized from host configuration
    pub fn from_config(name: &str, config: &crate::config::HostConfig) -> Self {
        Self::start_with_buffer(name, config.proxy_buffer)
    }

    /// Start a proxy actor with an explicit command buffer size
    pub fn start_with_buffer(name: &str, buffer: usize) -> Self {
        let actor_name = name.to_string();
        let handle = spawn_actor(buffer, move |rx| proxy_actor(actor_name, rx));
        Self {
            name: name.to_string(),
            handle,
        }
    }

    async fn send(&self, cmd: ProxyCommand) -> Result<(), ProxyError> {
        self.handle
            .send(cmd)
            .await
            .map_err(|_| ProxyError::Closed(self.name.clone()))
    }

    async fn recv<T>(&self, rx: oneshot::Receiver<T>) -> Result<T, ProxyError> {
        rx.await.map_err(|_| ProxyError::NoResponse(self.name.clone()))
    }
}

impl std::fmt::Debug for MemoryProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryProxy")
            .field("name", &self.name)
            .field("is_alive", &self.handle.is_alive())
            .finish()
    }
}

#[async_trait::async_trait]
impl particle_host_sdk::StorageProxy for MemoryProxy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self) -> Result<Option<JsonValue>, ProxyError> {
        let (tx, rx) = oneshot::channel();
        self.send(ProxyCommand::Get { reply: tx }).await?;
        self.recv(rx).await
    }

    async fn set(&self, model: JsonValue) -> Result<(), ProxyError> {
        let (tx, rx) = oneshot::channel();
        self.send(ProxyCommand::Set { model, reply: tx }).await?;
        self.recv(rx).await
    }

    async fn clear(&self) -> Result<(), ProxyError> {
        let (tx, rx) = oneshot::channel();
        self.send(ProxyCommand::Clear { reply: tx }).await?;
        self.recv(rx).await
    }

    async fn register(&self, target: RegistrationTarget) -> Result<(), ProxyError> {
        let (tx, rx) = oneshot::channel();
        self.send(ProxyCommand::Register { target, reply: tx }).await?;
        self.recv(rx).await
    }

    async fn unregister(&self, handle: &Id) -> Result<bool, ProxyError> {
        let (tx, rx) = oneshot::channel();
        self.send(ProxyCommand::Unregister {
            handle: handle.clone(),
            reply: tx,
        })
        .await?;
        self.recv(rx).await
    }

    async fn registration_count(&self) -> Result<usize, ProxyError> {
        let (tx, rx) = oneshot::channel();
        self.send(ProxyCommand::RegistrationCount { reply: tx }).await?;
        self.recv(rx).await
    }
}

/// The proxy actor loop
async fn proxy_actor(name: String, mut rx: tokio::sync::mpsc::Receiver<ProxyCommand>) {
    let mut model: Option<JsonValue> = None;
    let mut registrations: HashMap<Id, RegistrationTarget> = HashMap::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            ProxyCommand::Get { reply } => {
                let _ = reply.send(model.clone());
            }
            ProxyCommand::Set { model: new, reply } => {
                model = Some(new);
                let _ = reply.send(());
                notify_update(&name, &mut registrations);
            }
            ProxyCommand::Clear { reply } => {
                model = None;
                let _ = reply.send(());
                notify_update(&name, &mut registrations);
            }
            ProxyCommand::Register { target, reply } => {
                tracing::debug!(
                    proxy = %name,
                    handle = %target.handle.id(),
                    particle = %target.handle.particle_id(),
                    "registered handle"
                );
                // Last registration wins for a given handle id
                registrations.insert(target.handle.id().clone(), target);
                let _ = reply.send(());
            }
            ProxyCommand::Unregister { handle, reply } => {
                let removed = registrations.remove(&handle).is_some();
                let _ = reply.send(removed);
            }
            ProxyCommand::RegistrationCount { reply } => {
                registrations.retain(|_, t| t.particle.strong_count() > 0);
                let _ = reply.send(registrations.len());
            }
        }
    }
}

/// Deliver `on_handle_update` to every live, readable registration
fn notify_update(proxy_name: &str, registrations: &mut HashMap<Id, RegistrationTarget>) {
    registrations.retain(|_, t| t.particle.strong_count() > 0);

    for target in registrations.values() {
        if !target.handle.is_input() {
            continue;
        }
        let Some(particle) = target.particle.upgrade() else {
            continue;
        };
        let handle = target.handle.clone();
        let proxy_name = proxy_name.to_string();
        tokio::spawn(async move {
            let mut particle = particle.lock().await;
            if let Err(e) = particle.on_handle_update(&handle).await {
                tracing::warn!(
                    proxy = %proxy_name,
                    handle = %handle.id(),
                    error = %e,
                    "particle update callback failed"
                );
            }
        });
    }
}
