//! Handles - typed bindings between a particle and one storage slot
//!
//! A handle carries its generated id, the slot name, the owning particle's
//! id, and direction flags. Reads require the input flag and writes the
//! output flag; the underlying proxy does not enforce direction, the handle
//! does.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value as JsonValue;

use crate::error::HandleError;
use crate::id::{Id, IdGenerator};
use crate::storage::StorageProxy;

/// Mapping from slot name to handle, as attached to a particle
pub type HandleMap = HashMap<String, Handle>;

struct HandleInner {
    id: Id,
    name: String,
    particle_id: Id,
    is_input: bool,
    is_output: bool,
    proxy: Arc<dyn StorageProxy>,
}

/// A typed binding between one particle and one storage slot
///
/// Cheap to clone; clones share the same identity and proxy.
#[derive(Clone)]
pub struct Handle {
    inner: Arc<HandleInner>,
}

impl Handle {
    /// Create a handle bound to the given proxy
    pub fn new(
        proxy: Arc<dyn StorageProxy>,
        id: Id,
        name: &str,
        particle_id: &Id,
        is_input: bool,
        is_output: bool,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id,
                name: name.to_string(),
                particle_id: particle_id.clone(),
                is_input,
                is_output,
                proxy,
            }),
        }
    }

    /// Generated id of this handle
    pub fn id(&self) -> &Id {
        &self.inner.id
    }

    /// Slot name this handle is bound to
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Id of the particle that owns this handle
    pub fn particle_id(&self) -> &Id {
        &self.inner.particle_id
    }

    /// Whether this handle receives data
    pub fn is_input(&self) -> bool {
        self.inner.is_input
    }

    /// Whether this handle may store data
    pub fn is_output(&self) -> bool {
        self.inner.is_output
    }

    /// The proxy this handle is bound to
    pub fn proxy(&self) -> &Arc<dyn StorageProxy> {
        &self.inner.proxy
    }

    /// Read the slot's current model. Requires the input flag.
    pub async fn read(&self) -> Result<Option<JsonValue>, HandleError> {
        if !self.inner.is_input {
            return Err(HandleError::NotReadable(self.inner.name.clone()));
        }
        self.inner.proxy.get().await.map_err(|source| HandleError::Proxy {
            name: self.inner.name.clone(),
            source,
        })
    }

    /// Read the slot's current model as a typed value
    pub async fn read_as<T: DeserializeOwned>(&self) -> Result<Option<T>, HandleError> {
        match self.read().await? {
            Some(model) => Ok(Some(serde_json::from_value(model)?)),
            None => Ok(None),
        }
    }

    /// Replace the slot's model. Requires the output flag.
    pub async fn write(&self, model: JsonValue) -> Result<(), HandleError> {
        if !self.inner.is_output {
            return Err(HandleError::NotWritable(self.inner.name.clone()));
        }
        self.inner.proxy.set(model).await.map_err(|source| HandleError::Proxy {
            name: self.inner.name.clone(),
            source,
        })
    }

    /// Replace the slot's model with a typed value
    pub async fn write_as<T: Serialize>(&self, value: &T) -> Result<(), HandleError> {
        self.write(serde_json::to_value(value)?).await
    }

    /// Drop the slot's model. Requires the output flag.
    pub async fn clear(&self) -> Result<(), HandleError> {
        if !self.inner.is_output {
            return Err(HandleError::NotWritable(self.inner.name.clone()));
        }
        self.inner.proxy.clear().await.map_err(|source| HandleError::Proxy {
            name: self.inner.name.clone(),
            source,
        })
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("particle_id", &self.inner.particle_id)
            .field("is_input", &self.inner.is_input)
            .field("is_output", &self.inner.is_output)
            .field("proxy", &self.inner.proxy.name())
            .finish()
    }
}

/// Seam through which the host builds handles
pub trait HandleFactory: Send + Sync {
    fn handle_for(
        &self,
        proxy: Arc<dyn StorageProxy>,
        ids: &IdGenerator,
        name: &str,
        particle_id: &Id,
        is_input: bool,
        is_output: bool,
    ) -> Result<Handle, HandleError>;
}

/// Default handle factory: mints a component id per handle and binds it
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicHandleFactory;

impl HandleFactory for BasicHandleFactory {
    fn handle_for(
        &self,
        proxy: Arc<dyn StorageProxy>,
        ids: &IdGenerator,
        name: &str,
        particle_id: &Id,
        is_input: bool,
        is_output: bool,
    ) -> Result<Handle, HandleError> {
        let id = ids.next_component_id(name);
        Ok(Handle::new(proxy, id, name, particle_id, is_input, is_output))
    }
}
