//! Uppercase particle
//!
//! Reads the `text` slot and writes the uppercased string to the `result`
//! slot whenever the input changes. Compiled as a particle library and
//! loaded by the host through its `particle_entry` export.

use particle_host_sdk::prelude::*;

#[derive(Default)]
struct Uppercase {
    handles: Option<HandleMap>,
}

#[async_trait]
impl Particle for Uppercase {
    fn bind_handles(&mut self, handles: HandleMap) {
        self.handles = Some(handles);
    }

    async fn on_handle_update(&mut self, handle: &Handle) -> Result<(), ParticleError> {
        if handle.name() != "text" {
            return Ok(());
        }
        let Some(handles) = &self.handles else {
            return Ok(());
        };

        if let Some(JsonValue::String(text)) = handle.read().await? {
            if let Some(result) = handles.get("result") {
                result.write(json!(text.to_uppercase())).await?;
            }
        }
        Ok(())
    }

    async fn on_handle_sync(
        &mut self,
        handle: &Handle,
        _all_synced: bool,
    ) -> Result<(), ParticleError> {
        // Initial model counts as an update
        self.on_handle_update(handle).await
    }
}

#[derive(Default)]
struct UppercaseFactory;

impl ParticleFactory for UppercaseFactory {
    fn create_particle(&self) -> Option<Box<dyn Particle>> {
        Some(Box::new(Uppercase::default()))
    }
}

particle_host_sdk::register_particle!(UppercaseFactory);
