//! Host configuration

use std::env;
use std::path::PathBuf;

use crate::runtime::lifecycle::MAX_CONSECUTIVE_FAILURES;
use crate::runtime::proxy::memory::DEFAULT_PROXY_BUFFER;

/// Host configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Directory for compiled particle libraries
    pub particles_dir: PathBuf,

    /// Consecutive callback failures before a particle is permanently failed
    pub max_consecutive_failures: u32,

    /// Command buffer size for storage proxy actors
    pub proxy_buffer: usize,
}

impl HostConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            particles_dir: env::var("PARTICLE_HOST_PARTICLES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./particles")),

            max_consecutive_failures: env::var("PARTICLE_HOST_MAX_CONSECUTIVE_FAILURES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(MAX_CONSECUTIVE_FAILURES),

            proxy_buffer: env::var("PARTICLE_HOST_PROXY_BUFFER")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_PROXY_BUFFER),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
