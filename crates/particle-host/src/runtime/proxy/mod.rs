//! Storage proxy implementations
//!
//! The SDK defines the [`StorageProxy`](particle_host_sdk::StorageProxy)
//! port; this module provides the host's implementations. Currently one:
//! the actor-backed in-memory proxy.

pub mod memory;

pub use memory::MemoryProxy;
