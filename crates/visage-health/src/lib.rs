//! Health registry and degraded-mode queueing.
//!
//! Tracks per-component health (`face_model`, `vector_index`,
//! `token_authority`), derives the capability map the tool server gates on,
//! notifies registered callbacks on transitions, and holds the FIFO of
//! registrations accepted while the vector index is degraded.

pub mod registry;
pub mod types;

pub use registry::{HealthRegistry, StateChangeCallback};
pub use types::{
    Capabilities, Component, ComponentHealth, HealthSnapshot, HealthStatus, QueuedRegistration,
};
