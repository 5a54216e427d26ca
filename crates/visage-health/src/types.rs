//! Health model types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Monitored component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    FaceModel,
    VectorIndex,
    TokenAuthority,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::FaceModel => "face_model",
            Component::VectorIndex => "vector_index",
            Component::TokenAuthority => "token_authority",
        }
    }
}

/// Health status, ordered best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unavailable,
}

/// Current health of one component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    pub message: String,
    pub last_checked: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Tool availability derived from component health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub can_register: bool,
    pub can_recognize: bool,
    pub can_queue_registration: bool,
}

/// Point-in-time view of the whole registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub overall: HealthStatus,
    pub components: BTreeMap<Component, ComponentHealth>,
    pub capabilities: Capabilities,
    pub queued_count: usize,
}

/// A registration accepted while the vector index is degraded.
///
/// FIFO-ordered and in-memory only: the queue does not survive a restart.
#[derive(Debug, Clone)]
pub struct QueuedRegistration {
    pub ts: String,
    pub name: String,
    pub image_data: String,
    pub metadata: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_orders_worst_last() {
        assert!(HealthStatus::Healthy < HealthStatus::Degraded);
        assert!(HealthStatus::Degraded < HealthStatus::Unavailable);
    }

    #[test]
    fn test_component_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Component::VectorIndex).unwrap(),
            "\"vector_index\""
        );
    }
}
