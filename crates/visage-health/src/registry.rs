//! Process-wide health registry.

use crate::types::*;
use chrono::Utc;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Callback invoked on a component status change: `(component, old, new)`.
pub type StateChangeCallback = Arc<dyn Fn(Component, HealthStatus, HealthStatus) + Send + Sync>;

struct RegistryState {
    components: BTreeMap<Component, ComponentHealth>,
    queue: VecDeque<QueuedRegistration>,
    callbacks: Vec<StateChangeCallback>,
}

/// Shared registry of component health, derived capabilities and the
/// degraded-mode registration queue.
#[derive(Clone)]
pub struct HealthRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    /// All components start `Unavailable` until their first probe reports in.
    pub fn new() -> Self {
        let mut components = BTreeMap::new();
        for component in [
            Component::FaceModel,
            Component::VectorIndex,
            Component::TokenAuthority,
        ] {
            components.insert(
                component,
                ComponentHealth {
                    status: HealthStatus::Unavailable,
                    message: "Not initialized".to_string(),
                    last_checked: Utc::now().to_rfc3339(),
                    error: None,
                },
            );
        }

        Self {
            state: Arc::new(RwLock::new(RegistryState {
                components,
                queue: VecDeque::new(),
                callbacks: Vec::new(),
            })),
        }
    }

    /// Record a component transition. Registered callbacks fire on a spawned
    /// task when the status actually changed, so the caller never blocks on
    /// them.
    pub async fn update(
        &self,
        component: Component,
        status: HealthStatus,
        message: &str,
        error: Option<String>,
    ) {
        let (old_status, callbacks) = {
            let mut state = self.state.write().await;
            let old_status = state
                .components
                .get(&component)
                .map(|h| h.status)
                .unwrap_or(HealthStatus::Unavailable);

            state.components.insert(
                component,
                ComponentHealth {
                    status,
                    message: message.to_string(),
                    last_checked: Utc::now().to_rfc3339(),
                    error,
                },
            );

            let callbacks = if old_status != status {
                state.callbacks.clone()
            } else {
                Vec::new()
            };
            (old_status, callbacks)
        };

        if old_status != status {
            info!(
                component = component.as_str(),
                old = ?old_status,
                new = ?status,
                "Health state change"
            );
            for callback in callbacks {
                tokio::spawn(async move {
                    callback(component, old_status, status);
                });
            }
        }
    }

    /// Register a state-change callback. Callbacks run on their own task and
    /// must not assume they hold any registry lock.
    pub async fn register_callback(&self, callback: StateChangeCallback) {
        self.state.write().await.callbacks.push(callback);
    }

    /// Current status of one component.
    pub async fn status_of(&self, component: Component) -> HealthStatus {
        self.state
            .read()
            .await
            .components
            .get(&component)
            .map(|h| h.status)
            .unwrap_or(HealthStatus::Unavailable)
    }

    /// Human-readable message for one component, for `unavailable` errors.
    pub async fn message_of(&self, component: Component) -> String {
        self.state
            .read()
            .await
            .components
            .get(&component)
            .map(|h| h.message.clone())
            .unwrap_or_else(|| "Not initialized".to_string())
    }

    /// Derived capability map.
    pub async fn capabilities(&self) -> Capabilities {
        let state = self.state.read().await;
        Self::derive_capabilities(&state.components)
    }

    fn derive_capabilities(components: &BTreeMap<Component, ComponentHealth>) -> Capabilities {
        let face = components
            .get(&Component::FaceModel)
            .map(|h| h.status)
            .unwrap_or(HealthStatus::Unavailable);
        let index = components
            .get(&Component::VectorIndex)
            .map(|h| h.status)
            .unwrap_or(HealthStatus::Unavailable);

        Capabilities {
            can_register: face == HealthStatus::Healthy
                && matches!(index, HealthStatus::Healthy | HealthStatus::Degraded),
            can_recognize: face == HealthStatus::Healthy && index == HealthStatus::Healthy,
            can_queue_registration: face == HealthStatus::Healthy
                && index == HealthStatus::Degraded,
        }
    }

    /// Full point-in-time snapshot.
    pub async fn snapshot(&self) -> HealthSnapshot {
        let state = self.state.read().await;
        let overall = state
            .components
            .values()
            .map(|h| h.status)
            .max()
            .unwrap_or(HealthStatus::Unavailable);

        HealthSnapshot {
            overall,
            components: state.components.clone(),
            capabilities: Self::derive_capabilities(&state.components),
            queued_count: state.queue.len(),
        }
    }

    /// Enqueue a registration for later processing. Returns the 1-based
    /// queue position.
    pub async fn enqueue(&self, registration: QueuedRegistration) -> usize {
        let mut state = self.state.write().await;
        state.queue.push_back(registration);
        let position = state.queue.len();
        info!(queue_len = position, "Queued registration for degraded index");
        position
    }

    /// Drain the queue in enqueue order.
    pub async fn drain(&self) -> Vec<QueuedRegistration> {
        let mut state = self.state.write().await;
        state.queue.drain(..).collect()
    }

    /// Drop all queued registrations.
    pub async fn clear_queue(&self) {
        let mut state = self.state.write().await;
        let count = state.queue.len();
        state.queue.clear();
        if count > 0 {
            info!(count, "Cleared registration queue");
        }
    }

    pub async fn queued_count(&self) -> usize {
        self.state.read().await.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn queued(name: &str) -> QueuedRegistration {
        QueuedRegistration {
            ts: Utc::now().to_rfc3339(),
            name: name.to_string(),
            image_data: "aGVsbG8=".to_string(),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_initial_state_is_unavailable() {
        let registry = HealthRegistry::new();
        let snapshot = registry.snapshot().await;

        assert_eq!(snapshot.overall, HealthStatus::Unavailable);
        assert!(!snapshot.capabilities.can_register);
        assert!(!snapshot.capabilities.can_recognize);
    }

    #[tokio::test]
    async fn test_capability_derivation() {
        let registry = HealthRegistry::new();
        registry
            .update(Component::FaceModel, HealthStatus::Healthy, "ok", None)
            .await;
        registry
            .update(Component::VectorIndex, HealthStatus::Healthy, "ok", None)
            .await;
        registry
            .update(Component::TokenAuthority, HealthStatus::Healthy, "ok", None)
            .await;

        let caps = registry.capabilities().await;
        assert!(caps.can_register);
        assert!(caps.can_recognize);
        assert!(!caps.can_queue_registration);

        registry
            .update(
                Component::VectorIndex,
                HealthStatus::Degraded,
                "store locked",
                None,
            )
            .await;

        let caps = registry.capabilities().await;
        assert!(caps.can_register);
        assert!(!caps.can_recognize);
        assert!(caps.can_queue_registration);

        registry
            .update(Component::VectorIndex, HealthStatus::Unavailable, "gone", None)
            .await;

        let caps = registry.capabilities().await;
        assert!(!caps.can_register);
        assert!(!caps.can_recognize);
        assert!(!caps.can_queue_registration);
    }

    #[tokio::test]
    async fn test_overall_is_worst_component() {
        let registry = HealthRegistry::new();
        for c in [
            Component::FaceModel,
            Component::VectorIndex,
            Component::TokenAuthority,
        ] {
            registry.update(c, HealthStatus::Healthy, "ok", None).await;
        }
        assert_eq!(registry.snapshot().await.overall, HealthStatus::Healthy);

        registry
            .update(Component::VectorIndex, HealthStatus::Degraded, "slow", None)
            .await;
        assert_eq!(registry.snapshot().await.overall, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_callback_fires_only_on_change() {
        let registry = HealthRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        registry
            .register_callback(Arc::new(move |_, _, _| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }))
            .await;

        registry
            .update(Component::VectorIndex, HealthStatus::Healthy, "ok", None)
            .await;
        registry
            .update(Component::VectorIndex, HealthStatus::Healthy, "still ok", None)
            .await;

        // Give the spawned callback task a moment
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_queue_fifo_order() {
        let registry = HealthRegistry::new();
        assert_eq!(registry.enqueue(queued("alice")).await, 1);
        assert_eq!(registry.enqueue(queued("bob")).await, 2);
        assert_eq!(registry.queued_count().await, 2);

        let drained = registry.drain().await;
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].name, "alice");
        assert_eq!(drained[1].name, "bob");
        assert_eq!(registry.queued_count().await, 0);
    }
}
