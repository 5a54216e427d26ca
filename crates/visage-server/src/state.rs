use crate::config::Config;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use visage_audit::{AuditConfig, AuditEvent, AuditEventType, AuditOutcome, AuditSink};
use visage_core::{IdentityConfig, IdentityService};
use visage_crypto::{ClientRegistry, RsaKeyPair, TokenAuthority};
use visage_face::{FaceAnalyzer, HashEmbedBackend};
use visage_health::{Component, HealthRegistry, HealthStatus};
use visage_index::VectorIndex;

/// Application state shared across all tool handlers
pub struct AppState {
    pub config: Config,
    pub authority: TokenAuthority,
    pub service: Arc<IdentityService>,
    pub health: HealthRegistry,
    pub audit: AuditSink,
}

impl AppState {
    /// Initialize every subsystem. Key generation, face model warm-up and
    /// an unwritable audit directory are fatal; a faulted vector index is
    /// absorbed as degraded/unavailable health instead.
    pub async fn new(config: Config) -> Result<Arc<Self>> {
        let keypair = RsaKeyPair::load_or_generate(&config.keys_dir)
            .context("RSA keypair initialization failed")?;
        let registry = ClientRegistry::open(config.clients_file.clone())
            .context("client registry initialization failed")?;
        let authority = TokenAuthority::new(&keypair, registry, config.token_ttl_secs)
            .context("token authority initialization failed")?;

        let mut audit_config = AuditConfig::new(config.audit_dir.clone());
        audit_config.retention_days = config.audit_retention_days;
        audit_config.redact_pii = config.redact_pii;
        let audit = AuditSink::open(audit_config).context("audit directory not writable")?;

        let health = HealthRegistry::new();
        health
            .update(
                Component::TokenAuthority,
                HealthStatus::Healthy,
                "token authority operational",
                None,
            )
            .await;

        // Face model load failure is a fatal startup error
        let analyzer = Arc::new(FaceAnalyzer::new(Arc::new(HashEmbedBackend::new())));
        analyzer.warm_up().context("face model load failed")?;
        health
            .update(
                Component::FaceModel,
                HealthStatus::Healthy,
                &format!("face backend '{}' loaded", analyzer.backend_name()),
                None,
            )
            .await;

        // The vector index may open degraded; registrations queue until it
        // recovers
        let index = match VectorIndex::open(&config.index_dir) {
            Ok(index) => {
                let message = if index.reconciled_orphans() > 0 {
                    format!(
                        "vector index operational ({} orphan rows reconciled)",
                        index.reconciled_orphans()
                    )
                } else {
                    "vector index operational".to_string()
                };
                health
                    .update(Component::VectorIndex, HealthStatus::Healthy, &message, None)
                    .await;
                Some(Arc::new(index))
            }
            Err(e) if e.is_recoverable() => {
                warn!("Vector index degraded at startup: {}", e);
                health
                    .update(
                        Component::VectorIndex,
                        HealthStatus::Degraded,
                        "vector index degraded - queueing registrations",
                        Some(e.to_string()),
                    )
                    .await;
                None
            }
            Err(e) => {
                warn!("Vector index unavailable at startup: {}", e);
                health
                    .update(
                        Component::VectorIndex,
                        HealthStatus::Unavailable,
                        "vector index unavailable",
                        Some(e.to_string()),
                    )
                    .await;
                None
            }
        };
        let index_missing = index.is_none();

        let service = Arc::new(IdentityService::new(
            analyzer,
            index,
            health.clone(),
            audit.clone(),
            IdentityConfig {
                default_threshold: config.distance_threshold,
            },
        ));

        // Degraded -> Healthy drains the registration queue
        let drain_service = service.clone();
        health
            .register_callback(Arc::new(move |component, old, new| {
                if component == Component::VectorIndex
                    && old == HealthStatus::Degraded
                    && new == HealthStatus::Healthy
                {
                    let service = drain_service.clone();
                    tokio::spawn(async move {
                        service.process_queue().await;
                    });
                }
            }))
            .await;

        let state = Arc::new(Self {
            config,
            authority,
            service,
            health,
            audit,
        });

        if index_missing {
            state.clone().spawn_index_recovery();
        }

        state.audit.log(AuditEvent::new(
            AuditEventType::ServerStart,
            AuditOutcome::Success,
            "server",
        ));
        info!("Server state initialized");
        Ok(state)
    }

    /// Periodically retry opening a faulted vector index. On success the
    /// index is attached and health flips, which triggers the queue drain.
    fn spawn_index_recovery(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(10));
            loop {
                interval.tick().await;
                if self.health.status_of(Component::VectorIndex).await == HealthStatus::Healthy {
                    break;
                }
                match VectorIndex::open(&self.config.index_dir) {
                    Ok(index) => {
                        info!("Vector index recovered");
                        self.service.attach_index(Arc::new(index)).await;
                        self.health
                            .update(
                                Component::VectorIndex,
                                HealthStatus::Healthy,
                                "vector index recovered",
                                None,
                            )
                            .await;
                        break;
                    }
                    Err(e) => {
                        warn!("Vector index still down: {}", e);
                    }
                }
            }
        });
    }
}
