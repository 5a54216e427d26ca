//! Identity service operations.

use crate::errors::*;
use crate::validate;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use visage_audit::{AuditEvent, AuditEventType, AuditOutcome, AuditSink, BiometricSummary};
use visage_face::{FaceAnalysis, FaceAnalyzer};
use visage_health::{Component, HealthRegistry, HealthStatus, QueuedRegistration};
use visage_index::{ListPage, UserProfile, VectorIndex};

/// Identity service tuning.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Default cosine-distance cap for recognition.
    pub default_threshold: f32,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            default_threshold: 0.40,
        }
    }
}

/// Terminal result of a registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegisterOutcome {
    Registered { user: UserProfile },
    Queued { name: String, queue_position: usize },
    AlreadyExists { user: UserProfile },
}

/// Terminal result of a recognition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecognizeOutcome {
    Recognized {
        user: UserProfile,
        distance: f32,
        threshold: f32,
    },
    NotRecognized {
        #[serde(skip_serializing_if = "Option::is_none")]
        distance: Option<f32>,
        threshold: f32,
    },
}

/// Highest-recognition-count user, for stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MostActiveUser {
    pub user_id: String,
    pub name: String,
    pub recognition_count: u64,
}

/// Database statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    pub count: usize,
    pub dims: usize,
    pub index_type: String,
    pub total_recognitions: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_active_user: Option<MostActiveUser>,
}

/// Per-item result of a queue drain.
#[derive(Debug, Clone)]
pub struct DrainReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// User-facing similarity percentage for voice output only. The matching
/// decision always uses raw cosine distance.
pub fn similarity_percent(distance: f32) -> f32 {
    ((1.0 - distance / 2.0) * 100.0).clamp(0.0, 100.0)
}

/// Orchestrates face analysis, the vector index, health and audit into the
/// user lifecycle operations exposed by the tool server.
pub struct IdentityService {
    face: Arc<FaceAnalyzer>,
    index: RwLock<Option<Arc<VectorIndex>>>,
    health: HealthRegistry,
    audit: AuditSink,
    config: IdentityConfig,
    // Serializes register/update/delete/drain; reads stay concurrent
    write_lock: Mutex<()>,
}

impl IdentityService {
    pub fn new(
        face: Arc<FaceAnalyzer>,
        index: Option<Arc<VectorIndex>>,
        health: HealthRegistry,
        audit: AuditSink,
        config: IdentityConfig,
    ) -> Self {
        Self {
            face,
            index: RwLock::new(index),
            health,
            audit,
            config,
            write_lock: Mutex::new(()),
        }
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn default_threshold(&self) -> f32 {
        self.config.default_threshold
    }

    /// Attach a (re)opened vector index. The caller flips health to Healthy
    /// afterwards, which triggers the queue drain callback.
    pub async fn attach_index(&self, index: Arc<VectorIndex>) {
        *self.index.write().await = Some(index);
    }

    async fn with_index(&self) -> Result<Arc<VectorIndex>> {
        self.index
            .read()
            .await
            .clone()
            .ok_or_else(|| IdentityError::Unavailable("vector index is offline".to_string()))
    }

    fn analyze(&self, image_data: &str) -> Result<FaceAnalysis> {
        let bytes = validate::decode_image_data(image_data)?;
        Ok(self.face.analyze(&bytes)?)
    }

    fn biometric_summary(analysis: &FaceAnalysis) -> BiometricSummary {
        BiometricSummary {
            detection_score: Some(analysis.detection_score),
            face_quality: Some(analysis.quality.overall(analysis.detection_score)),
            num_faces_detected: Some(analysis.num_faces),
        }
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register a new user from a face image.
    ///
    /// Degraded index: the request is queued and `Queued` returned. A second
    /// registration under an existing name slug returns `AlreadyExists`.
    pub async fn register(
        &self,
        client_id: &str,
        name: &str,
        image_data: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<RegisterOutcome> {
        let name = validate::validate_name(name)?;
        validate::validate_metadata(&metadata)?;

        let analysis = match self.analyze(image_data) {
            Ok(a) => a,
            Err(e) => {
                self.audit.log(
                    AuditEvent::new(AuditEventType::Registration, AuditOutcome::Failure, client_id)
                        .with_info("name", &name)
                        .with_error(&e.to_string()),
                );
                return Err(e);
            }
        };

        let _write = self.write_lock.lock().await;

        // Degraded index accepts the write into the queue
        if self.health.status_of(Component::VectorIndex).await == HealthStatus::Degraded {
            let position = self
                .health
                .enqueue(QueuedRegistration {
                    ts: Utc::now().to_rfc3339(),
                    name: name.clone(),
                    image_data: image_data.to_string(),
                    metadata,
                })
                .await;

            self.audit.log(
                AuditEvent::new(AuditEventType::Registration, AuditOutcome::Queued, client_id)
                    .with_info("name", &name)
                    .with_info("queue_position", &position.to_string())
                    .with_biometrics(Self::biometric_summary(&analysis)),
            );
            return Ok(RegisterOutcome::Queued {
                name,
                queue_position: position,
            });
        }

        let index = self.with_index().await?;
        self.persist_registration(&index, client_id, name, image_data, metadata, analysis)
            .await
    }

    async fn persist_registration(
        &self,
        index: &VectorIndex,
        client_id: &str,
        name: String,
        image_data: &str,
        metadata: BTreeMap<String, String>,
        analysis: FaceAnalysis,
    ) -> Result<RegisterOutcome> {
        let slug = validate::slugify(&name);
        if index.slug_exists(&slug) {
            let existing = index
                .user_ids()
                .into_iter()
                .filter(|id| id.starts_with(&format!("{}_", slug)))
                .min()
                .and_then(|id| index.get(&id));

            if let Some(user) = existing {
                self.audit.log(
                    AuditEvent::new(AuditEventType::Registration, AuditOutcome::Denied, client_id)
                        .with_user(&user.user_id, &user.name)
                        .with_error("already_exists"),
                );
                return Ok(RegisterOutcome::AlreadyExists { user });
            }
        }

        let user_id = validate::next_user_id(&slug, &index.user_ids());
        let profile = UserProfile {
            user_id: user_id.clone(),
            name: name.clone(),
            metadata,
            registration_timestamp: Utc::now().to_rfc3339(),
            last_recognized_timestamp: None,
            recognition_count: 0,
            detection_score: analysis.detection_score,
            face_quality: analysis.quality.overall(analysis.detection_score),
        };

        match index.upsert(profile.clone(), analysis.embedding.clone()) {
            Ok(()) => {
                info!(user_id = %user_id, "Registered user");
                self.audit.log(
                    AuditEvent::new(AuditEventType::Registration, AuditOutcome::Success, client_id)
                        .with_user(&user_id, &name)
                        .with_biometrics(Self::biometric_summary(&analysis)),
                );
                Ok(RegisterOutcome::Registered { user: profile })
            }
            Err(e) if e.is_recoverable() => {
                // Store hiccup: flip to degraded and preserve the write
                warn!("Vector index fault during registration: {}", e);
                self.health
                    .update(
                        Component::VectorIndex,
                        HealthStatus::Degraded,
                        &format!("store fault: {}", e),
                        Some(e.to_string()),
                    )
                    .await;

                let position = self
                    .health
                    .enqueue(QueuedRegistration {
                        ts: Utc::now().to_rfc3339(),
                        name: name.clone(),
                        image_data: image_data.to_string(),
                        metadata: profile.metadata,
                    })
                    .await;

                self.audit.log(
                    AuditEvent::new(AuditEventType::Registration, AuditOutcome::Queued, client_id)
                        .with_info("name", &name)
                        .with_info("queue_position", &position.to_string()),
                );
                Ok(RegisterOutcome::Queued {
                    name,
                    queue_position: position,
                })
            }
            Err(e) => {
                self.audit.log(
                    AuditEvent::new(AuditEventType::Registration, AuditOutcome::Failure, client_id)
                        .with_info("name", &name)
                        .with_error(&e.to_string()),
                );
                Err(e.into())
            }
        }
    }

    // ------------------------------------------------------------------
    // Recognition
    // ------------------------------------------------------------------

    /// Match a face image against the index. `threshold` is a cosine
    /// distance cap; `None` uses the configured default.
    pub async fn recognize(
        &self,
        client_id: &str,
        image_data: &str,
        threshold: Option<f32>,
    ) -> Result<RecognizeOutcome> {
        let threshold = threshold.unwrap_or(self.config.default_threshold);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(IdentityError::Validation(format!(
                "confidence_threshold must be within [0, 1], got {}",
                threshold
            )));
        }

        let analysis = match self.analyze(image_data) {
            Ok(a) => a,
            Err(e) => {
                self.audit.log(
                    AuditEvent::new(AuditEventType::Recognition, AuditOutcome::Failure, client_id)
                        .with_error(&e.to_string()),
                );
                return Err(e);
            }
        };

        let index = self.with_index().await?;
        let hits = index.query(&analysis.embedding, 1)?;

        match hits.first() {
            Some((user_id, distance)) if *distance <= threshold => {
                let user = {
                    let _write = self.write_lock.lock().await;
                    let mut profile = index
                        .get(user_id)
                        .ok_or_else(|| IdentityError::NotFound(user_id.clone()))?;
                    profile.recognition_count += 1;
                    profile.last_recognized_timestamp = Some(Utc::now().to_rfc3339());
                    index.put_profile(profile.clone())?;
                    profile
                };

                self.audit.log(
                    AuditEvent::new(AuditEventType::Recognition, AuditOutcome::Success, client_id)
                        .with_user(&user.user_id, &user.name)
                        .with_match(*distance, threshold)
                        .with_biometrics(Self::biometric_summary(&analysis)),
                );
                Ok(RecognizeOutcome::Recognized {
                    user,
                    distance: *distance,
                    threshold,
                })
            }
            best => {
                let distance = best.map(|(_, d)| *d);
                self.audit.log(
                    AuditEvent::new(AuditEventType::Recognition, AuditOutcome::Success, client_id)
                        .with_info("recognition_status", "not_recognized")
                        .with_biometrics(Self::biometric_summary(&analysis)),
                );
                Ok(RecognizeOutcome::NotRecognized {
                    distance,
                    threshold,
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Update a user's name and/or metadata. Metadata merges by key; the
    /// user id never changes.
    pub async fn update(
        &self,
        client_id: &str,
        user_id: &str,
        name: Option<&str>,
        metadata: Option<BTreeMap<String, String>>,
    ) -> Result<UserProfile> {
        if name.is_none() && metadata.is_none() {
            return Err(IdentityError::Validation(
                "update requires a name or metadata".to_string(),
            ));
        }

        let new_name = name.map(validate::validate_name).transpose()?;
        if let Some(ref m) = metadata {
            validate::validate_metadata(m)?;
        }

        let _write = self.write_lock.lock().await;
        let index = self.with_index().await?;
        let mut profile = index
            .get(user_id)
            .ok_or_else(|| IdentityError::NotFound(user_id.to_string()))?;

        let mut updated_fields = Vec::new();
        if let Some(n) = new_name {
            profile.name = n;
            updated_fields.push("name");
        }
        if let Some(m) = metadata {
            // Union with prior metadata, new keys overwrite
            for (k, v) in m {
                profile.metadata.insert(k, v);
            }
            updated_fields.push("metadata");
        }

        index.put_profile(profile.clone())?;
        info!(user_id = %user_id, fields = ?updated_fields, "Updated user");

        self.audit.log(
            AuditEvent::new(AuditEventType::UserUpdate, AuditOutcome::Success, client_id)
                .with_user(&profile.user_id, &profile.name)
                .with_info("updated_fields", &updated_fields.join(",")),
        );
        Ok(profile)
    }

    /// Remove a user's embedding and profile atomically.
    pub async fn delete(&self, client_id: &str, user_id: &str) -> Result<UserProfile> {
        let _write = self.write_lock.lock().await;
        let index = self.with_index().await?;

        match index.delete(user_id) {
            Ok(profile) => {
                info!(user_id = %user_id, "Deleted user");
                self.audit.log(
                    AuditEvent::new(AuditEventType::Deletion, AuditOutcome::Success, client_id)
                        .with_user(&profile.user_id, &profile.name),
                );
                Ok(profile)
            }
            Err(visage_index::IndexError::NotFound(id)) => {
                self.audit.log(
                    AuditEvent::new(AuditEventType::Deletion, AuditOutcome::Failure, client_id)
                        .with_info("user_id", &id)
                        .with_error("not_found"),
                );
                Err(IdentityError::NotFound(id))
            }
            Err(e) => {
                self.audit.log(
                    AuditEvent::new(AuditEventType::Deletion, AuditOutcome::Failure, client_id)
                        .with_info("user_id", user_id)
                        .with_error(&e.to_string()),
                );
                Err(e.into())
            }
        }
    }

    /// Page over registered users.
    pub async fn list(&self, client_id: &str, offset: usize, limit: usize) -> Result<ListPage> {
        let index = self.with_index().await?;
        let page = index.list(offset, limit);

        self.audit.log(
            AuditEvent::new(AuditEventType::DatabaseQuery, AuditOutcome::Success, client_id)
                .with_info("operation", "list_users")
                .with_info("returned", &page.users.len().to_string()),
        );
        Ok(page)
    }

    /// Full profile for one user. The embedding never leaves the index.
    pub async fn get_profile(&self, client_id: &str, user_id: &str) -> Result<UserProfile> {
        let index = self.with_index().await?;
        match index.get(user_id) {
            Some(profile) => {
                self.audit.log(
                    AuditEvent::new(AuditEventType::ProfileAccess, AuditOutcome::Success, client_id)
                        .with_user(&profile.user_id, &profile.name),
                );
                Ok(profile)
            }
            None => {
                self.audit.log(
                    AuditEvent::new(AuditEventType::ProfileAccess, AuditOutcome::Failure, client_id)
                        .with_info("user_id", user_id)
                        .with_error("not_found"),
                );
                Err(IdentityError::NotFound(user_id.to_string()))
            }
        }
    }

    /// Aggregate statistics over the index.
    pub async fn stats(&self, client_id: &str) -> Result<ServiceStats> {
        let index = self.with_index().await?;
        let base = index.stats();

        let mut total_recognitions = 0u64;
        let mut most_active: Option<MostActiveUser> = None;
        for user_id in index.user_ids() {
            if let Some(profile) = index.get(&user_id) {
                total_recognitions += profile.recognition_count;
                let is_new_max = most_active
                    .as_ref()
                    .map(|m| profile.recognition_count > m.recognition_count)
                    .unwrap_or(profile.recognition_count > 0);
                if is_new_max {
                    most_active = Some(MostActiveUser {
                        user_id: profile.user_id,
                        name: profile.name,
                        recognition_count: profile.recognition_count,
                    });
                }
            }
        }

        self.audit.log(
            AuditEvent::new(AuditEventType::DatabaseQuery, AuditOutcome::Success, client_id)
                .with_info("operation", "get_database_stats"),
        );

        Ok(ServiceStats {
            count: base.count,
            dims: base.dims,
            index_type: base.index_type,
            total_recognitions,
            most_active_user: most_active,
        })
    }

    // ------------------------------------------------------------------
    // Degraded-mode queue
    // ------------------------------------------------------------------

    /// Drain queued registrations through normal register semantics.
    /// Invoked when the vector index transitions Degraded → Healthy.
    pub async fn process_queue(&self) -> DrainReport {
        let queued = self.health.drain().await;
        let mut report = DrainReport {
            processed: queued.len(),
            succeeded: 0,
            failed: 0,
        };

        for item in queued {
            match self
                .register("queue_drain", &item.name, &item.image_data, item.metadata)
                .await
            {
                Ok(RegisterOutcome::Registered { .. }) => report.succeeded += 1,
                Ok(RegisterOutcome::AlreadyExists { .. }) => report.failed += 1,
                Ok(RegisterOutcome::Queued { .. }) => {
                    // Index degraded again mid-drain; the item is re-queued
                    report.failed += 1;
                }
                Err(e) => {
                    warn!("Queued registration for '{}' failed: {}", item.name, e);
                    report.failed += 1;
                }
            }
        }

        if report.processed > 0 {
            info!(
                processed = report.processed,
                succeeded = report.succeeded,
                failed = report.failed,
                "Registration queue drained"
            );
        }
        report
    }
}
