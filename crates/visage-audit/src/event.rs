//! Audit event types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What kind of decision an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Registration,
    Recognition,
    Deletion,
    ProfileAccess,
    UserUpdate,
    DatabaseQuery,
    AuthSuccess,
    AuthFailure,
    HealthStateChange,
    ServerStart,
    ServerStop,
    EventsDropped,
}

/// Outcome of an audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    Queued,
    Denied,
}

/// Face-detection summary attached to biometric events.
///
/// Never contains the embedding or image bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiometricSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_quality: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_faces_detected: Option<usize>,
}

/// One append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub ts: String,
    pub event_type: AuditEventType,
    pub outcome: AuditOutcome,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub biometric_data: Option<BiometricSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AuditEvent {
    /// Start an event with the required fields; the rest default to absent.
    pub fn new(event_type: AuditEventType, outcome: AuditOutcome, client_id: &str) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339(),
            event_type,
            outcome,
            client_id: client_id.to_string(),
            user_id: None,
            user_name: None,
            confidence_score: None,
            threshold: None,
            biometric_data: None,
            additional_info: None,
            error_message: None,
        }
    }

    pub fn with_user(mut self, user_id: &str, user_name: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self.user_name = Some(user_name.to_string());
        self
    }

    pub fn with_match(mut self, distance: f32, threshold: f32) -> Self {
        self.confidence_score = Some(distance);
        self.threshold = Some(threshold);
        self
    }

    pub fn with_biometrics(mut self, summary: BiometricSummary) -> Self {
        self.biometric_data = Some(summary);
        self
    }

    pub fn with_error(mut self, message: &str) -> Self {
        self.error_message = Some(message.to_string());
        self
    }

    pub fn with_info(mut self, key: &str, value: &str) -> Self {
        self.additional_info
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_compact() {
        let event = AuditEvent::new(
            AuditEventType::Recognition,
            AuditOutcome::Success,
            "client_abc",
        )
        .with_user("john_smith_1", "John Smith")
        .with_match(0.08, 0.4);

        let line = serde_json::to_string(&event).unwrap();
        assert!(line.contains("\"event_type\":\"recognition\""));
        assert!(line.contains("\"outcome\":\"success\""));
        // Absent optionals must not appear
        assert!(!line.contains("error_message"));
        assert!(!line.contains("biometric_data"));
    }

    #[test]
    fn test_outcome_snake_case() {
        assert_eq!(
            serde_json::to_string(&AuditOutcome::Denied).unwrap(),
            "\"denied\""
        );
    }
}
