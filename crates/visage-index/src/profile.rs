//! Durable user profile row.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Profile metadata stored beside an embedding, keyed by `user_id`.
///
/// The embedding itself lives in its own column family and is never part of
/// this row, so profile reads can be returned to callers verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub registration_timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_recognized_timestamp: Option<String>,
    #[serde(default)]
    pub recognition_count: u64,
    pub detection_score: f32,
    pub face_quality: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_round_trip() {
        let mut metadata = BTreeMap::new();
        metadata.insert("department".to_string(), "Engineering".to_string());

        let profile = UserProfile {
            user_id: "jane_doe_1".to_string(),
            name: "Jane Doe".to_string(),
            metadata,
            registration_timestamp: "2026-08-02T00:00:00+00:00".to_string(),
            last_recognized_timestamp: None,
            recognition_count: 0,
            detection_score: 0.92,
            face_quality: 0.81,
        };

        let raw = serde_json::to_string(&profile).unwrap();
        let back: UserProfile = serde_json::from_str(&raw).unwrap();
        assert_eq!(profile, back);
        // Absent last-recognized must not serialize
        assert!(!raw.contains("last_recognized_timestamp"));
    }
}
