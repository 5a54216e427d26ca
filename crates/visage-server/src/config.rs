use anyhow::Result;
use std::path::PathBuf;

/// Server configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base data directory; the defaults below nest under it
    pub data_dir: PathBuf,

    /// RSA keypair directory (`keys/private.pem`, `keys/public.pem`)
    pub keys_dir: PathBuf,

    /// OAuth client registry file
    pub clients_file: PathBuf,

    /// Vector index directory
    pub index_dir: PathBuf,

    /// Audit log directory
    pub audit_dir: PathBuf,

    /// Access token lifetime in seconds
    pub token_ttl_secs: i64,

    /// Default recognition distance threshold
    pub distance_threshold: f32,

    /// Days before audit logs are compressed
    pub audit_retention_days: u32,

    /// Redact user names and hash identifiers in audit events
    pub redact_pii: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let data_dir: PathBuf = std::env::var("VISAGE_DATA_DIR")
            .unwrap_or_else(|_| "./visage_data".to_string())
            .into();

        let keys_dir = std::env::var("VISAGE_KEYS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("keys"));

        let clients_file = std::env::var("VISAGE_CLIENTS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("clients.json"));

        let index_dir = std::env::var("VISAGE_INDEX_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("vectors"));

        let audit_dir = std::env::var("VISAGE_AUDIT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("audit"));

        let token_ttl_secs = std::env::var("VISAGE_TOKEN_TTL_SECS")
            .unwrap_or_else(|_| visage_crypto::DEFAULT_TOKEN_TTL_SECS.to_string())
            .parse()?;

        let distance_threshold = std::env::var("VISAGE_DISTANCE_THRESHOLD")
            .unwrap_or_else(|_| "0.40".to_string())
            .parse()?;

        let audit_retention_days = std::env::var("VISAGE_AUDIT_RETENTION_DAYS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()?;

        let redact_pii = std::env::var("VISAGE_REDACT_PII")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Config {
            data_dir,
            keys_dir,
            clients_file,
            index_dir,
            audit_dir,
            token_ttl_secs,
            distance_threshold,
            audit_retention_days,
            redact_pii,
        })
    }
}
