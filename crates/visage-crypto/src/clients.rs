//! OAuth client registry.
//!
//! Clients are stored in a JSON file. Secrets are never persisted; only their
//! Argon2id PHC hashes are, and the cleartext secret is returned exactly once
//! at creation time.

use crate::errors::*;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::info;
use zeroize::Zeroizing;

/// Entropy of a generated client id (bytes)
const CLIENT_ID_BYTES: usize = 16;
/// Entropy of a generated client secret (bytes)
const CLIENT_SECRET_BYTES: usize = 24;

/// A registered OAuth client. The secret is stored only as a PHC hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret_hash: String,
    pub name: String,
    pub enabled: bool,
    pub created_at: String,
}

/// Public view of a client, safe to list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: String,
    pub name: String,
    pub enabled: bool,
    pub created_at: String,
}

/// Credentials returned once at client creation.
#[derive(Debug)]
pub struct IssuedCredentials {
    pub client_id: String,
    pub client_secret: Zeroizing<String>,
}

/// File-backed client registry.
pub struct ClientRegistry {
    path: PathBuf,
}

impl ClientRegistry {
    /// Open the registry at `path`, creating an empty file if missing.
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        if !path.exists() {
            fs::write(&path, "[]")?;
        }
        let registry = Self { path };
        // Fail fast on a corrupt file
        registry.load()?;
        Ok(registry)
    }

    fn load(&self) -> Result<Vec<OAuthClient>> {
        let raw = fs::read_to_string(&self.path)?;
        serde_json::from_str(&raw).map_err(|e| CryptoError::Registry(e.to_string()))
    }

    fn save(&self, clients: &[OAuthClient]) -> Result<()> {
        let raw = serde_json::to_string_pretty(clients)
            .map_err(|e| CryptoError::Registry(e.to_string()))?;
        fs::write(&self.path, raw)?;
        Ok(())
    }

    /// Create a new client, returning its credentials. The secret is not
    /// recoverable after this call.
    pub fn create_client(&self, name: &str) -> Result<IssuedCredentials> {
        let client_id = format!("client_{}", random_token(CLIENT_ID_BYTES));
        let client_secret = Zeroizing::new(random_token(CLIENT_SECRET_BYTES));

        let salt = SaltString::generate(&mut rand::thread_rng());
        let hash = Argon2::default()
            .hash_password(client_secret.as_bytes(), &salt)
            .map_err(|e| CryptoError::Hashing(e.to_string()))?
            .to_string();

        let mut clients = self.load()?;
        clients.push(OAuthClient {
            client_id: client_id.clone(),
            client_secret_hash: hash,
            name: name.to_string(),
            enabled: true,
            created_at: Utc::now().to_rfc3339(),
        });
        self.save(&clients)?;

        info!(client_id = %client_id, "Created OAuth client");
        Ok(IssuedCredentials {
            client_id,
            client_secret,
        })
    }

    /// Verify a client id and secret pair.
    ///
    /// Unknown ids and wrong secrets both report `InvalidClient`; a disabled
    /// client with the correct secret reports `DisabledClient`.
    pub fn verify_client(&self, client_id: &str, client_secret: &str) -> Result<()> {
        let clients = self.load()?;
        let client = clients
            .iter()
            .find(|c| c.client_id == client_id)
            .ok_or(CryptoError::InvalidClient)?;

        let parsed = PasswordHash::new(&client.client_secret_hash)
            .map_err(|e| CryptoError::Registry(e.to_string()))?;

        // Argon2 verification recomputes and compares in constant time
        Argon2::default()
            .verify_password(client_secret.as_bytes(), &parsed)
            .map_err(|_| CryptoError::InvalidClient)?;

        if !client.enabled {
            return Err(CryptoError::DisabledClient);
        }

        Ok(())
    }

    /// Whether a client exists and is enabled.
    pub fn is_enabled(&self, client_id: &str) -> Result<bool> {
        let clients = self.load()?;
        Ok(clients
            .iter()
            .any(|c| c.client_id == client_id && c.enabled))
    }

    /// Disable a client. Issued tokens keep verifying their signature but the
    /// authority rejects them through the enabled check.
    pub fn disable_client(&self, client_id: &str) -> Result<()> {
        let mut clients = self.load()?;
        let client = clients
            .iter_mut()
            .find(|c| c.client_id == client_id)
            .ok_or(CryptoError::InvalidClient)?;
        client.enabled = false;
        self.save(&clients)?;

        info!(client_id = %client_id, "Disabled OAuth client");
        Ok(())
    }

    /// List clients without secret material.
    pub fn list_clients(&self) -> Result<Vec<ClientInfo>> {
        Ok(self
            .load()?
            .into_iter()
            .map(|c| ClientInfo {
                client_id: c.client_id,
                name: c.name,
                enabled: c.enabled,
                created_at: c.created_at,
            })
            .collect())
    }
}

/// URL-safe random token with `bytes` bytes of CSPRNG entropy.
fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> (tempfile::TempDir, ClientRegistry) {
        let dir = tempfile::TempDir::new().unwrap();
        let registry = ClientRegistry::open(dir.path().join("clients.json")).unwrap();
        (dir, registry)
    }

    #[test]
    fn test_create_and_verify() {
        let (_dir, registry) = test_registry();
        let creds = registry.create_client("voice app").unwrap();

        registry
            .verify_client(&creds.client_id, &creds.client_secret)
            .unwrap();
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let (_dir, registry) = test_registry();
        let creds = registry.create_client("voice app").unwrap();

        let err = registry
            .verify_client(&creds.client_id, "not the secret")
            .unwrap_err();
        assert!(matches!(err, CryptoError::InvalidClient));
    }

    #[test]
    fn test_unknown_client_rejected() {
        let (_dir, registry) = test_registry();
        let err = registry.verify_client("client_missing", "x").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidClient));
    }

    #[test]
    fn test_disabled_client_rejected() {
        let (_dir, registry) = test_registry();
        let creds = registry.create_client("voice app").unwrap();
        registry.disable_client(&creds.client_id).unwrap();

        let err = registry
            .verify_client(&creds.client_id, &creds.client_secret)
            .unwrap_err();
        assert!(matches!(err, CryptoError::DisabledClient));
    }

    #[test]
    fn test_secret_never_stored_cleartext() {
        let (dir, registry) = test_registry();
        let creds = registry.create_client("voice app").unwrap();

        let raw = std::fs::read_to_string(dir.path().join("clients.json")).unwrap();
        assert!(!raw.contains(creds.client_secret.as_str()));
        assert!(raw.contains("$argon2id$"));
    }

    #[test]
    fn test_list_clients_omits_hashes() {
        let (_dir, registry) = test_registry();
        registry.create_client("a").unwrap();
        registry.create_client("b").unwrap();

        let listed = registry.list_clients().unwrap();
        assert_eq!(listed.len(), 2);
        let raw = serde_json::to_string(&listed).unwrap();
        assert!(!raw.contains("argon2"));
    }
}
