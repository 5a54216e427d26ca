//! RS256 access token issuance and verification.

use crate::{clients::ClientRegistry, errors::*, keys::RsaKeyPair};
use chrono::Utc;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default access token lifetime (seconds)
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

/// Token issuer claim
pub const TOKEN_ISSUER: &str = "visage-recognition-service";

/// JWT claims carried by an access token
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Issuer
    pub iss: String,
    /// Subject (client_id)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
    /// Unique token id
    pub jti: String,
    /// Scope (reserved, empty)
    #[serde(default)]
    pub scope: String,
}

/// Issues and verifies RS256 bearer tokens against the client registry.
pub struct TokenAuthority {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    registry: ClientRegistry,
    token_ttl_secs: i64,
}

impl TokenAuthority {
    /// Build an authority from a persisted keypair and client registry.
    pub fn new(keypair: &RsaKeyPair, registry: ClientRegistry, token_ttl_secs: i64) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(keypair.private_pem())
            .map_err(|e| CryptoError::KeyEncoding(e.to_string()))?;
        let decoding_key = DecodingKey::from_rsa_pem(keypair.public_pem())
            .map_err(|e| CryptoError::KeyEncoding(e.to_string()))?;

        Ok(Self {
            encoding_key,
            decoding_key,
            registry,
            token_ttl_secs,
        })
    }

    /// Client registry handle, for admin operations.
    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Exchange client credentials for a signed bearer token.
    pub fn issue_token(&self, client_id: &str, client_secret: &str) -> Result<String> {
        self.registry.verify_client(client_id, client_secret)?;

        let now = Utc::now().timestamp();
        let claims = TokenClaims {
            iss: TOKEN_ISSUER.to_string(),
            sub: client_id.to_string(),
            iat: now,
            exp: now + self.token_ttl_secs,
            jti: Uuid::new_v4().to_string(),
            scope: String::new(),
        };

        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|_| CryptoError::InvalidToken)
    }

    /// Verify a token and return the authenticated client id.
    ///
    /// Malformed tokens and bad signatures report identically. Expired
    /// tokens and tokens from disabled clients are rejected.
    pub fn verify_token(&self, token: &str) -> Result<String> {
        // Pin the algorithm before any signature work
        let header = decode_header(token).map_err(|_| CryptoError::InvalidToken)?;
        if header.alg != Algorithm::RS256 {
            return Err(CryptoError::InvalidAlgorithm {
                found: format!("{:?}", header.alg),
            });
        }

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.validate_exp = true;
        validation.leeway = 0;

        let data = decode::<TokenClaims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => CryptoError::Expired,
                _ => CryptoError::InvalidToken,
            }
        })?;

        if !self.registry.is_enabled(&data.claims.sub)? {
            return Err(CryptoError::DisabledClient);
        }

        Ok(data.claims.sub)
    }

    /// Decode a verified token's claims, for the introspection tool.
    pub fn token_info(&self, token: &str) -> Result<TokenClaims> {
        let client_id = self.verify_token(token)?;
        // verify_token already validated everything; re-decode for the claims
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.leeway = 0;
        let data = decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|_| CryptoError::InvalidToken)?;
        debug_assert_eq!(data.claims.sub, client_id);
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ClientRegistry;

    fn test_authority(ttl: i64) -> (tempfile::TempDir, TokenAuthority, String, String) {
        let dir = tempfile::TempDir::new().unwrap();
        let keypair = RsaKeyPair::load_or_generate(&dir.path().join("keys")).unwrap();
        let registry = ClientRegistry::open(dir.path().join("clients.json")).unwrap();
        let creds = registry.create_client("test client").unwrap();
        let client_id = creds.client_id.clone();
        let secret = creds.client_secret.to_string();
        let authority = TokenAuthority::new(&keypair, registry, ttl).unwrap();
        (dir, authority, client_id, secret)
    }

    #[test]
    fn test_issue_and_verify_round_trip() {
        let (_dir, authority, client_id, secret) = test_authority(DEFAULT_TOKEN_TTL_SECS);

        let token = authority.issue_token(&client_id, &secret).unwrap();
        let subject = authority.verify_token(&token).unwrap();
        assert_eq!(subject, client_id);
    }

    #[test]
    fn test_bad_secret_rejected() {
        let (_dir, authority, client_id, _secret) = test_authority(DEFAULT_TOKEN_TTL_SECS);
        let err = authority.issue_token(&client_id, "wrong").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidClient));
    }

    #[test]
    fn test_garbage_token_rejected() {
        let (_dir, authority, _client_id, _secret) = test_authority(DEFAULT_TOKEN_TTL_SECS);
        let err = authority.verify_token("not.a.jwt").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidToken));
    }

    #[test]
    fn test_tampered_token_rejected_like_malformed() {
        let (_dir, authority, client_id, secret) = test_authority(DEFAULT_TOKEN_TTL_SECS);
        let token = authority.issue_token(&client_id, &secret).unwrap();

        // Flip a character in the signature segment
        let mut tampered = token.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'A' { 'B' } else { 'A' });

        let err = authority.verify_token(&tampered).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidToken));
    }

    #[test]
    fn test_expired_token_rejected() {
        // Issue with a TTL already in the past; verification runs with
        // zero leeway
        let (_dir, authority, client_id, secret) = test_authority(-5);
        let token = authority.issue_token(&client_id, &secret).unwrap();

        let err = authority.verify_token(&token).unwrap_err();
        assert!(matches!(err, CryptoError::Expired));
    }

    #[test]
    fn test_disabled_client_token_rejected() {
        let (_dir, authority, client_id, secret) = test_authority(DEFAULT_TOKEN_TTL_SECS);
        let token = authority.issue_token(&client_id, &secret).unwrap();

        authority.registry().disable_client(&client_id).unwrap();

        let err = authority.verify_token(&token).unwrap_err();
        assert!(matches!(err, CryptoError::DisabledClient));
    }

    #[test]
    fn test_token_info_exposes_expiry() {
        let (_dir, authority, client_id, secret) = test_authority(DEFAULT_TOKEN_TTL_SECS);
        let token = authority.issue_token(&client_id, &secret).unwrap();

        let claims = authority.token_info(&token).unwrap();
        assert_eq!(claims.sub, client_id);
        assert!(claims.exp > claims.iat);
        assert!(claims.scope.is_empty());
    }
}
