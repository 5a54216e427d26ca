//! Keystore and OAuth 2.1 token authority.
//!
//! Owns the RSA-2048 signing keypair, the on-disk client registry, and
//! RS256 bearer token issuance/verification. All verification is local;
//! nothing in this crate talks to the network.

pub mod clients;
pub mod errors;
pub mod keys;
pub mod tokens;

pub use clients::{ClientInfo, ClientRegistry, IssuedCredentials, OAuthClient};
pub use errors::{CryptoError, Result};
pub use keys::RsaKeyPair;
pub use tokens::{TokenAuthority, TokenClaims, DEFAULT_TOKEN_TTL_SECS};
