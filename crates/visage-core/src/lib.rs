//! Identity service.
//!
//! Orchestrates the face analyzer, vector index, health registry and audit
//! sink into the register/recognize/update/delete/list/stats operations the
//! tool server exposes. Writes for any user are serialized; reads run
//! concurrently. Matching is by cosine distance against a configurable
//! threshold.

pub mod errors;
pub mod service;
pub mod validate;

pub use errors::{IdentityError, Result};
pub use service::{
    similarity_percent, DrainReport, IdentityConfig, IdentityService, MostActiveUser,
    RecognizeOutcome, RegisterOutcome, ServiceStats,
};
