//! Append-only structured audit log.
//!
//! Every decision the recognition service takes produces exactly one
//! [`AuditEvent`]. Events are buffered through a bounded queue so biometric
//! operations never block on disk, written one JSON object per line to a
//! daily file, rotated at local midnight, compressed after the retention
//! window and deleted after twice that. Embeddings and raw image bytes are
//! never logged.

pub mod errors;
pub mod event;
pub mod retention;
pub mod sink;

pub use errors::{AuditError, Result};
pub use event::{AuditEvent, AuditEventType, AuditOutcome, BiometricSummary};
pub use sink::{AuditConfig, AuditSink};
