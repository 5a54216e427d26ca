//! Face detection and embedding extraction.
//!
//! Decodes an image, runs the configured detector backend, picks the primary
//! face (largest bounding box, ties by detection score), L2-normalizes its
//! 512-d embedding and reports quality metrics. The detector itself is a
//! black box behind [`FaceBackend`]; the crate ships a deterministic
//! [`HashEmbedBackend`] and production detectors plug in through the same
//! trait.

pub mod analyzer;
pub mod backend;
pub mod errors;
pub mod hash_backend;

pub use analyzer::{FaceAnalysis, FaceAnalyzer, FaceQuality};
pub use backend::{DecodedImage, DetectedFace, FaceBackend, EMBEDDING_DIMS};
pub use errors::{FaceError, Result};
pub use hash_backend::HashEmbedBackend;
