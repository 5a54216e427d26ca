//! Detector backend abstraction.
//!
//! The `FaceBackend` trait decouples the analyzer from any specific detector
//! (deterministic hash embedder, ONNX model, remote runner). Backends see an
//! already-decoded image and return raw detections; selection, normalization
//! and quality scoring live in the analyzer.

use crate::errors::Result;
use image::GrayImage;

/// Embedding dimensionality every backend must produce.
pub const EMBEDDING_DIMS: usize = 512;

/// A decoded image handed to backends: luma plane plus dimensions.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub luma: GrayImage,
    pub width: u32,
    pub height: u32,
}

/// One raw detection from a backend.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    /// Bounding box `[x1, y1, x2, y2]` in pixels.
    pub bbox: [f32; 4],
    /// Detector confidence in `[0, 1]`.
    pub detection_score: f32,
    /// Raw (not yet normalized) embedding, `EMBEDDING_DIMS` long.
    pub embedding: Vec<f32>,
}

impl DetectedFace {
    /// Bounding box area in square pixels.
    pub fn bbox_area(&self) -> f32 {
        let w = (self.bbox[2] - self.bbox[0]).max(0.0);
        let h = (self.bbox[3] - self.bbox[1]).max(0.0);
        w * h
    }
}

/// Contract for face detection backends.
pub trait FaceBackend: Send + Sync {
    /// One-time warm-up: load weights, allocate buffers. Called once at
    /// startup; failure marks the face model unavailable.
    fn warm_up(&self) -> Result<()>;

    /// Detect faces and extract raw embeddings from a decoded image.
    /// May return zero, one, or many detections.
    fn detect(&self, image: &DecodedImage) -> Result<Vec<DetectedFace>>;

    /// Backend name for health/stat reporting.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_area() {
        let face = DetectedFace {
            bbox: [10.0, 10.0, 30.0, 50.0],
            detection_score: 0.9,
            embedding: vec![0.0; EMBEDDING_DIMS],
        };
        assert_eq!(face.bbox_area(), 20.0 * 40.0);
    }

    #[test]
    fn test_degenerate_bbox_has_zero_area() {
        let face = DetectedFace {
            bbox: [30.0, 30.0, 10.0, 10.0],
            detection_score: 0.9,
            embedding: vec![],
        };
        assert_eq!(face.bbox_area(), 0.0);
    }
}
