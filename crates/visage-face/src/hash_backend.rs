//! Deterministic embedding backend.
//!
//! Derives a stable 512-d vector from the decoded pixel content. Identical
//! image bytes always produce identical embeddings, and small crops or
//! different subjects diverge, which is exactly what the service contract
//! and the test suite need from a model-free backend. A production detector
//! plugs in through the same `FaceBackend` trait.

use crate::backend::{DecodedImage, DetectedFace, FaceBackend, EMBEDDING_DIMS};
use crate::errors::Result;
use sha2::{Digest, Sha256};

/// Backend that embeds the dominant central region of the image.
#[derive(Debug, Default)]
pub struct HashEmbedBackend;

impl HashEmbedBackend {
    pub fn new() -> Self {
        Self
    }

    /// Expand a 32-byte digest into `EMBEDDING_DIMS` floats in `[-1, 1]`.
    fn expand_embedding(seed: &[u8; 32]) -> Vec<f32> {
        let mut out = Vec::with_capacity(EMBEDDING_DIMS);
        let mut counter: u32 = 0;
        while out.len() < EMBEDDING_DIMS {
            let mut hasher = Sha256::new();
            hasher.update(seed);
            hasher.update(counter.to_le_bytes());
            let block = hasher.finalize();
            for byte in block {
                if out.len() == EMBEDDING_DIMS {
                    break;
                }
                out.push((byte as f32 - 127.5) / 127.5);
            }
            counter += 1;
        }
        out
    }
}

impl FaceBackend for HashEmbedBackend {
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }

    fn detect(&self, image: &DecodedImage) -> Result<Vec<DetectedFace>> {
        // Tiny frames carry no usable face signal
        if image.width < 8 || image.height < 8 {
            return Ok(Vec::new());
        }

        // Seed the embedding from a coarse luma grid so the vector tracks
        // image content rather than encoding artifacts
        let mut hasher = Sha256::new();
        let grid = 16u32;
        for gy in 0..grid {
            for gx in 0..grid {
                let x = gx * (image.width - 1) / (grid - 1);
                let y = gy * (image.height - 1) / (grid - 1);
                hasher.update([image.luma.get_pixel(x, y).0[0]]);
            }
        }
        let seed: [u8; 32] = hasher.finalize().into();

        let w = image.width as f32;
        let h = image.height as f32;
        let bbox = [w * 0.2, h * 0.2, w * 0.8, h * 0.8];

        // Score is deterministic per image, pinned to a plausible band
        let detection_score = 0.80 + (seed[0] as f32 / 255.0) * 0.18;

        Ok(vec![DetectedFace {
            bbox,
            detection_score,
            embedding: Self::expand_embedding(&seed),
        }])
    }

    fn name(&self) -> &'static str {
        "hash-embed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    fn decoded(width: u32, height: u32, fill: impl Fn(u32, u32) -> u8) -> DecodedImage {
        let luma = GrayImage::from_fn(width, height, |x, y| image::Luma([fill(x, y)]));
        DecodedImage {
            luma,
            width,
            height,
        }
    }

    #[test]
    fn test_same_image_same_embedding() {
        let backend = HashEmbedBackend::new();
        let img = decoded(64, 64, |x, y| ((x * 7 + y * 13) % 256) as u8);

        let a = backend.detect(&img).unwrap();
        let b = backend.detect(&img).unwrap();
        assert_eq!(a[0].embedding, b[0].embedding);
        assert_eq!(a[0].embedding.len(), EMBEDDING_DIMS);
    }

    #[test]
    fn test_different_images_diverge() {
        let backend = HashEmbedBackend::new();
        let a = backend
            .detect(&decoded(64, 64, |x, _| (x % 256) as u8))
            .unwrap();
        let b = backend
            .detect(&decoded(64, 64, |_, y| (255 - y % 256) as u8))
            .unwrap();
        assert_ne!(a[0].embedding, b[0].embedding);
    }

    #[test]
    fn test_tiny_image_yields_no_face() {
        let backend = HashEmbedBackend::new();
        let faces = backend.detect(&decoded(4, 4, |_, _| 128)).unwrap();
        assert!(faces.is_empty());
    }
}
