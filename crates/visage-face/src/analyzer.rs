//! Image decode, face selection and embedding post-processing.

use crate::backend::{DecodedImage, DetectedFace, FaceBackend, EMBEDDING_DIMS};
use crate::errors::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Quality metrics captured alongside an embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceQuality {
    /// Face bounding-box area as a fraction of the image area.
    pub bbox_area_ratio: f32,
    /// Mean absolute luma gradient over the face region (blur proxy).
    pub sharpness: f32,
    /// Offset of the face center from the image center, 0 = centered.
    pub pose: f32,
}

impl FaceQuality {
    /// Scalar quality summary stored on the user record and audited.
    /// Detector confidence dominates, face size contributes the rest.
    pub fn overall(&self, detection_score: f32) -> f32 {
        let size_quality = if self.bbox_area_ratio < 0.5 {
            (self.bbox_area_ratio / 0.1).min(1.0)
        } else {
            (1.0 - (self.bbox_area_ratio - 0.5)).max(0.5)
        };
        detection_score * 0.7 + size_quality * 0.3
    }
}

/// Result of analyzing one image.
#[derive(Debug, Clone)]
pub struct FaceAnalysis {
    /// L2-normalized 512-d embedding.
    pub embedding: Vec<f32>,
    pub detection_score: f32,
    pub quality: FaceQuality,
    /// How many faces the detector reported before selection.
    pub num_faces: usize,
}

/// Decodes images, runs the configured backend, selects the primary face and
/// normalizes its embedding.
pub struct FaceAnalyzer {
    backend: Arc<dyn FaceBackend>,
}

impl FaceAnalyzer {
    pub fn new(backend: Arc<dyn FaceBackend>) -> Self {
        Self { backend }
    }

    /// Load the backend. Failure means the face model is unavailable.
    pub fn warm_up(&self) -> Result<()> {
        self.backend.warm_up()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Decode `image_bytes`, detect faces and return the primary face's
    /// normalized embedding plus quality metrics.
    pub fn analyze(&self, image_bytes: &[u8]) -> Result<FaceAnalysis> {
        let decoded = decode_image(image_bytes)?;
        let faces = self.backend.detect(&decoded)?;

        let num_faces = faces.len();
        if num_faces > 1 {
            warn!(num_faces, "Multiple faces detected; selecting the largest");
        }

        let Some(face) = select_primary_face(faces) else {
            return Err(FaceError::NoFaceDetected);
        };
        if face.embedding.len() != EMBEDDING_DIMS {
            return Err(FaceError::EmbeddingDimension {
                expected: EMBEDDING_DIMS,
                got: face.embedding.len(),
            });
        }

        let embedding = l2_normalize(&face.embedding)?;
        let quality = measure_quality(&decoded, &face);
        debug!(
            detection_score = face.detection_score,
            bbox_area_ratio = quality.bbox_area_ratio,
            num_faces,
            "Face analyzed"
        );

        Ok(FaceAnalysis {
            embedding,
            detection_score: face.detection_score,
            quality,
            num_faces,
        })
    }
}

fn decode_image(bytes: &[u8]) -> Result<DecodedImage> {
    let dynamic =
        image::load_from_memory(bytes).map_err(|e| FaceError::DecodeError(e.to_string()))?;
    let luma = dynamic.to_luma8();
    let (width, height) = (luma.width(), luma.height());
    Ok(DecodedImage {
        luma,
        width,
        height,
    })
}

/// Largest bounding box wins; ties break on detection score.
fn select_primary_face(faces: Vec<DetectedFace>) -> Option<DetectedFace> {
    faces.into_iter().max_by(|a, b| {
        a.bbox_area()
            .partial_cmp(&b.bbox_area())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                a.detection_score
                    .partial_cmp(&b.detection_score)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    })
}

/// Scale a raw embedding to unit L2 norm.
fn l2_normalize(raw: &[f32]) -> Result<Vec<f32>> {
    let norm = raw.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm <= f32::EPSILON {
        return Err(FaceError::NoFaceDetected);
    }
    Ok(raw.iter().map(|v| v / norm).collect())
}

fn measure_quality(image: &DecodedImage, face: &DetectedFace) -> FaceQuality {
    let image_area = (image.width * image.height) as f32;
    let bbox_area_ratio = if image_area > 0.0 {
        (face.bbox_area() / image_area).clamp(0.0, 1.0)
    } else {
        0.0
    };

    FaceQuality {
        bbox_area_ratio,
        sharpness: region_sharpness(image, &face.bbox),
        pose: center_offset(image, &face.bbox),
    }
}

/// Mean absolute horizontal+vertical luma gradient inside the bbox.
fn region_sharpness(image: &DecodedImage, bbox: &[f32; 4]) -> f32 {
    let x1 = bbox[0].max(0.0) as u32;
    let y1 = bbox[1].max(0.0) as u32;
    let x2 = (bbox[2] as u32).min(image.width.saturating_sub(1));
    let y2 = (bbox[3] as u32).min(image.height.saturating_sub(1));

    if x2 <= x1 + 1 || y2 <= y1 + 1 {
        return 0.0;
    }

    let mut total = 0u64;
    let mut count = 0u64;
    for y in y1..y2 {
        for x in x1..x2 {
            let here = image.luma.get_pixel(x, y).0[0] as i32;
            let right = image.luma.get_pixel(x + 1, y).0[0] as i32;
            let below = image.luma.get_pixel(x, y + 1).0[0] as i32;
            total += ((here - right).abs() + (here - below).abs()) as u64;
            count += 2;
        }
    }

    if count == 0 {
        0.0
    } else {
        (total as f32 / count as f32) / 255.0
    }
}

/// Normalized distance of the face center from the image center.
fn center_offset(image: &DecodedImage, bbox: &[f32; 4]) -> f32 {
    let face_cx = (bbox[0] + bbox[2]) / 2.0;
    let face_cy = (bbox[1] + bbox[3]) / 2.0;
    let img_cx = image.width as f32 / 2.0;
    let img_cy = image.height as f32 / 2.0;

    let dx = (face_cx - img_cx) / image.width.max(1) as f32;
    let dy = (face_cy - img_cy) / image.height.max(1) as f32;
    (dx * dx + dy * dy).sqrt().clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash_backend::HashEmbedBackend;
    use image::{GrayImage, ImageOutputFormat, Luma};
    use std::io::Cursor;

    /// Fake backend for exercising selection and dimension checks.
    struct FixedBackend {
        faces: Vec<DetectedFace>,
    }

    impl FaceBackend for FixedBackend {
        fn warm_up(&self) -> Result<()> {
            Ok(())
        }
        fn detect(&self, _image: &DecodedImage) -> Result<Vec<DetectedFace>> {
            Ok(self.faces.clone())
        }
        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    pub(crate) fn png_bytes(width: u32, height: u32, fill: impl Fn(u32, u32) -> u8) -> Vec<u8> {
        let img = GrayImage::from_fn(width, height, |x, y| Luma([fill(x, y)]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageLuma8(img)
            .write_to(&mut out, ImageOutputFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn face(bbox: [f32; 4], score: f32, dims: usize) -> DetectedFace {
        DetectedFace {
            bbox,
            detection_score: score,
            embedding: vec![1.0; dims],
        }
    }

    #[test]
    fn test_analyze_returns_unit_embedding() {
        let analyzer = FaceAnalyzer::new(Arc::new(HashEmbedBackend::new()));
        let bytes = png_bytes(64, 64, |x, y| ((x + y) % 256) as u8);

        let analysis = analyzer.analyze(&bytes).unwrap();
        assert_eq!(analysis.embedding.len(), EMBEDDING_DIMS);

        let norm: f32 = analysis.embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() <= 1e-4, "norm={norm}");
    }

    #[test]
    fn test_same_bytes_same_embedding() {
        let analyzer = FaceAnalyzer::new(Arc::new(HashEmbedBackend::new()));
        let bytes = png_bytes(64, 64, |x, y| ((x * 3 + y * 5) % 256) as u8);

        let a = analyzer.analyze(&bytes).unwrap();
        let b = analyzer.analyze(&bytes).unwrap();
        assert_eq!(a.embedding, b.embedding);
    }

    #[test]
    fn test_undecodable_bytes_fail() {
        let analyzer = FaceAnalyzer::new(Arc::new(HashEmbedBackend::new()));
        let err = analyzer.analyze(b"definitely not an image").unwrap_err();
        assert!(matches!(err, FaceError::DecodeError(_)));
    }

    #[test]
    fn test_largest_face_wins() {
        let small = face([0.0, 0.0, 10.0, 10.0], 0.99, EMBEDDING_DIMS);
        let mut large = face([0.0, 0.0, 40.0, 40.0], 0.70, EMBEDDING_DIMS);
        large.embedding = vec![2.0; EMBEDDING_DIMS];

        let analyzer = FaceAnalyzer::new(Arc::new(FixedBackend {
            faces: vec![small, large],
        }));
        let bytes = png_bytes(64, 64, |_, _| 100);

        let analysis = analyzer.analyze(&bytes).unwrap();
        assert_eq!(analysis.num_faces, 2);
        // The larger, lower-score face was selected
        assert!((analysis.detection_score - 0.70).abs() < 1e-6);
    }

    #[test]
    fn test_area_tie_breaks_on_score() {
        let a = face([0.0, 0.0, 20.0, 20.0], 0.60, EMBEDDING_DIMS);
        let b = face([10.0, 10.0, 30.0, 30.0], 0.95, EMBEDDING_DIMS);

        let analyzer = FaceAnalyzer::new(Arc::new(FixedBackend { faces: vec![a, b] }));
        let analysis = analyzer.analyze(&png_bytes(64, 64, |_, _| 50)).unwrap();
        assert!((analysis.detection_score - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_no_face_is_an_error() {
        let analyzer = FaceAnalyzer::new(Arc::new(FixedBackend { faces: vec![] }));
        let err = analyzer.analyze(&png_bytes(64, 64, |_, _| 0)).unwrap_err();
        assert!(matches!(err, FaceError::NoFaceDetected));
    }

    #[test]
    fn test_wrong_dimension_rejected() {
        let analyzer = FaceAnalyzer::new(Arc::new(FixedBackend {
            faces: vec![face([0.0, 0.0, 30.0, 30.0], 0.9, 128)],
        }));
        let err = analyzer.analyze(&png_bytes(64, 64, |_, _| 50)).unwrap_err();
        assert!(matches!(err, FaceError::EmbeddingDimension { got: 128, .. }));
    }

    #[test]
    fn test_quality_overall_band() {
        let quality = FaceQuality {
            bbox_area_ratio: 0.36,
            sharpness: 0.2,
            pose: 0.0,
        };
        let overall = quality.overall(0.9);
        assert!(overall > 0.0 && overall <= 1.0);
    }
}
