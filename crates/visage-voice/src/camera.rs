//! Camera seam.
//!
//! The orchestrators only need "give me a base64 JPEG/PNG of whoever is in
//! front of the device". A webcam backend plugs in through the same trait;
//! the built-in implementation serves a configured image file, which is
//! also what demos and tests use.

use crate::errors::*;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::PathBuf;

/// Contract for still-image capture.
pub trait Camera: Send {
    /// Capture one frame as base64-encoded image bytes.
    fn capture_base64(&mut self) -> Result<String>;
}

/// Serves a fixed image file as the "camera frame".
pub struct FileCamera {
    path: PathBuf,
}

impl FileCamera {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Camera for FileCamera {
    fn capture_base64(&mut self) -> Result<String> {
        let bytes = std::fs::read(&self.path)
            .map_err(|e| VoiceError::Camera(format!("cannot read {:?}: {}", self.path, e)))?;
        if bytes.is_empty() {
            return Err(VoiceError::Camera(format!("{:?} is empty", self.path)));
        }
        Ok(STANDARD.encode(bytes))
    }
}

/// In-memory camera for tests.
pub struct StaticCamera {
    data: Vec<u8>,
}

impl StaticCamera {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl Camera for StaticCamera {
    fn capture_base64(&mut self) -> Result<String> {
        if self.data.is_empty() {
            return Err(VoiceError::Camera("no frame available".into()));
        }
        Ok(STANDARD.encode(&self.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_camera_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("frame.jpg");
        std::fs::write(&path, b"jpegbytes").unwrap();

        let mut camera = FileCamera::new(path);
        let encoded = camera.capture_base64().unwrap();
        assert_eq!(STANDARD.decode(encoded).unwrap(), b"jpegbytes");
    }

    #[test]
    fn test_missing_file_is_camera_error() {
        let mut camera = FileCamera::new(PathBuf::from("/nonexistent/frame.jpg"));
        assert!(matches!(
            camera.capture_base64().unwrap_err(),
            VoiceError::Camera(_)
        ));
    }

    #[test]
    fn test_static_camera() {
        let mut camera = StaticCamera::new(vec![1, 2, 3]);
        assert_eq!(camera.capture_base64().unwrap(), STANDARD.encode([1, 2, 3]));
    }
}
