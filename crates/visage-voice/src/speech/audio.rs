//! Microphone capture and the silence gate.

use crate::errors::*;
use std::time::Duration;
use tracing::debug;

/// Fixed capture rate for the whole pipeline.
pub const SAMPLE_RATE: u32 = 16_000;

/// Silence threshold on the int16-equivalent scale the decoders were tuned
/// against.
pub const DEFAULT_ENERGY_THRESHOLD: f32 = 300.0;

/// Mono float32 audio in `[-1, 1]`, discarded after transcription.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Root-mean-square amplitude in `[0, 1]`.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = self.samples.iter().map(|s| s * s).sum();
        (sum_sq / self.samples.len() as f32).sqrt()
    }

    /// RMS on the int16-equivalent scale used by the energy threshold.
    pub fn energy(&self) -> f32 {
        self.rms() * 32768.0
    }
}

/// Contract for microphone backends.
pub trait CaptureDevice: Send {
    /// Record exactly `duration` of mono audio at [`SAMPLE_RATE`].
    fn capture(&mut self, duration: Duration) -> Result<AudioBuffer>;

    /// Device name for logs and diagnostics.
    fn device_name(&self) -> String;
}

/// Drops buffers whose energy falls below the configured threshold so they
/// never reach the decoder.
#[derive(Debug, Clone)]
pub struct SilenceDetector {
    energy_threshold: f32,
}

impl SilenceDetector {
    pub fn new(energy_threshold: f32) -> Self {
        Self { energy_threshold }
    }

    pub fn is_silent(&self, buffer: &AudioBuffer) -> bool {
        let energy = buffer.energy();
        let silent = energy < self.energy_threshold;
        if silent {
            debug!(energy, threshold = self.energy_threshold, "Capture gated as silence");
        }
        silent
    }
}

impl Default for SilenceDetector {
    fn default() -> Self {
        Self::new(DEFAULT_ENERGY_THRESHOLD)
    }
}

/// Capture backend over the system microphone via cpal.
#[cfg(feature = "audio-cpal")]
pub mod cpal_backend {
    use super::*;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::sync::mpsc;

    /// Default-input-device capture at the pipeline's fixed rate.
    pub struct CpalCapture {
        device: cpal::Device,
    }

    impl CpalCapture {
        pub fn open_default() -> Result<Self> {
            let host = cpal::default_host();
            let device = host
                .default_input_device()
                .ok_or_else(|| VoiceError::Capture("no default input device".into()))?;
            Ok(Self { device })
        }
    }

    impl CaptureDevice for CpalCapture {
        fn capture(&mut self, duration: Duration) -> Result<AudioBuffer> {
            let config = cpal::StreamConfig {
                channels: 1,
                sample_rate: cpal::SampleRate(SAMPLE_RATE),
                buffer_size: cpal::BufferSize::Default,
            };

            let wanted = (duration.as_secs_f64() * SAMPLE_RATE as f64) as usize;
            let (tx, rx) = mpsc::channel::<Vec<f32>>();

            let stream = self
                .device
                .build_input_stream(
                    &config,
                    move |data: &[f32], _| {
                        let _ = tx.send(data.to_vec());
                    },
                    |e| tracing::warn!("cpal stream error: {}", e),
                    None,
                )
                .map_err(|e| VoiceError::Capture(e.to_string()))?;
            stream.play().map_err(|e| VoiceError::Capture(e.to_string()))?;

            let mut samples = Vec::with_capacity(wanted);
            let deadline = std::time::Instant::now() + duration + Duration::from_millis(500);
            while samples.len() < wanted && std::time::Instant::now() < deadline {
                if let Ok(chunk) = rx.recv_timeout(Duration::from_millis(100)) {
                    samples.extend(chunk);
                }
            }
            drop(stream);
            samples.truncate(wanted);

            Ok(AudioBuffer::new(samples, SAMPLE_RATE))
        }

        fn device_name(&self) -> String {
            self.device
                .name()
                .unwrap_or_else(|_| "unknown input".to_string())
        }
    }
}

/// Capture backend that replays scripted buffers; used by tests and by
/// builds without a hardware feature enabled.
pub struct ScriptedCapture {
    buffers: std::collections::VecDeque<AudioBuffer>,
}

impl ScriptedCapture {
    pub fn new(buffers: Vec<AudioBuffer>) -> Self {
        Self {
            buffers: buffers.into(),
        }
    }

    pub fn empty() -> Self {
        Self {
            buffers: Default::default(),
        }
    }
}

impl CaptureDevice for ScriptedCapture {
    fn capture(&mut self, duration: Duration) -> Result<AudioBuffer> {
        Ok(self.buffers.pop_front().unwrap_or_else(|| {
            let samples = (duration.as_secs_f64() * SAMPLE_RATE as f64) as usize;
            AudioBuffer::new(vec![0.0; samples], SAMPLE_RATE)
        }))
    }

    fn device_name(&self) -> String {
        "scripted".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(amplitude: f32, seconds: f32) -> AudioBuffer {
        let n = (seconds * SAMPLE_RATE as f32) as usize;
        AudioBuffer::new(vec![amplitude; n], SAMPLE_RATE)
    }

    #[test]
    fn test_rms_and_energy() {
        let buffer = tone(0.5, 0.1);
        assert!((buffer.rms() - 0.5).abs() < 1e-6);
        assert!((buffer.energy() - 16384.0).abs() < 1.0);
    }

    #[test]
    fn test_empty_buffer_is_quiet() {
        let buffer = AudioBuffer::new(vec![], SAMPLE_RATE);
        assert_eq!(buffer.rms(), 0.0);
        assert_eq!(buffer.duration(), Duration::ZERO);
    }

    #[test]
    fn test_silence_gate() {
        let detector = SilenceDetector::default();
        assert!(detector.is_silent(&tone(0.001, 0.1)));
        assert!(!detector.is_silent(&tone(0.25, 0.1)));
    }

    #[test]
    fn test_scripted_capture_replays_then_silences() {
        let mut capture = ScriptedCapture::new(vec![tone(0.3, 0.1)]);
        let first = capture.capture(Duration::from_millis(100)).unwrap();
        assert!(first.rms() > 0.2);

        let second = capture.capture(Duration::from_millis(100)).unwrap();
        assert_eq!(second.rms(), 0.0);
        assert_eq!(second.samples.len(), 1600);
    }
}
