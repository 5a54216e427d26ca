//! Text-to-speech synthesis.

use crate::errors::*;
use tracing::info;

/// Contract for synthesis backends. `speak` blocks until playback has
/// finished; the caller holds the playback guard for the whole call.
pub trait Synthesizer: Send {
    fn speak(&mut self, text: &str) -> Result<()>;
}

/// System TTS voice.
#[cfg(feature = "tts-native")]
pub mod native_backend {
    use super::*;
    use std::time::Duration;

    pub struct NativeSynthesizer {
        engine: tts::Tts,
    }

    impl NativeSynthesizer {
        pub fn new() -> Result<Self> {
            let engine = tts::Tts::default()
                .map_err(|e| VoiceError::Synthesis(e.to_string()))?;
            Ok(Self { engine })
        }
    }

    impl Synthesizer for NativeSynthesizer {
        fn speak(&mut self, text: &str) -> Result<()> {
            self.engine
                .speak(text, false)
                .map_err(|e| VoiceError::Synthesis(e.to_string()))?;

            // Block until playback drains
            loop {
                match self.engine.is_speaking() {
                    Ok(true) => std::thread::sleep(Duration::from_millis(50)),
                    Ok(false) => break,
                    Err(e) => return Err(VoiceError::Synthesis(e.to_string())),
                }
            }
            Ok(())
        }
    }
}

/// Prints instead of speaking; the default for model-free builds and the
/// whole story for tests.
#[derive(Debug, Default)]
pub struct ConsoleSynthesizer {
    pub spoken: Vec<String>,
}

impl ConsoleSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Synthesizer for ConsoleSynthesizer {
    fn speak(&mut self, text: &str) -> Result<()> {
        info!(text = %text, "TTS");
        self.spoken.push(text.to_string());
        Ok(())
    }
}
