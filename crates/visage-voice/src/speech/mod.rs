//! Speech pipeline facade.
//!
//! Five small collaborators (capture, silence gate, transcription, wake
//! matching, synthesis) behind one orchestrating type. Every microphone or
//! speaker touch serializes through the audio arbiter.

pub mod audio;
pub mod transcribe;
pub mod tts;
pub mod wake;

use crate::arbiter::AudioDeviceArbiter;
use crate::errors::*;
use audio::{AudioBuffer, CaptureDevice, SilenceDetector};
use std::time::Duration;
use transcribe::{Grammar, TranscriptionEngine};
use tracing::debug;
use tts::Synthesizer;
use wake::WakeWordDetector;

/// Default capture lengths.
pub const WAKE_CAPTURE: Duration = Duration::from_secs(3);
pub const RESPONSE_CAPTURE: Duration = Duration::from_secs(5);

/// One voice pipeline: exclusive microphone/speaker access plus decoding.
pub struct SpeechPipeline {
    arbiter: AudioDeviceArbiter,
    input: Box<dyn CaptureDevice>,
    silence: SilenceDetector,
    engine: TranscriptionEngine,
    synthesizer: Box<dyn Synthesizer>,
    wake: WakeWordDetector,
}

impl SpeechPipeline {
    pub fn new(
        arbiter: AudioDeviceArbiter,
        input: Box<dyn CaptureDevice>,
        silence: SilenceDetector,
        engine: TranscriptionEngine,
        synthesizer: Box<dyn Synthesizer>,
        wake: WakeWordDetector,
    ) -> Self {
        debug!(device = %input.device_name(), "Speech pipeline ready");
        Self {
            arbiter,
            input,
            silence,
            engine,
            synthesizer,
            wake,
        }
    }

    pub fn wake_detector(&self) -> &WakeWordDetector {
        &self.wake
    }

    /// Speak, holding the playback side of the device until done.
    pub fn speak(&mut self, text: &str) -> Result<()> {
        let _guard = self.arbiter.acquire_for_playback()?;
        self.synthesizer.speak(text)
    }

    fn capture(&mut self, duration: Duration) -> Result<Option<AudioBuffer>> {
        let buffer = {
            let _guard = self.arbiter.acquire_for_recording()?;
            self.input.capture(duration)?
        };
        if self.silence.is_silent(&buffer) {
            return Ok(None);
        }
        Ok(Some(buffer))
    }

    /// Capture then decode against a grammar. `None` means silence,
    /// `Some("")` means speech the grammar could not account for.
    pub fn listen_phrase(
        &mut self,
        grammar: &Grammar,
        duration: Duration,
    ) -> Result<Option<String>> {
        let Some(buffer) = self.capture(duration)? else {
            return Ok(None);
        };
        let text = self.engine.transcribe_grammar(&buffer, grammar)?;
        Ok(Some(text))
    }

    /// Capture then decode free-form.
    pub fn listen_free(&mut self, duration: Duration) -> Result<Option<String>> {
        let Some(buffer) = self.capture(duration)? else {
            return Ok(None);
        };
        let text = self.engine.transcribe_free(&buffer)?;
        Ok(Some(text))
    }

    /// One wake-word listening window. Returns the matched wake word.
    pub fn listen_for_wake_word(&mut self) -> Result<Option<String>> {
        let grammar = Grammar::new(self.wake.wake_words().to_vec())?;
        let Some(text) = self.listen_phrase(&grammar, WAKE_CAPTURE)? else {
            return Ok(None);
        };
        Ok(self.wake.matches(&text).map(str::to_string))
    }
}
