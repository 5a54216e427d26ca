//! Speech-to-text with optional grammar constraint.
//!
//! The constrained decoder takes its phrase list as a JSON **array**. The
//! offline decoder silently recognizes nothing when handed the
//! `{"grammar": [...]}` object form, so that shape is rejected at
//! construction time as a typed error instead of failing at runtime.

use super::audio::AudioBuffer;
use crate::errors::*;
use serde_json::Value;
use tracing::debug;

/// A validated list of recognizable phrases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grammar {
    phrases: Vec<String>,
}

impl Grammar {
    /// Build from phrases. Phrases are lowercased and trimmed; empties are
    /// rejected.
    pub fn new(phrases: impl IntoIterator<Item = impl Into<String>>) -> Result<Self> {
        let phrases: Vec<String> = phrases
            .into_iter()
            .map(|p| p.into().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        if phrases.is_empty() {
            return Err(VoiceError::InvalidGrammarShape { got: "empty list" });
        }
        Ok(Self { phrases })
    }

    /// Build from a JSON value. Only an array of strings is accepted; any
    /// object wrapper is a configuration error.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Array(items) => {
                let mut phrases = Vec::with_capacity(items.len());
                for item in items {
                    match item.as_str() {
                        Some(s) => phrases.push(s.to_string()),
                        None => return Err(VoiceError::InvalidGrammarShape { got: "non-string element" }),
                    }
                }
                Self::new(phrases)
            }
            Value::Object(_) => Err(VoiceError::InvalidGrammarShape { got: "object" }),
            Value::String(_) => Err(VoiceError::InvalidGrammarShape { got: "string" }),
            Value::Null => Err(VoiceError::InvalidGrammarShape { got: "null" }),
            Value::Bool(_) => Err(VoiceError::InvalidGrammarShape { got: "bool" }),
            Value::Number(_) => Err(VoiceError::InvalidGrammarShape { got: "number" }),
        }
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// The exact wire form the decoder expects: a JSON array of phrases.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.phrases).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Contract for speech decoding backends.
pub trait SpeechDecoder: Send {
    /// Constrained decode: the result is one of the grammar phrases or an
    /// empty string.
    fn decode_grammar(&mut self, audio: &AudioBuffer, grammar: &Grammar) -> Result<String>;

    /// Free-form decode: best English hypothesis, possibly empty.
    fn decode_free(&mut self, audio: &AudioBuffer) -> Result<String>;
}

/// Validates audio and delegates to the configured decoder.
pub struct TranscriptionEngine {
    decoder: Box<dyn SpeechDecoder>,
}

impl TranscriptionEngine {
    pub fn new(decoder: Box<dyn SpeechDecoder>) -> Self {
        Self { decoder }
    }

    fn usable(audio: &AudioBuffer) -> bool {
        // A tenth of a second is the shortest utterance worth decoding
        let min_samples = audio.sample_rate as usize / 10;
        !audio.samples.is_empty()
            && audio.samples.len() >= min_samples
            && audio.samples.iter().all(|s| s.is_finite())
    }

    /// Grammar-constrained transcription.
    pub fn transcribe_grammar(&mut self, audio: &AudioBuffer, grammar: &Grammar) -> Result<String> {
        if !Self::usable(audio) {
            return Ok(String::new());
        }
        let text = self.decoder.decode_grammar(audio, grammar)?;
        debug!(text = %text, "Grammar transcription");
        Ok(text)
    }

    /// Free-form transcription.
    pub fn transcribe_free(&mut self, audio: &AudioBuffer) -> Result<String> {
        if !Self::usable(audio) {
            return Ok(String::new());
        }
        let text = self.decoder.decode_free(audio)?;
        debug!(text = %text, "Free-form transcription");
        Ok(text)
    }
}

/// Offline decoder over a Vosk model directory.
#[cfg(feature = "stt-vosk")]
pub mod vosk_backend {
    use super::*;
    use std::path::Path;

    pub struct VoskDecoder {
        model: vosk::Model,
        sample_rate: f32,
    }

    impl VoskDecoder {
        pub fn load(model_dir: &Path) -> Result<Self> {
            let model = vosk::Model::new(model_dir.to_string_lossy().as_ref())
                .ok_or_else(|| {
                    VoiceError::Transcription(format!("cannot load model at {:?}", model_dir))
                })?;
            Ok(Self {
                model,
                sample_rate: super::super::audio::SAMPLE_RATE as f32,
            })
        }

        fn to_int16(audio: &AudioBuffer) -> Vec<i16> {
            audio
                .samples
                .iter()
                .map(|s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
                .collect()
        }
    }

    impl SpeechDecoder for VoskDecoder {
        fn decode_grammar(&mut self, audio: &AudioBuffer, grammar: &Grammar) -> Result<String> {
            let phrases: Vec<&str> = grammar.phrases().iter().map(String::as_str).collect();
            let mut recognizer =
                vosk::Recognizer::new_with_grammar(&self.model, self.sample_rate, &phrases)
                    .ok_or_else(|| {
                        VoiceError::Transcription("recognizer construction failed".into())
                    })?;

            let _ = recognizer.accept_waveform(&Self::to_int16(audio));
            let result = recognizer.final_result();
            Ok(result
                .single()
                .map(|r| r.text.to_string())
                .unwrap_or_default())
        }

        fn decode_free(&mut self, audio: &AudioBuffer) -> Result<String> {
            let mut recognizer = vosk::Recognizer::new(&self.model, self.sample_rate)
                .ok_or_else(|| {
                    VoiceError::Transcription("recognizer construction failed".into())
                })?;

            let _ = recognizer.accept_waveform(&Self::to_int16(audio));
            let result = recognizer.final_result();
            Ok(result
                .single()
                .map(|r| r.text.to_string())
                .unwrap_or_default())
        }
    }
}

/// Scripted decoder for tests and model-free builds: returns queued lines,
/// constrained to the grammar when one is given.
pub struct ScriptedDecoder {
    lines: std::collections::VecDeque<String>,
}

impl ScriptedDecoder {
    pub fn new(lines: Vec<&str>) -> Self {
        Self {
            lines: lines.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            lines: Default::default(),
        }
    }
}

impl SpeechDecoder for ScriptedDecoder {
    fn decode_grammar(&mut self, _audio: &AudioBuffer, grammar: &Grammar) -> Result<String> {
        let Some(line) = self.lines.pop_front() else {
            return Ok(String::new());
        };
        let line = line.to_lowercase();
        if grammar.phrases().iter().any(|p| p == &line) {
            Ok(line)
        } else {
            // A constrained decoder cannot emit out-of-grammar text
            Ok(String::new())
        }
    }

    fn decode_free(&mut self, _audio: &AudioBuffer) -> Result<String> {
        Ok(self.lines.pop_front().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::audio::SAMPLE_RATE;
    use serde_json::json;

    fn speech() -> AudioBuffer {
        AudioBuffer::new(vec![0.25; SAMPLE_RATE as usize], SAMPLE_RATE)
    }

    #[test]
    fn test_grammar_array_accepted() {
        let grammar = Grammar::from_json(&json!(["hello visage", "hey visage"])).unwrap();
        assert_eq!(grammar.phrases().len(), 2);
        assert_eq!(grammar.to_json(), r#"["hello visage","hey visage"]"#);
    }

    #[test]
    fn test_grammar_object_rejected() {
        let err = Grammar::from_json(&json!({"grammar": ["hello visage"]})).unwrap_err();
        assert!(matches!(
            err,
            VoiceError::InvalidGrammarShape { got: "object" }
        ));
    }

    #[test]
    fn test_grammar_rejects_other_shapes() {
        assert!(Grammar::from_json(&json!("hello")).is_err());
        assert!(Grammar::from_json(&json!(null)).is_err());
        assert!(Grammar::from_json(&json!([1, 2])).is_err());
        assert!(Grammar::from_json(&json!([])).is_err());
    }

    #[test]
    fn test_grammar_normalizes_phrases() {
        let grammar = Grammar::new(["  Hello Visage  "]).unwrap();
        assert_eq!(grammar.phrases(), &["hello visage".to_string()]);
    }

    #[test]
    fn test_engine_skips_unusable_audio() {
        let mut engine = TranscriptionEngine::new(Box::new(ScriptedDecoder::new(vec![
            "should never surface",
        ])));
        let tiny = AudioBuffer::new(vec![0.5; 10], SAMPLE_RATE);
        assert_eq!(engine.transcribe_free(&tiny).unwrap(), "");

        let nan = AudioBuffer::new(vec![f32::NAN; SAMPLE_RATE as usize], SAMPLE_RATE);
        assert_eq!(engine.transcribe_free(&nan).unwrap(), "");
    }

    #[test]
    fn test_scripted_decoder_respects_grammar() {
        let grammar = Grammar::new(["recognize me", "register me"]).unwrap();
        let mut engine = TranscriptionEngine::new(Box::new(ScriptedDecoder::new(vec![
            "recognize me",
            "something else entirely",
        ])));

        assert_eq!(
            engine.transcribe_grammar(&speech(), &grammar).unwrap(),
            "recognize me"
        );
        assert_eq!(engine.transcribe_grammar(&speech(), &grammar).unwrap(), "");
    }
}
