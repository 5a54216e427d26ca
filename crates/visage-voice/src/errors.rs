//! Voice app error types.

use thiserror::Error;

/// Errors produced by the voice orchestrator and its audio plumbing
#[derive(Debug, Error)]
pub enum VoiceError {
    /// Audio device is held by another operation
    #[error("Audio device busy: currently {state}")]
    Busy { state: &'static str },

    /// Microphone capture failed
    #[error("Audio capture failed: {0}")]
    Capture(String),

    /// Grammar payload was not a JSON array of phrases
    #[error("Invalid grammar shape: expected a JSON array of phrases, got {got}")]
    InvalidGrammarShape { got: &'static str },

    /// Speech decoding failed
    #[error("Transcription failed: {0}")]
    Transcription(String),

    /// Text-to-speech synthesis failed
    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    /// Camera capture failed
    #[error("Camera capture failed: {0}")]
    Camera(String),

    /// Tool server process or transport failure
    #[error("Tool client error: {0}")]
    Client(String),

    /// Tool call exceeded its deadline
    #[error("Tool call timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Facade used before connect or after disconnect
    #[error("Tool facade is not connected")]
    NotConnected,

    /// Token provisioning against the shared keystore failed
    #[error(transparent)]
    Crypto(#[from] visage_crypto::CryptoError),

    /// I/O on the child process pipes
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON-RPC traffic
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type for voice app operations
pub type Result<T> = std::result::Result<T, VoiceError>;
