use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Voice app configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Tool server executable to spawn
    pub server_bin: PathBuf,

    /// Data directory shared with the server (keys, clients, index, audit)
    pub data_dir: PathBuf,

    /// Keypair and client registry locations within the data dir
    pub keys_dir: PathBuf,
    pub clients_file: PathBuf,

    /// Image file served by the built-in camera
    pub camera_image: PathBuf,

    /// Wake phrases, matched exactly (case-insensitive)
    pub wake_words: Vec<String>,

    /// Recognition distance threshold used by the flows
    pub distance_threshold: f32,

    /// Silence gate threshold (int16-equivalent RMS)
    pub silence_threshold: f32,

    /// Audio device settle delay
    pub transition_delay: Duration,

    /// Local LLM endpoint for intent parsing
    pub llm_endpoint: String,
    pub llm_model: String,
    pub llm_timeout: Duration,
    pub llm_enabled: bool,

    /// Vosk model directory (used by the `stt-vosk` backend)
    pub stt_model_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let data_dir: PathBuf = std::env::var("VISAGE_DATA_DIR")
            .unwrap_or_else(|_| "./visage_data".to_string())
            .into();

        let keys_dir = std::env::var("VISAGE_KEYS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("keys"));
        let clients_file = std::env::var("VISAGE_CLIENTS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("clients.json"));

        let server_bin = std::env::var("VISAGE_SERVER_BIN")
            .unwrap_or_else(|_| "visage-server".to_string())
            .into();

        let camera_image = std::env::var("VISAGE_CAMERA_IMAGE")
            .unwrap_or_else(|_| "./camera_frame.jpg".to_string())
            .into();

        let wake_words: Vec<String> = std::env::var("VISAGE_WAKE_WORDS")
            .unwrap_or_else(|_| "hello visage,hey visage".to_string())
            .split(',')
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .collect();

        let distance_threshold = std::env::var("VISAGE_DISTANCE_THRESHOLD")
            .unwrap_or_else(|_| "0.40".to_string())
            .parse()?;

        let silence_threshold = std::env::var("VISAGE_SILENCE_THRESHOLD")
            .unwrap_or_else(|_| "300.0".to_string())
            .parse()?;

        let transition_delay = Duration::from_millis(
            std::env::var("VISAGE_TRANSITION_DELAY_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()?,
        );

        let llm_endpoint = std::env::var("VISAGE_LLM_ENDPOINT")
            .unwrap_or_else(|_| "http://localhost:11434".to_string());
        let llm_model =
            std::env::var("VISAGE_LLM_MODEL").unwrap_or_else(|_| "gemma3:4b".to_string());
        let llm_timeout = Duration::from_secs(
            std::env::var("VISAGE_LLM_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
        );
        let llm_enabled = std::env::var("VISAGE_LLM_DISABLE")
            .map(|v| !(v == "1" || v.eq_ignore_ascii_case("true")))
            .unwrap_or(true);

        let stt_model_dir = std::env::var("VISAGE_STT_MODEL_DIR")
            .unwrap_or_else(|_| "./vosk-model-small-en-us-0.15".to_string())
            .into();

        Ok(Config {
            server_bin,
            data_dir,
            keys_dir,
            clients_file,
            camera_image,
            wake_words,
            distance_threshold,
            silence_threshold,
            transition_delay,
            llm_endpoint,
            llm_model,
            llm_timeout,
            llm_enabled,
            stt_model_dir,
        })
    }
}
