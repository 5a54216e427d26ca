use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use visage_voice::arbiter::AudioDeviceArbiter;
use visage_voice::camera::FileCamera;
use visage_voice::client::ServerCommand;
use visage_voice::config::Config;
use visage_voice::facade::{SyncToolFacade, ToolSurface};
use visage_voice::flows::{self, FlowContext};
use visage_voice::intent::{IntentConfig, IntentOracle};
use visage_voice::speech::audio::{CaptureDevice, SilenceDetector};
use visage_voice::speech::transcribe::{Grammar, SpeechDecoder, TranscriptionEngine};
use visage_voice::speech::tts::Synthesizer;
use visage_voice::speech::wake::WakeWordDetector;
use visage_voice::speech::{SpeechPipeline, RESPONSE_CAPTURE};

/// Session commands recognized after the wake word.
const COMMANDS: &[&str] = &[
    "recognize me",
    "register me",
    "update my profile",
    "delete my profile",
    "stop listening",
];

fn print_help() {
    eprintln!(
        r#"visage-voice - voice assistant for the Visage recognition service

USAGE:
    visage-voice [OPTIONS]

OPTIONS:
    -h, --help    Print this help

ENVIRONMENT VARIABLES:
    VISAGE_SERVER_BIN             Tool server executable (default: visage-server)
    VISAGE_DATA_DIR               Shared data directory (default: ./visage_data)
    VISAGE_CAMERA_IMAGE           Image file served as the camera frame
    VISAGE_WAKE_WORDS             Comma-separated wake phrases
    VISAGE_DISTANCE_THRESHOLD     Recognition distance cap (default: 0.40)
    VISAGE_SILENCE_THRESHOLD      Silence gate, int16-equivalent RMS (default: 300)
    VISAGE_TRANSITION_DELAY_MS    Audio settle delay (default: 500)
    VISAGE_LLM_ENDPOINT           Intent LLM endpoint (default: http://localhost:11434)
    VISAGE_LLM_MODEL              Intent LLM model (default: gemma3:4b)
    VISAGE_LLM_TIMEOUT_SECS       Intent LLM timeout (default: 5)
    VISAGE_LLM_DISABLE            Use keyword parsing only
    VISAGE_STT_MODEL_DIR          Vosk model directory (stt-vosk builds)

Build features `audio-cpal`, `stt-vosk` and `tts-native` select the real
microphone, decoder and voice backends.
"#
    );
}

fn main() -> Result<()> {
    if std::env::args().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "visage_voice=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let has_audio_backend =
        cfg!(feature = "audio-cpal") && cfg!(feature = "stt-vosk");

    // Provision an access token against the shared keystore; the server
    // validates it with the same keypair
    let access_token = provision_token(&config)?;

    // Assemble the speech pipeline from configured backends
    let capture = build_capture(&config)?;
    let decoder = build_decoder(&config)?;
    let synthesizer = build_synthesizer()?;

    let mut speech = SpeechPipeline::new(
        AudioDeviceArbiter::new(config.transition_delay),
        capture,
        SilenceDetector::new(config.silence_threshold),
        TranscriptionEngine::new(decoder),
        synthesizer,
        WakeWordDetector::new(config.wake_words.clone()),
    );

    let oracle = IntentOracle::new(IntentConfig {
        endpoint: config.llm_endpoint.clone(),
        model: config.llm_model.clone(),
        timeout: config.llm_timeout,
        enable_llm: config.llm_enabled,
        ..IntentConfig::default()
    })?;

    let mut camera = FileCamera::new(config.camera_image.clone());

    let mut tools = SyncToolFacade::connect(&ServerCommand {
        program: config.server_bin.clone(),
        data_dir: config.data_dir.clone(),
    })
    .context("could not start the tool server")?;

    speech.speak("Visage assistant ready. Say a wake word to begin.")?;

    if !has_audio_backend {
        tracing::warn!(
            "Built without `audio-cpal`/`stt-vosk`; there is no microphone to listen on. \
             Exiting after connectivity check."
        );
        tools.get_health_status(&access_token)?;
        tracing::info!("Tool server reachable; shutting down");
        return Ok(());
    }

    run_session_loop(
        &mut speech,
        &mut tools,
        &mut camera,
        &oracle,
        &access_token,
        config.distance_threshold,
    )?;

    tools.disconnect();
    Ok(())
}

/// Wake-word loop: wake, take one command, run its flow, repeat.
fn run_session_loop(
    speech: &mut SpeechPipeline,
    tools: &mut SyncToolFacade,
    camera: &mut FileCamera,
    oracle: &IntentOracle,
    access_token: &str,
    threshold: f32,
) -> Result<()> {
    let command_grammar = Grammar::new(COMMANDS.iter().copied())
        .map_err(|e| anyhow::anyhow!("command grammar: {}", e))?;

    loop {
        let Some(wake_word) = speech.listen_for_wake_word()? else {
            continue;
        };
        tracing::info!(wake_word = %wake_word, "Wake word detected");
        speech.speak("Yes?")?;

        let Some(heard) = speech.listen_phrase(&command_grammar, RESPONSE_CAPTURE)? else {
            speech.speak("I didn't hear a command. Say recognize me, register me, update my profile, or delete my profile.")?;
            continue;
        };

        match heard.as_str() {
            "stop listening" => {
                speech.speak("Goodbye!")?;
                return Ok(());
            }
            command @ ("recognize me" | "register me" | "update my profile"
            | "delete my profile") => {
                let mut ctx = FlowContext {
                    speech: &mut *speech,
                    tools: &mut *tools,
                    camera: &mut *camera,
                    oracle,
                    access_token,
                    threshold,
                };
                match command {
                    "recognize me" => flows::recognize::run(&mut ctx)?,
                    "register me" => flows::register::run(&mut ctx)?,
                    "update my profile" => flows::update::run(&mut ctx)?,
                    _ => flows::delete::run(&mut ctx)?,
                };
            }
            _ => {
                speech.speak("I didn't understand that command.")?;
            }
        }
    }
}

/// Issue an access token from the shared keystore, creating a client for
/// this assistant if none is configured.
fn provision_token(config: &Config) -> Result<String> {
    let keypair = visage_crypto::RsaKeyPair::load_or_generate(&config.keys_dir)?;
    let registry = visage_crypto::ClientRegistry::open(config.clients_file.clone())?;

    let (client_id, client_secret) = match (
        std::env::var("VISAGE_CLIENT_ID"),
        std::env::var("VISAGE_CLIENT_SECRET"),
    ) {
        (Ok(id), Ok(secret)) => (id, secret),
        _ => {
            let creds = registry.create_client("voice assistant")?;
            tracing::info!(client_id = %creds.client_id, "Provisioned voice assistant client");
            (creds.client_id, creds.client_secret.to_string())
        }
    };

    let authority = visage_crypto::TokenAuthority::new(
        &keypair,
        registry,
        visage_crypto::DEFAULT_TOKEN_TTL_SECS,
    )?;
    Ok(authority.issue_token(&client_id, &client_secret)?)
}

fn build_capture(config: &Config) -> Result<Box<dyn CaptureDevice>> {
    #[cfg(feature = "audio-cpal")]
    {
        let _ = config;
        return Ok(Box::new(
            visage_voice::speech::audio::cpal_backend::CpalCapture::open_default()?,
        ));
    }
    #[cfg(not(feature = "audio-cpal"))]
    {
        let _ = config;
        Ok(Box::new(
            visage_voice::speech::audio::ScriptedCapture::empty(),
        ))
    }
}

fn build_decoder(config: &Config) -> Result<Box<dyn SpeechDecoder>> {
    #[cfg(feature = "stt-vosk")]
    {
        return Ok(Box::new(
            visage_voice::speech::transcribe::vosk_backend::VoskDecoder::load(
                &config.stt_model_dir,
            )?,
        ));
    }
    #[cfg(not(feature = "stt-vosk"))]
    {
        let _ = config;
        Ok(Box::new(
            visage_voice::speech::transcribe::ScriptedDecoder::empty(),
        ))
    }
}

fn build_synthesizer() -> Result<Box<dyn Synthesizer>> {
    #[cfg(feature = "tts-native")]
    {
        return Ok(Box::new(
            visage_voice::speech::tts::native_backend::NativeSynthesizer::new()?,
        ));
    }
    #[cfg(not(feature = "tts-native"))]
    {
        Ok(Box::new(
            visage_voice::speech::tts::ConsoleSynthesizer::new(),
        ))
    }
}
