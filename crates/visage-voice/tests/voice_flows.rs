//! Flow tests over scripted audio, camera and tool backends.

use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use visage_voice::arbiter::AudioDeviceArbiter;
use visage_voice::camera::StaticCamera;
use visage_voice::errors::Result;
use visage_voice::facade::ToolSurface;
use visage_voice::flows::{self, FlowContext, FlowOutcome};
use visage_voice::intent::{IntentConfig, IntentOracle};
use visage_voice::speech::audio::{AudioBuffer, ScriptedCapture, SilenceDetector, SAMPLE_RATE};
use visage_voice::speech::transcribe::{ScriptedDecoder, TranscriptionEngine};
use visage_voice::speech::tts::ConsoleSynthesizer;
use visage_voice::speech::wake::WakeWordDetector;
use visage_voice::speech::SpeechPipeline;

/// Records every tool call and replays scripted results.
#[derive(Default)]
struct ScriptedTools {
    calls: Vec<String>,
    recognize_result: Option<Value>,
    register_result: Option<Value>,
    delete_result: Option<Value>,
    update_result: Option<Value>,
}

impl ToolSurface for ScriptedTools {
    fn recognize_face(&mut self, _t: &str, _i: &str, _c: f32) -> Result<Value> {
        self.calls.push("recognize_face".into());
        Ok(self
            .recognize_result
            .clone()
            .unwrap_or_else(|| json!({"status": "not_recognized", "threshold": 0.4})))
    }

    fn register_user(
        &mut self,
        _t: &str,
        name: &str,
        _i: &str,
        _m: &BTreeMap<String, String>,
    ) -> Result<Value> {
        self.calls.push(format!("register_user:{name}"));
        Ok(self.register_result.clone().unwrap_or_else(|| {
            json!({"status": "registered", "user": {"user_id": "x_1", "name": name}})
        }))
    }

    fn get_user_profile(&mut self, _t: &str, user_id: &str) -> Result<Value> {
        self.calls.push(format!("get_user_profile:{user_id}"));
        Ok(json!({"user_id": user_id, "name": "Jane Doe", "metadata": {}}))
    }

    fn list_users(&mut self, _t: &str, _l: usize, _o: usize) -> Result<Value> {
        self.calls.push("list_users".into());
        Ok(json!({"total": 0, "users": []}))
    }

    fn update_user(
        &mut self,
        _t: &str,
        user_id: &str,
        _n: Option<&str>,
        _m: Option<&BTreeMap<String, String>>,
    ) -> Result<Value> {
        self.calls.push(format!("update_user:{user_id}"));
        Ok(self
            .update_result
            .clone()
            .unwrap_or_else(|| json!({"status": "ok", "user": {"user_id": user_id}})))
    }

    fn delete_user(&mut self, _t: &str, user_id: &str) -> Result<Value> {
        self.calls.push(format!("delete_user:{user_id}"));
        Ok(self
            .delete_result
            .clone()
            .unwrap_or_else(|| json!({"status": "ok"})))
    }

    fn get_database_stats(&mut self, _t: &str) -> Result<Value> {
        self.calls.push("get_database_stats".into());
        Ok(json!({"count": 0}))
    }

    fn get_health_status(&mut self, _t: &str) -> Result<Value> {
        self.calls.push("get_health_status".into());
        Ok(json!({"overall": "healthy"}))
    }
}

fn loud_buffer() -> AudioBuffer {
    AudioBuffer::new(vec![0.25; SAMPLE_RATE as usize], SAMPLE_RATE)
}

/// Pipeline whose capture always hears speech and whose decoder replays
/// `lines` in order.
fn scripted_pipeline(lines: Vec<&'static str>) -> SpeechPipeline {
    let captures = (0..lines.len().max(8)).map(|_| loud_buffer()).collect();
    SpeechPipeline::new(
        AudioDeviceArbiter::new(Duration::ZERO),
        Box::new(ScriptedCapture::new(captures)),
        SilenceDetector::default(),
        TranscriptionEngine::new(Box::new(ScriptedDecoder::new(lines))),
        Box::new(ConsoleSynthesizer::new()),
        WakeWordDetector::new(["hello visage"]),
    )
}

fn keyword_oracle() -> IntentOracle {
    IntentOracle::new(IntentConfig {
        enable_llm: false,
        ..IntentConfig::default()
    })
    .unwrap()
}

fn png_frame() -> Vec<u8> {
    // Any non-empty bytes; the scripted tools never decode them
    b"not really a png but good enough".to_vec()
}

#[test]
fn deletion_cancels_on_unclear_final_confirmation() {
    // Identity confirmed, then the final confirmation transcribes to
    // "maybe": the profile must survive and delete_user must never fire
    let mut speech = scripted_pipeline(vec!["yes", "maybe"]);
    let mut tools = ScriptedTools {
        recognize_result: Some(json!({
            "status": "recognized",
            "distance": 0.05,
            "threshold": 0.4,
            "user": {"user_id": "jane_doe_1", "name": "Jane Doe"},
        })),
        ..Default::default()
    };
    let mut camera = StaticCamera::new(png_frame());
    let oracle = keyword_oracle();

    let mut ctx = FlowContext {
        speech: &mut speech,
        tools: &mut tools,
        camera: &mut camera,
        oracle: &oracle,
        access_token: "token",
        threshold: 0.4,
    };

    let outcome = flows::delete::run(&mut ctx).unwrap();
    assert_eq!(outcome, FlowOutcome::Cancelled);
    assert!(tools.calls.iter().any(|c| c == "recognize_face"));
    assert!(
        !tools.calls.iter().any(|c| c.starts_with("delete_user")),
        "delete_user must not be called: {:?}",
        tools.calls
    );
}

#[test]
fn deletion_completes_on_two_clear_confirmations() {
    let mut speech = scripted_pipeline(vec!["yes", "yes"]);
    let mut tools = ScriptedTools {
        recognize_result: Some(json!({
            "status": "recognized",
            "distance": 0.05,
            "threshold": 0.4,
            "user": {"user_id": "jane_doe_1", "name": "Jane Doe"},
        })),
        ..Default::default()
    };
    let mut camera = StaticCamera::new(png_frame());
    let oracle = keyword_oracle();

    let mut ctx = FlowContext {
        speech: &mut speech,
        tools: &mut tools,
        camera: &mut camera,
        oracle: &oracle,
        access_token: "token",
        threshold: 0.4,
    };

    let outcome = flows::delete::run(&mut ctx).unwrap();
    assert_eq!(outcome, FlowOutcome::Completed);
    assert!(tools.calls.iter().any(|c| c == "delete_user:jane_doe_1"));
}

#[test]
fn deletion_blocked_for_unrecognized_face() {
    let mut speech = scripted_pipeline(vec![]);
    let mut tools = ScriptedTools::default(); // recognize -> not_recognized
    let mut camera = StaticCamera::new(png_frame());
    let oracle = keyword_oracle();

    let mut ctx = FlowContext {
        speech: &mut speech,
        tools: &mut tools,
        camera: &mut camera,
        oracle: &oracle,
        access_token: "token",
        threshold: 0.4,
    };

    let outcome = flows::delete::run(&mut ctx).unwrap();
    assert_eq!(outcome, FlowOutcome::Cancelled);
    assert!(!tools.calls.iter().any(|c| c.starts_with("delete_user")));
}

#[test]
fn register_flow_happy_path() {
    // Name, then "yes" to the name confirmation
    let mut speech = scripted_pipeline(vec!["my name is jane doe", "yes"]);
    let mut tools = ScriptedTools::default();
    let mut camera = StaticCamera::new(png_frame());
    let oracle = keyword_oracle();

    let mut ctx = FlowContext {
        speech: &mut speech,
        tools: &mut tools,
        camera: &mut camera,
        oracle: &oracle,
        access_token: "token",
        threshold: 0.4,
    };

    let outcome = flows::register::run(&mut ctx).unwrap();
    assert_eq!(outcome, FlowOutcome::Completed);
    assert!(tools.calls.iter().any(|c| c == "register_user:Jane Doe"));
}

#[test]
fn register_flow_speaks_queued_outcome() {
    let mut speech = scripted_pipeline(vec!["my name is jane doe", "yes"]);
    let mut tools = ScriptedTools {
        register_result: Some(json!({
            "status": "queued",
            "user": {"name": "Jane Doe", "queue_position": 1},
        })),
        ..Default::default()
    };
    let mut camera = StaticCamera::new(png_frame());
    let oracle = keyword_oracle();

    let mut ctx = FlowContext {
        speech: &mut speech,
        tools: &mut tools,
        camera: &mut camera,
        oracle: &oracle,
        access_token: "token",
        threshold: 0.4,
    };

    let outcome = flows::register::run(&mut ctx).unwrap();
    assert_eq!(outcome, FlowOutcome::Completed);
}

#[test]
fn recognize_flow_greets_known_user() {
    // Consent, then recognition
    let mut speech = scripted_pipeline(vec!["yes"]);
    let mut tools = ScriptedTools {
        recognize_result: Some(json!({
            "status": "recognized",
            "distance": 0.08,
            "threshold": 0.4,
            "user": {"user_id": "john_smith_1", "name": "John Smith"},
        })),
        ..Default::default()
    };
    let mut camera = StaticCamera::new(png_frame());
    let oracle = keyword_oracle();

    let mut ctx = FlowContext {
        speech: &mut speech,
        tools: &mut tools,
        camera: &mut camera,
        oracle: &oracle,
        access_token: "token",
        threshold: 0.4,
    };

    let outcome = flows::recognize::run(&mut ctx).unwrap();
    assert_eq!(outcome, FlowOutcome::Completed);
    assert_eq!(tools.calls, vec!["recognize_face"]);
}

#[test]
fn recognize_flow_declined_consent_makes_no_calls() {
    let mut speech = scripted_pipeline(vec!["no thanks"]);
    let mut tools = ScriptedTools::default();
    let mut camera = StaticCamera::new(png_frame());
    let oracle = keyword_oracle();

    let mut ctx = FlowContext {
        speech: &mut speech,
        tools: &mut tools,
        camera: &mut camera,
        oracle: &oracle,
        access_token: "token",
        threshold: 0.4,
    };

    let outcome = flows::recognize::run(&mut ctx).unwrap();
    assert_eq!(outcome, FlowOutcome::Cancelled);
    assert!(tools.calls.is_empty());
}

#[test]
fn update_flow_changes_name() {
    // yes (identity) -> "name" (field choice) -> new name -> yes (name
    // confirm) -> yes (final save)
    let mut speech = scripted_pipeline(vec![
        "yes",
        "name",
        "my name is jane smith",
        "yes",
        "yes",
    ]);
    let mut tools = ScriptedTools {
        recognize_result: Some(json!({
            "status": "recognized",
            "distance": 0.05,
            "threshold": 0.4,
            "user": {"user_id": "jane_doe_1", "name": "Jane Doe"},
        })),
        ..Default::default()
    };
    let mut camera = StaticCamera::new(png_frame());
    let oracle = keyword_oracle();

    let mut ctx = FlowContext {
        speech: &mut speech,
        tools: &mut tools,
        camera: &mut camera,
        oracle: &oracle,
        access_token: "token",
        threshold: 0.4,
    };

    let outcome = flows::update::run(&mut ctx).unwrap();
    assert_eq!(outcome, FlowOutcome::Completed);
    assert!(tools.calls.iter().any(|c| c == "update_user:jane_doe_1"));
}

#[test]
fn update_flow_unclear_final_confirmation_saves_nothing() {
    let mut speech = scripted_pipeline(vec![
        "yes",
        "name",
        "my name is jane smith",
        "yes",
        "hmm maybe",
    ]);
    let mut tools = ScriptedTools {
        recognize_result: Some(json!({
            "status": "recognized",
            "distance": 0.05,
            "threshold": 0.4,
            "user": {"user_id": "jane_doe_1", "name": "Jane Doe"},
        })),
        ..Default::default()
    };
    let mut camera = StaticCamera::new(png_frame());
    let oracle = keyword_oracle();

    let mut ctx = FlowContext {
        speech: &mut speech,
        tools: &mut tools,
        camera: &mut camera,
        oracle: &oracle,
        access_token: "token",
        threshold: 0.4,
    };

    let outcome = flows::update::run(&mut ctx).unwrap();
    assert_eq!(outcome, FlowOutcome::Cancelled);
    assert!(!tools.calls.iter().any(|c| c.starts_with("update_user")));
}
