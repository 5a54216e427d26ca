//! Multi-turn voice flows.
//!
//! Each flow is a small state machine whose steps are prompt-and-listen,
//! camera capture, or a tool call through the sync facade. Audit trails are
//! produced server-side by the tool calls themselves.

pub mod delete;
pub mod recognize;
pub mod register;
pub mod update;

use crate::camera::Camera;
use crate::errors::*;
use crate::facade::ToolSurface;
use crate::intent::{Intent, IntentOracle};
use crate::speech::{SpeechPipeline, RESPONSE_CAPTURE};
use serde_json::Value;
use tracing::info;

/// Everything a flow needs for one session.
pub struct FlowContext<'a> {
    pub speech: &'a mut SpeechPipeline,
    pub tools: &'a mut dyn ToolSurface,
    pub camera: &'a mut dyn Camera,
    pub oracle: &'a IntentOracle,
    pub access_token: &'a str,
    pub threshold: f32,
}

/// How a flow ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowOutcome {
    Completed,
    Cancelled,
}

/// Similarity percentage for spoken greetings only; tool decisions always
/// use raw cosine distance.
pub fn similarity_percent(distance: f64) -> f64 {
    ((1.0 - distance / 2.0) * 100.0).clamp(0.0, 100.0)
}

/// Listen for a free-form response, retrying once on silence or an empty
/// decode. Returns an empty string when both attempts hear nothing.
pub fn listen_response(ctx: &mut FlowContext) -> Result<String> {
    for attempt in 0..2 {
        if let Some(text) = ctx.speech.listen_free(RESPONSE_CAPTURE)? {
            if !text.trim().is_empty() {
                return Ok(text);
            }
        }
        if attempt == 0 {
            ctx.speech.speak("Sorry, I didn't catch that. Could you repeat?")?;
        }
    }
    Ok(String::new())
}

/// Ask a yes/no question and classify the answer.
pub fn ask_confirmation(ctx: &mut FlowContext, question: &str) -> Result<Intent> {
    ctx.speech.speak(question)?;
    let answer = listen_response(ctx)?;
    Ok(ctx.oracle.classify(&answer, Some(question)))
}

/// A user proven present by face recognition.
#[derive(Debug, Clone)]
pub struct RecognizedUser {
    pub user_id: String,
    pub name: String,
    pub distance: f64,
}

/// Identity proof step shared by the update and delete flows.
pub fn recognize_identity(ctx: &mut FlowContext) -> Result<Option<RecognizedUser>> {
    ctx.speech
        .speak("Please look at the camera so I can confirm your identity.")?;

    let image = match ctx.camera.capture_base64() {
        Ok(image) => image,
        Err(e) => {
            info!("Identity capture failed: {}", e);
            ctx.speech
                .speak("I couldn't capture your image. Please try again later.")?;
            return Ok(None);
        }
    };

    let result = ctx
        .tools
        .recognize_face(ctx.access_token, &image, ctx.threshold)?;

    match result["status"].as_str() {
        Some("recognized") => {
            let user = &result["user"];
            Ok(Some(RecognizedUser {
                user_id: user["user_id"].as_str().unwrap_or_default().to_string(),
                name: user["name"].as_str().unwrap_or_default().to_string(),
                distance: result["distance"].as_f64().unwrap_or(2.0),
            }))
        }
        Some("not_recognized") => {
            ctx.speech
                .speak("I don't recognize you. Only registered users can do that.")?;
            Ok(None)
        }
        Some("error") => {
            speak_tool_error(ctx, &result)?;
            Ok(None)
        }
        _ => {
            ctx.speech
                .speak("Something went wrong while checking your identity.")?;
            Ok(None)
        }
    }
}

/// Spoken recovery for a tool-level error object.
pub fn speak_tool_error(ctx: &mut FlowContext, result: &Value) -> Result<()> {
    let kind = result["kind"].as_str().unwrap_or("internal");
    let line = match kind {
        "unavailable" => "That part of the system is offline right now. Please try again later.",
        "unauthenticated" => "My access credentials have expired. Please restart me.",
        "validation" => "I couldn't make out a clear face. Please face the camera in good light.",
        "not_found" => "I couldn't find that profile anymore.",
        _ => "Something went wrong on my side. Please try again later.",
    };
    ctx.speech.speak(line)
}

/// Normalize a transcribed name: strip lead-ins, title-case, and validate
/// that it looks like a spoken full name.
pub fn clean_name_transcript(raw: &str) -> Option<String> {
    let mut text = raw.trim().to_lowercase();
    for prefix in ["my name is ", "my name's ", "i am ", "i'm ", "it's ", "this is "] {
        if let Some(rest) = text.strip_prefix(prefix) {
            text = rest.to_string();
            break;
        }
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() < 2 || words.len() > 6 {
        return None;
    }
    if !words
        .iter()
        .all(|w| w.chars().all(|c| c.is_ascii_alphabetic() || matches!(c, '-' | '\'' | '.')))
    {
        return None;
    }

    let name = words
        .iter()
        .map(|w| title_case(w))
        .collect::<Vec<_>>()
        .join(" ");
    let len = name.chars().count();
    if !(2..=100).contains(&len) {
        return None;
    }
    Some(name)
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Which fields the update flow should touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldChoice {
    Name,
    Metadata,
    Both,
}

/// Synonym set for spoken field selection.
pub fn parse_field_choice(heard: &str) -> Option<FieldChoice> {
    match heard.trim().to_lowercase().as_str() {
        "name" | "my name" => Some(FieldChoice::Name),
        "metadata" | "information" | "details" | "profile" | "data" | "notes" | "settings"
        | "properties" | "attributes" | "my information" => Some(FieldChoice::Metadata),
        "both" | "everything" | "all" | "name and information" => Some(FieldChoice::Both),
        _ => None,
    }
}

/// Grammar phrases matching [`parse_field_choice`].
pub fn field_choice_phrases() -> Vec<String> {
    [
        "name",
        "my name",
        "metadata",
        "information",
        "details",
        "profile",
        "data",
        "notes",
        "settings",
        "properties",
        "attributes",
        "my information",
        "both",
        "everything",
        "all",
        "name and information",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similarity_percent() {
        assert_eq!(similarity_percent(0.0), 100.0);
        assert_eq!(similarity_percent(2.0), 0.0);
        assert!((similarity_percent(0.2) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_clean_name_transcript() {
        assert_eq!(
            clean_name_transcript("my name is jane doe"),
            Some("Jane Doe".to_string())
        );
        assert_eq!(
            clean_name_transcript("i'm mary-jane o'neil"),
            Some("Mary-jane O'neil".to_string())
        );
        assert_eq!(clean_name_transcript("jane"), None);
        assert_eq!(clean_name_transcript("jane 42 doe"), None);
        assert_eq!(clean_name_transcript(""), None);
    }

    #[test]
    fn test_parse_field_choice() {
        assert_eq!(parse_field_choice("name"), Some(FieldChoice::Name));
        assert_eq!(parse_field_choice("Information"), Some(FieldChoice::Metadata));
        assert_eq!(parse_field_choice("both"), Some(FieldChoice::Both));
        assert_eq!(parse_field_choice("the weather"), None);
    }

    #[test]
    fn test_field_phrases_all_parse() {
        for phrase in field_choice_phrases() {
            assert!(
                parse_field_choice(&phrase).is_some(),
                "phrase '{phrase}' must parse"
            );
        }
    }
}
