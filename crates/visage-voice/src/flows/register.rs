//! Register flow: capture a spoken name, confirm it, photograph, enroll.

use super::{
    ask_confirmation, clean_name_transcript, listen_response, speak_tool_error, FlowContext,
    FlowOutcome,
};
use crate::errors::*;
use crate::intent::Intent;
use std::collections::BTreeMap;
use tracing::info;

/// Attempts at hearing a usable full name before giving up.
const NAME_ATTEMPTS: usize = 2;

pub fn run(ctx: &mut FlowContext) -> Result<FlowOutcome> {
    info!("Register flow started");

    let Some(name) = capture_name(ctx)? else {
        ctx.speech
            .speak("I'm sorry, I couldn't get your name. Let's try again later.")?;
        return Ok(FlowOutcome::Cancelled);
    };

    ctx.speech
        .speak(&format!("Great, {}. Please look at the camera.", name))?;
    let image = match ctx.camera.capture_base64() {
        Ok(image) => image,
        Err(e) => {
            info!("Registration capture failed: {}", e);
            ctx.speech
                .speak("I couldn't capture your photo. Registration cancelled.")?;
            return Ok(FlowOutcome::Cancelled);
        }
    };

    let result = ctx
        .tools
        .register_user(ctx.access_token, &name, &image, &BTreeMap::new())?;

    match result["status"].as_str() {
        Some("registered") => {
            info!(name = %name, "Registration complete");
            ctx.speech
                .speak(&format!("Welcome, {}! You're all set.", name))?;
            Ok(FlowOutcome::Completed)
        }
        Some("queued") => {
            let position = result["user"]["queue_position"].as_u64().unwrap_or(0);
            info!(name = %name, position, "Registration queued");
            ctx.speech.speak(&format!(
                "The face database is catching up, {}. I've queued your registration \
                 and it will complete automatically in a moment.",
                name
            ))?;
            Ok(FlowOutcome::Completed)
        }
        Some("already_exists") => {
            info!(name = %name, "Duplicate registration");
            ctx.speech.speak(&format!(
                "It looks like you're already registered, {}. No need to sign up twice.",
                name
            ))?;
            Ok(FlowOutcome::Cancelled)
        }
        _ => {
            speak_tool_error(ctx, &result)?;
            Ok(FlowOutcome::Cancelled)
        }
    }
}

/// Prompt-listen-confirm loop for the user's full name.
fn capture_name(ctx: &mut FlowContext) -> Result<Option<String>> {
    ctx.speech
        .speak("Let's get you registered. Please tell me your full name.")?;

    for attempt in 0..NAME_ATTEMPTS {
        let heard = listen_response(ctx)?;
        if heard.is_empty() {
            if attempt + 1 < NAME_ATTEMPTS {
                ctx.speech.speak("Please say your first and last name.")?;
            }
            continue;
        }

        let Some(name) = clean_name_transcript(&heard) else {
            info!(heard = %heard, "Transcription did not look like a full name");
            if attempt + 1 < NAME_ATTEMPTS {
                ctx.speech.speak(
                    "That didn't sound like a full name. Please say your first and last name.",
                )?;
            }
            continue;
        };

        let question = format!("I heard {}. Is that correct?", name);
        match ask_confirmation(ctx, &question)? {
            Intent::Affirmative => return Ok(Some(name)),
            Intent::Negative => {
                if attempt + 1 < NAME_ATTEMPTS {
                    ctx.speech.speak("My mistake. Let's try once more.")?;
                }
            }
            Intent::Unclear => {
                // One unclear answer costs the attempt, not the flow
                if attempt + 1 < NAME_ATTEMPTS {
                    ctx.speech
                        .speak("I didn't catch that. Let's try your name again.")?;
                }
            }
        }
    }

    Ok(None)
}
