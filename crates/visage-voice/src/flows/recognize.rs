//! Recognize flow: consent, camera, match, greet.

use super::{
    ask_confirmation, register, similarity_percent, speak_tool_error, FlowContext, FlowOutcome,
};
use crate::errors::*;
use crate::intent::Intent;
use tracing::info;

pub fn run(ctx: &mut FlowContext) -> Result<FlowOutcome> {
    info!("Recognize flow started");

    let consent = ask_confirmation(ctx, "Shall I take a look and try to recognize you?")?;
    if consent != Intent::Affirmative {
        ctx.speech.speak("Alright, maybe another time.")?;
        return Ok(FlowOutcome::Cancelled);
    }

    ctx.speech.speak("Please look at the camera.")?;
    let image = match ctx.camera.capture_base64() {
        Ok(image) => image,
        Err(e) => {
            info!("Camera capture failed: {}", e);
            ctx.speech
                .speak("I couldn't see you. Please make sure the camera is working.")?;
            return Ok(FlowOutcome::Cancelled);
        }
    };

    let result = ctx
        .tools
        .recognize_face(ctx.access_token, &image, ctx.threshold)?;

    match result["status"].as_str() {
        Some("recognized") => {
            let name = result["user"]["name"].as_str().unwrap_or("friend");
            let distance = result["distance"].as_f64().unwrap_or(2.0);
            let percent = similarity_percent(distance).round() as i64;
            info!(name, distance, "User recognized");
            ctx.speech
                .speak(&format!("Hello, {}! I'm {} percent sure it's you.", name, percent))?;
            Ok(FlowOutcome::Completed)
        }
        Some("not_recognized") => {
            info!("Face not recognized");
            let register_consent =
                ask_confirmation(ctx, "Hello! I don't recognize you. Would you like to register?")?;
            if register_consent == Intent::Affirmative {
                return register::run(ctx);
            }
            ctx.speech.speak("No problem. Have a nice day!")?;
            Ok(FlowOutcome::Cancelled)
        }
        _ => {
            speak_tool_error(ctx, &result)?;
            Ok(FlowOutcome::Cancelled)
        }
    }
}
