//! Update flow: identity proof, field selection, capture, preview, commit.

use super::{
    ask_confirmation, clean_name_transcript, field_choice_phrases, listen_response,
    parse_field_choice, recognize_identity, speak_tool_error, FieldChoice, FlowContext,
    FlowOutcome,
};
use crate::errors::*;
use crate::intent::Intent;
use crate::speech::transcribe::Grammar;
use crate::speech::RESPONSE_CAPTURE;
use std::collections::BTreeMap;
use tracing::info;

pub fn run(ctx: &mut FlowContext) -> Result<FlowOutcome> {
    info!("Update flow started");

    let Some(user) = recognize_identity(ctx)? else {
        return Ok(FlowOutcome::Cancelled);
    };

    let identity = ask_confirmation(
        ctx,
        &format!("I recognized you as {}. Is that correct?", user.name),
    )?;
    if !identity.confirmed_strictly() {
        ctx.speech.speak("Identity not confirmed. Update cancelled.")?;
        return Ok(FlowOutcome::Cancelled);
    }

    let Some(choice) = select_fields(ctx)? else {
        ctx.speech
            .speak("I couldn't tell what you'd like to change. Update cancelled.")?;
        return Ok(FlowOutcome::Cancelled);
    };
    info!(?choice, "Update fields selected");

    let mut new_name: Option<String> = None;
    let mut new_metadata: Option<BTreeMap<String, String>> = None;

    if matches!(choice, FieldChoice::Name | FieldChoice::Both) {
        match capture_new_name(ctx)? {
            Some(name) => new_name = Some(name),
            None => {
                ctx.speech
                    .speak("I couldn't get the new name. Update cancelled.")?;
                return Ok(FlowOutcome::Cancelled);
            }
        }
    }

    if matches!(choice, FieldChoice::Metadata | FieldChoice::Both) {
        match capture_new_information(ctx)? {
            Some(info_text) => {
                let mut metadata = BTreeMap::new();
                metadata.insert("information".to_string(), info_text);
                new_metadata = Some(metadata);
            }
            None => {
                ctx.speech
                    .speak("I couldn't get the new information. Update cancelled.")?;
                return Ok(FlowOutcome::Cancelled);
            }
        }
    }

    // Spoken preview, then one final gate; this mutates a profile, so the
    // strict rule applies
    let preview = preview_line(&user.name, new_name.as_deref(), new_metadata.as_ref());
    let finality = ask_confirmation(ctx, &format!("{} Shall I save these changes?", preview))?;
    if !finality.confirmed_strictly() {
        ctx.speech.speak("No changes were made.")?;
        return Ok(FlowOutcome::Cancelled);
    }

    let result = ctx.tools.update_user(
        ctx.access_token,
        &user.user_id,
        new_name.as_deref(),
        new_metadata.as_ref(),
    )?;

    match result["status"].as_str() {
        Some("ok") => {
            info!(user_id = %user.user_id, "Profile updated");
            ctx.speech.speak("Done. Your profile has been updated.")?;
            Ok(FlowOutcome::Completed)
        }
        _ => {
            speak_tool_error(ctx, &result)?;
            Ok(FlowOutcome::Cancelled)
        }
    }
}

/// Grammar-constrained field selection with one retry.
fn select_fields(ctx: &mut FlowContext) -> Result<Option<FieldChoice>> {
    let grammar = Grammar::new(field_choice_phrases())?;

    for attempt in 0..2 {
        ctx.speech.speak(
            "What would you like to update: your name, your information, or both?",
        )?;
        if let Some(heard) = ctx.speech.listen_phrase(&grammar, RESPONSE_CAPTURE)? {
            if let Some(choice) = parse_field_choice(&heard) {
                return Ok(Some(choice));
            }
        }
        if attempt == 0 {
            ctx.speech
                .speak("You can say name, information, or both.")?;
        }
    }
    Ok(None)
}

fn capture_new_name(ctx: &mut FlowContext) -> Result<Option<String>> {
    ctx.speech.speak("What should your new name be?")?;

    for attempt in 0..2 {
        let heard = listen_response(ctx)?;
        if let Some(name) = clean_name_transcript(&heard) {
            let confirmed =
                ask_confirmation(ctx, &format!("Your new name is {}. Correct?", name))?;
            if confirmed == Intent::Affirmative {
                return Ok(Some(name));
            }
        }
        if attempt == 0 {
            ctx.speech
                .speak("Please say the new first and last name.")?;
        }
    }
    Ok(None)
}

fn capture_new_information(ctx: &mut FlowContext) -> Result<Option<String>> {
    ctx.speech
        .speak("Tell me the information you'd like me to keep on your profile.")?;

    for attempt in 0..2 {
        let heard = listen_response(ctx)?;
        if !heard.trim().is_empty() {
            let confirmed = ask_confirmation(
                ctx,
                &format!("I heard: {}. Should I save that?", heard.trim()),
            )?;
            if confirmed == Intent::Affirmative {
                return Ok(Some(heard.trim().to_string()));
            }
        }
        if attempt == 0 {
            ctx.speech.speak("Go ahead, I'm listening.")?;
        }
    }
    Ok(None)
}

fn preview_line(
    current_name: &str,
    new_name: Option<&str>,
    new_metadata: Option<&BTreeMap<String, String>>,
) -> String {
    match (new_name, new_metadata) {
        (Some(name), Some(_)) => format!(
            "I'll change your name from {} to {}, and update your information.",
            current_name, name
        ),
        (Some(name), None) => format!(
            "I'll change your name from {} to {}.",
            current_name, name
        ),
        (None, Some(_)) => "I'll update your profile information.".to_string(),
        (None, None) => "Nothing to change.".to_string(),
    }
}
