//! Delete flow: identity proof, two confirmations, removal.
//!
//! Deletion is destructive, so every confirmation applies the strict rule:
//! anything short of a clear yes cancels.

use super::{ask_confirmation, recognize_identity, speak_tool_error, FlowContext, FlowOutcome};
use crate::errors::*;
use tracing::info;

pub fn run(ctx: &mut FlowContext) -> Result<FlowOutcome> {
    info!("Delete flow started");

    let Some(user) = recognize_identity(ctx)? else {
        return Ok(FlowOutcome::Cancelled);
    };
    info!(user_id = %user.user_id, distance = user.distance, "Identity proven for deletion");

    let identity = ask_confirmation(
        ctx,
        &format!(
            "I recognized you as {}. Is that correct? Say yes to continue or no to cancel.",
            user.name
        ),
    )?;
    if !identity.confirmed_strictly() {
        ctx.speech
            .speak("Identity not confirmed. Deletion cancelled.")?;
        return Ok(FlowOutcome::Cancelled);
    }

    let finality = ask_confirmation(
        ctx,
        &format!(
            "{}, this will permanently delete your face profile and all associated \
             information. This cannot be undone. Say yes to proceed, or no to cancel.",
            user.name
        ),
    )?;
    if !finality.confirmed_strictly() {
        info!("Final confirmation not given; deletion cancelled");
        ctx.speech
            .speak("Deletion cancelled. Your data has been preserved.")?;
        return Ok(FlowOutcome::Cancelled);
    }

    ctx.speech.speak("Deleting your profile now.")?;
    let result = ctx.tools.delete_user(ctx.access_token, &user.user_id)?;

    match result["status"].as_str() {
        Some("ok") => {
            info!(user_id = %user.user_id, "Profile deleted");
            ctx.speech.speak(&format!(
                "Your profile has been deleted, {}. Goodbye.",
                user.name
            ))?;
            Ok(FlowOutcome::Completed)
        }
        _ => {
            speak_tool_error(ctx, &result)?;
            Ok(FlowOutcome::Cancelled)
        }
    }
}
