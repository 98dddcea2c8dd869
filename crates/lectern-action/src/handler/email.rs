//! Mail handler.

use async_trait::async_trait;
use lectern_core::intent::Intent;
use lectern_core::taxonomy::keys;
use serde_json::json;

use super::{plural, ActionCall, ActionHandler, BackendResultExt, Step};
use crate::types::{EntityKind, FailureKind, OrchestratorResponse};

const DEFAULT_SUBJECT: &str = "Message from your teacher";

pub struct EmailHandler;

#[async_trait]
impl ActionHandler for EmailHandler {
    fn intents(&self) -> &'static [Intent] {
        &[Intent::SendEmail, Intent::ListEmails]
    }

    async fn execute(&self, call: &ActionCall<'_>) -> OrchestratorResponse {
        let step = match call.intent {
            Intent::SendEmail => send_email(call).await,
            _ => list_emails(call).await,
        };
        step.unwrap_or_else(|response| response)
    }
}

async fn send_email(call: &ActionCall<'_>) -> Step<OrchestratorResponse> {
    let recipients = call.list_param(keys::RECIPIENTS);
    if recipients.is_empty() {
        return Err(call.ask_for(keys::RECIPIENTS));
    }
    if let Some(bad) = recipients.iter().find(|r| !r.contains('@')) {
        return Err(OrchestratorResponse::failed(
            FailureKind::InvalidInput,
            format!("\"{}\" doesn't look like an email address.", bad),
        ));
    }
    let Some(body) = call.str_param(keys::BODY) else {
        return Err(call.ask_for(keys::BODY));
    };
    let subject = call.str_param(keys::SUBJECT).unwrap_or(DEFAULT_SUBJECT);

    let sent = call
        .backend
        .create(
            call.token,
            &EntityKind::Email,
            json!({"to": recipients, "subject": subject, "body": body}),
        )
        .await
        .or_fail(call.intent)?;

    Ok(OrchestratorResponse::completed_with(
        format!(
            "Sent \"{}\" to {}.",
            subject,
            recipients.join(", ")
        ),
        json!({"id": sent.id, "recipients": recipients.len()}),
    ))
}

async fn list_emails(call: &ActionCall<'_>) -> Step<OrchestratorResponse> {
    let emails = call
        .backend
        .list(call.token, &EntityKind::Email)
        .await
        .or_fail(call.intent)?;
    if emails.is_empty() {
        return Ok(OrchestratorResponse::completed("Your inbox has no recent emails."));
    }

    let lines: Vec<String> = emails
        .iter()
        .map(|e| match e.field("from") {
            Some(from) => format!("- {} (from {})", e.display_name, from),
            None => format!("- {}", e.display_name),
        })
        .collect();
    Ok(OrchestratorResponse::completed_with(
        format!("Your {}:\n{}", plural(emails.len(), "recent email"), lines.join("\n")),
        json!({"count": emails.len()}),
    ))
}
