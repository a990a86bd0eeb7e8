#![deny(clippy::all, clippy::pedantic)]

use edgepurge::{
    application::error::AppError,
    config::CredentialsCommand,
    domain::{credentials::CredentialVerdict, types::WebhookEvent},
};
use serde::Serialize;

use crate::context::Ctx;
use crate::print::print_json;

#[derive(Serialize)]
struct CheckOutput<'a> {
    service_id: &'a str,
    valid: bool,
    verdict: CredentialVerdict,
}

pub async fn handle(ctx: &Ctx, cmd: CredentialsCommand) -> Result<bool, AppError> {
    match cmd {
        CredentialsCommand::Check => check(ctx).await,
    }
}

async fn check(ctx: &Ctx) -> Result<bool, AppError> {
    let client = ctx.client()?;
    let verdict = ctx.guard(client.clone()).revalidate().await;
    let valid = verdict.is_valid();
    print_json(&CheckOutput {
        service_id: client.service_id(),
        valid,
        verdict,
    })?;

    ctx.notifier()?
        .notify(
            WebhookEvent::ConfigSave,
            &format!(
                "Purge credentials re-checked for service {}: {}",
                client.service_id(),
                verdict.as_str()
            ),
        )
        .await;
    Ok(valid)
}
