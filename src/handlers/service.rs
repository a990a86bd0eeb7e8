#![deny(clippy::all, clippy::pedantic)]

use edgepurge::{
    application::error::AppError,
    config::{ServiceCommand, TokenCommand},
};

use crate::context::Ctx;
use crate::print::print_json;

pub async fn handle(ctx: &Ctx, cmd: ServiceCommand) -> Result<(), AppError> {
    let client = ctx.client()?;
    match cmd {
        ServiceCommand::Info => print_json(&client.service().await?),
        ServiceCommand::List => print_json(&client.list_services().await?),
        ServiceCommand::Details => print_json(&client.service_details().await?),
    }
}

pub async fn handle_token(ctx: &Ctx, cmd: TokenCommand) -> Result<(), AppError> {
    match cmd {
        TokenCommand::Info => print_json(&ctx.client()?.token_info().await?),
    }
}
