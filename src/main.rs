#![deny(clippy::all, clippy::pedantic)]

mod context;
mod handlers;
mod print;

use std::process::ExitCode;

use edgepurge::{
    application::error::AppError,
    config::{self, Command},
    infra::telemetry,
};
use tracing::{Dispatch, Level, dispatcher, error};
use tracing_subscriber::fmt as tracing_fmt;

use context::Ctx;
use handlers::{credentials, edge_modules, purge, service, vcl};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            report_application_error(&error);
            ExitCode::from(error.exit_code())
        }
    }
}

fn report_application_error(error: &AppError) {
    let chain = error.chain().join(": ");
    if dispatcher::has_been_set() {
        error!(error = %chain, "command failed");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %chain, "command failed");
    });
}

/// `Ok(false)` means the command ran but its operation did not succeed.
async fn run() -> Result<bool, AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let ctx = Ctx::new(settings);
    match cli_args.command {
        Command::Purge(args) => purge::handle(&ctx, args.target).await,
        Command::Invalidate(args) => purge::invalidate(&ctx, &args.tags).await,
        Command::Keys(args) => purge::keys(&ctx, &args.tags).await.map(|()| true),
        Command::SiteId => purge::site_id(&ctx).await.map(|()| true),
        Command::Credentials(args) => credentials::handle(&ctx, args.command).await,
        Command::Service(args) => service::handle(&ctx, args.command)
            .await
            .map(|()| true),
        Command::Token(args) => service::handle_token(&ctx, args.command)
            .await
            .map(|()| true),
        Command::Vcl(args) => vcl::handle(&ctx, args.command).await.map(|()| true),
        Command::ErrorPage(args) => vcl::handle_error_page(&ctx, args.command)
            .await
            .map(|()| true),
        Command::EdgeModules(args) => edge_modules::handle(&ctx, args.command)
            .await
            .map(|()| true),
    }
}
