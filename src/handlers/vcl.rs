#![deny(clippy::all, clippy::pedantic)]

use std::path::Path;

use edgepurge::{
    application::{error::AppError, image_optimizer},
    config::{ErrorPageCommand, ImageOptimizerCommand, VclCommand},
    domain::image::OptimizeLevel,
};

use super::read_input;
use crate::context::Ctx;
use crate::print::print_json;

pub async fn handle(ctx: &Ctx, cmd: VclCommand) -> Result<(), AppError> {
    let workflow = ctx.workflow()?;
    match cmd {
        VclCommand::Upload { activate } => {
            let outcome = workflow.upload_defaults(&ctx.settings.vcl, activate).await?;
            print_json(&outcome)
        }
        VclCommand::Snippets => print_json(&workflow.active_snippets().await?),
        VclCommand::Acls => print_json(&workflow.active_acls().await?),
        VclCommand::Dictionaries => print_json(&workflow.active_dictionaries().await?),
        VclCommand::ImageOptimizer(command) => match command {
            ImageOptimizerCommand::Status => {
                print_json(&image_optimizer::status(workflow.client()).await?)
            }
            ImageOptimizerCommand::Enable { optimize } => {
                let mut settings = ctx.settings.image_optimizer;
                if let Some(level) = optimize {
                    settings.optimize = level.parse::<OptimizeLevel>()?;
                }
                print_json(&image_optimizer::enable(&workflow, &settings).await?)
            }
            ImageOptimizerCommand::Disable => {
                print_json(&image_optimizer::disable(&workflow).await?)
            }
        },
    }
}

pub async fn handle_error_page(ctx: &Ctx, cmd: ErrorPageCommand) -> Result<(), AppError> {
    match cmd {
        ErrorPageCommand::Upload { file } => upload_error_page(ctx, &file).await,
    }
}

async fn upload_error_page(ctx: &Ctx, file: &Path) -> Result<(), AppError> {
    let html = read_input(file).await?;
    let outcome = ctx.workflow()?.upload_error_page(&html).await?;
    print_json(&outcome)
}
