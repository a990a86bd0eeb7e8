#![deny(clippy::all, clippy::pedantic)]

use std::path::Path;

use edgepurge::{
    application::{
        edge_modules::{self, EdgeModule},
        error::AppError,
    },
    config::EdgeModulesCommand,
};

use super::read_input;
use crate::context::Ctx;
use crate::print::print_json;

pub async fn handle(ctx: &Ctx, cmd: EdgeModulesCommand) -> Result<(), AppError> {
    match cmd {
        EdgeModulesCommand::List => print_json(&edge_modules::catalog()),
        EdgeModulesCommand::Upload { module, values } => upload(ctx, &module, &values).await,
        EdgeModulesCommand::Remove { module } => remove(ctx, &module).await,
    }
}

async fn upload(ctx: &Ctx, module: &str, values: &Path) -> Result<(), AppError> {
    let module: EdgeModule = module.parse()?;
    let values = read_input(values).await?;
    // Render before touching the service so bad values cost no requests.
    module.render(&values)?;

    let outcome = edge_modules::upload(&ctx.workflow()?, module, &values).await?;
    print_json(&outcome)
}

async fn remove(ctx: &Ctx, module: &str) -> Result<(), AppError> {
    let module: EdgeModule = module.parse()?;
    let outcome = edge_modules::remove(&ctx.workflow()?, module).await?;
    print_json(&outcome)
}
