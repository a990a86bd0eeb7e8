#![deny(clippy::all, clippy::pedantic)]

use std::path::Path;

use edgepurge::{application::error::AppError, infra::error::InfraError};

pub mod credentials;
pub mod edge_modules;
pub mod purge;
pub mod service;
pub mod vcl;

/// Read a user supplied input file, naming it in the error.
pub async fn read_input(path: &Path) -> Result<String, AppError> {
    tokio::fs::read_to_string(path).await.map_err(|err| {
        let err = std::io::Error::new(err.kind(), format!("{}: {err}", path.display()));
        AppError::from(InfraError::from(err))
    })
}
