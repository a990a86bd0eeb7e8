#![deny(clippy::all, clippy::pedantic)]

use edgepurge::application::error::AppError;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::unexpected(format!("failed to render output: {e}")))?;
    println!("{out}");
    Ok(())
}

/// One line per purge command, so scripts can grep for the verdict.
pub fn print_outcome(ok: bool, success: &str, failure: &str) -> bool {
    if ok {
        println!("{success}");
    } else {
        println!("{failure}");
    }
    ok
}
