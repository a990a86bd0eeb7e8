//! Infrastructure adapters and runtime bootstrap.

pub mod cdn;
pub mod error;
pub(crate) mod lock;
pub mod state;
pub mod telemetry;
pub mod webhook;
