//! Domain layer types and invariants.

pub mod credentials;
pub mod error;
pub mod image;
pub mod types;
