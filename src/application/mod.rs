//! Application services: credential gate, purge orchestration, invalidation
//! and the service version workflows.

pub mod credentials;
pub mod edge_modules;
pub mod error;
pub mod image_optimizer;
pub mod invalidator;
pub mod purger;
pub mod repos;
pub mod vcl;
