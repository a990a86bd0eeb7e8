//! Cache-tag to surrogate-key mapping, purge orchestration and service
//! version management for sites behind a Fastly-compatible CDN.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
