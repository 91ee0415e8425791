//! portalflow library
//!
//! The outer surfaces around the stage-readiness engine: configuration, the per-run artifact
//! directory, the recipe service and its CLI and HTTP front doors.

pub mod artifacts;
pub mod cli;
pub mod config;
pub mod server;
pub mod service;

pub use config::AppConfig;
pub use service::{Credentials, PortalService, RunReport, ServiceError};
