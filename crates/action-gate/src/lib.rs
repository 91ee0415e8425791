//! Readiness probes and the probe race
//!
//! This crate decides whether a stage's action has propagated through the remote application:
//! - Probe model (visibility, url-pattern, network-quiescence, value-change, element-count)
//! - Ready / Reject roles, so known failure states can veto a success signal
//! - Baseline capture strictly before the action, for change-detection probes
//! - A first-match-wins race over all probes of a stage, on a single task

pub mod conditions;
pub mod errors;
pub mod evidence;
mod probe;
mod race;
pub mod types;

pub use conditions::*;
pub use errors::*;
pub use evidence::*;
pub use race::*;
pub use types::*;
