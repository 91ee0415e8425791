//! Action executor for portalflow stages
//!
//! This crate performs the single mutating action of a stage against a live session:
//! - navigate, fill, click, select option, dispatch change, hide
//! - composite actions (`Sequence`, `FirstOf`)
//! - bounded settle waits after an action (`WaitTier`)
//! - the pure two-tier option matcher used by select actions
//!
//! An executor reports whether the action was physically performed, independent of whether the
//! remote application reacted to it. Reaction is the job of the readiness probes.

pub mod errors;
mod executor;
mod matching;
pub mod types;
mod waiting;

pub use errors::*;
pub use executor::*;
pub use matching::*;
pub use types::*;
pub use waiting::*;
