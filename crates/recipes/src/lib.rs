//! Stage definitions for the ADM customs portal.
//!
//! Every stage is plain data for the `action-flow` runner: one action, the probes that say it
//! took effect, and at most one corrective fallback. Recipes are ordered stage lists.

pub mod catalog;
pub mod errors;
pub mod inputs;
pub mod stages;
pub mod targets;

#[cfg(any(test, feature = "test-util"))]
pub mod simulation;

pub use catalog::Recipe;
pub use errors::RecipeError;
pub use targets::PortalTargets;
