//! Keys of the workflow inputs the recipes read.

use action_primitives::WorkflowInputs;

pub const USERNAME: &str = "username";
pub const PASSWORD: &str = "password";
pub const PROVIDER: &str = "provider";

/// Inputs from `required` that are absent or blank.
pub fn missing<'a>(inputs: &WorkflowInputs, required: &[&'a str]) -> Vec<&'a str> {
    required
        .iter()
        .copied()
        .filter(|key| inputs.get(key).map_or(true, |value| value.trim().is_empty()))
        .collect()
}
