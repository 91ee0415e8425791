use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecipeError {
    #[error("unknown recipe '{0}' (expected login-probe, upload-navigation or provider-selection)")]
    UnknownRecipe(String),

    #[error("invalid portal target {field}: {reason}")]
    InvalidTarget { field: &'static str, reason: String },
}

impl RecipeError {
    pub fn invalid_target(field: &'static str, reason: impl Into<String>) -> Self {
        RecipeError::InvalidTarget {
            field,
            reason: reason.into(),
        }
    }
}
