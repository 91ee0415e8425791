//! Two-tier option matching for select controls.

use cdp_adapter::SelectOptionEntry;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("empty target")]
    EmptyTarget,
    #[error("no option matches '{0}'")]
    NoMatch(String),
}

/// Pick the option for `target` from `options`, in document order.
///
/// 1. exact `value` equality, ignoring options with an empty value (placeholders);
/// 2. otherwise the first option whose label contains the target, case-insensitively.
///
/// The target is trimmed first; a blank target never matches anything.
pub fn match_option<'a>(
    options: &'a [SelectOptionEntry],
    target: &str,
) -> Result<&'a SelectOptionEntry, MatchError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(MatchError::EmptyTarget);
    }

    if let Some(exact) = options
        .iter()
        .find(|option| !option.value.is_empty() && option.value == target)
    {
        return Ok(exact);
    }

    let needle = target.to_lowercase();
    options
        .iter()
        .find(|option| option.label.trim().to_lowercase().contains(&needle))
        .ok_or_else(|| MatchError::NoMatch(target.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn providers() -> Vec<SelectOptionEntry> {
        vec![
            SelectOptionEntry::new("", "-- Selezionare --"),
            SelectOptionEntry::new("15215", "SNAITECH S.P.A."),
            SelectOptionEntry::new("15380", "Lottomatica Giochi"),
            SelectOptionEntry::new("99", "Provider 15215 Holding"),
        ]
    }

    #[test]
    fn exact_value_beats_label_substring() {
        let options = providers();
        let picked = match_option(&options, "15215").unwrap();
        assert_eq!(picked.label, "SNAITECH S.P.A.");
    }

    #[test]
    fn label_substring_is_case_insensitive() {
        let options = providers();
        let picked = match_option(&options, " snaitech ").unwrap();
        assert_eq!(picked.value, "15215");
        let picked = match_option(&options, "LOTTOMATICA").unwrap();
        assert_eq!(picked.value, "15380");
    }

    #[test]
    fn empty_placeholder_value_is_not_an_exact_match() {
        let options = vec![
            SelectOptionEntry::new("", "Empty"),
            SelectOptionEntry::new("1", "Something empty-ish"),
        ];
        // Label "Empty" still matches by substring, in document order.
        let picked = match_option(&options, "empty").unwrap();
        assert_eq!(picked.label, "Empty");
    }

    #[test]
    fn blank_target_and_no_match() {
        let options = providers();
        assert_eq!(match_option(&options, "   "), Err(MatchError::EmptyTarget));
        assert_eq!(
            match_option(&options, "Sisal"),
            Err(MatchError::NoMatch("Sisal".into()))
        );
        assert_eq!(
            match_option(&[], "Sisal"),
            Err(MatchError::NoMatch("Sisal".into()))
        );
    }
}
