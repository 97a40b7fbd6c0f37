//! Dataset id validation.
//!
//! Valid ids are non-empty and made only of ASCII letters, digits, `-`, `_`
//! and `/`.

use crate::error::{DatasError, DatasResult};

fn is_id_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '/')
}

/// Validate a dataset id, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use cairn_datas::names::validate_dataset_id;
///
/// assert!(validate_dataset_id("main").is_ok());
/// assert!(validate_dataset_id("users/alice").is_ok());
/// assert!(validate_dataset_id("").is_err());
/// assert!(validate_dataset_id("has space").is_err());
/// ```
pub fn validate_dataset_id(id: &str) -> DatasResult<()> {
    if id.is_empty() {
        return Err(DatasError::InvalidDatasetId {
            id: id.to_string(),
            reason: "dataset id must not be empty".into(),
        });
    }
    if let Some(ch) = id.chars().find(|ch| !is_id_char(*ch)) {
        return Err(DatasError::InvalidDatasetId {
            id: id.to_string(),
            reason: format!("contains forbidden character: {ch:?}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_simple_ids() {
        assert!(validate_dataset_id("main").is_ok());
        assert!(validate_dataset_id("my-dataset").is_ok());
        assert!(validate_dataset_id("snake_case_2").is_ok());
    }

    #[test]
    fn valid_nested_ids() {
        assert!(validate_dataset_id("users/alice/photos").is_ok());
        assert!(validate_dataset_id("/leading/slash/").is_ok());
    }

    #[test]
    fn reject_empty_id() {
        assert!(validate_dataset_id("").is_err());
    }

    #[test]
    fn reject_forbidden_chars() {
        for id in ["a b", "a.b", "a:b", "a?b", "a\tb", "ünïcode", "a@b"] {
            assert!(validate_dataset_id(id).is_err(), "{id:?} should be rejected");
        }
    }

    #[test]
    fn error_names_offending_character() {
        let err = validate_dataset_id("bad.id").unwrap_err();
        assert!(err.to_string().contains("'.'"));
    }
}
