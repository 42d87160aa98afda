//! Environment variable expansion for configuration strings.

use std::borrow::Cow;

use crate::ConfigError;

/// Expand `${VAR}` and `${VAR:-default}` references in `value`.
///
/// `field` names the config key for error messages.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    shellexpand::env(value)
        .map(Cow::into_owned)
        .map_err(|e| ConfigError::EnvVar {
            field: field.to_owned(),
            message: format!("${{{}}} not set", e.var_name),
        })
}

/// Expand an optional string in place.
pub(crate) fn expand_opt(value: &mut Option<String>, field: &str) -> Result<(), ConfigError> {
    if let Some(raw) = value.as_deref() {
        *value = Some(expand_env(raw, field)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_passes_through() {
        assert_eq!(expand_env("/media", "media.public_base").unwrap(), "/media");
    }

    #[test]
    fn test_default_used_when_unset() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("ARTNODE_EXPAND_UNSET");
        }
        assert_eq!(
            expand_env("${ARTNODE_EXPAND_UNSET:-fallback}", "media.signing_secret").unwrap(),
            "fallback"
        );
    }

    #[test]
    fn test_missing_var_names_field() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("ARTNODE_EXPAND_MISSING");
        }
        let err = expand_env("${ARTNODE_EXPAND_MISSING}", "media.signed_base").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("ARTNODE_EXPAND_MISSING"));
        assert!(msg.contains("media.signed_base"));
    }

    #[test]
    fn test_expand_opt_none_is_noop() {
        let mut value = None;
        expand_opt(&mut value, "content.schema_file").unwrap();
        assert!(value.is_none());
    }
}
