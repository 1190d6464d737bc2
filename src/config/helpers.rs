use std::str::FromStr;

use crate::error::ConfigError;

/// Source of environment values; `process_env` in production, maps in tests.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Result<Option<String>, ConfigError>;

/// Read a variable from the process environment.
pub fn process_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(val) => Ok(Some(val)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::EnvRead {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Read an optional variable, treating an empty value as unset.
pub fn optional_env(lookup: EnvLookup<'_>, key: &str) -> Result<Option<String>, ConfigError> {
    Ok(lookup(key)?.filter(|v| !v.trim().is_empty()))
}

/// Parse an optional variable, falling back to `default` when unset.
pub fn parse_optional_env<T>(
    lookup: EnvLookup<'_>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional_env(lookup, key)?
        .map(|s| {
            s.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{s}': {e}"),
            })
        })
        .transpose()
        .map(|v| v.unwrap_or(default))
}

/// Parse a boolean flag. Accepts `true/false`, `1/0`, `yes/no`.
pub fn parse_bool_env(
    lookup: EnvLookup<'_>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(raw) = optional_env(lookup, key)? else {
        return Ok(default);
    };
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be 'true' or 'false', got '{raw}'"),
        }),
    }
}

#[cfg(test)]
pub(crate) fn map_lookup(
    vars: &[(&str, &str)],
) -> impl Fn(&str) -> Result<Option<String>, ConfigError> {
    let vars: std::collections::HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| Ok(vars.get(key).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_value_is_unset() {
        let lookup = map_lookup(&[("ITDB_IMAGE", "  ")]);
        assert_eq!(optional_env(&lookup, "ITDB_IMAGE").unwrap(), None);
    }

    #[test]
    fn test_parse_optional_env_default_and_value() {
        let lookup = map_lookup(&[("ITDB_PORT", "4406")]);
        assert_eq!(parse_optional_env(&lookup, "ITDB_PORT", 3806u16).unwrap(), 4406);
        assert_eq!(parse_optional_env(&lookup, "MISSING", 3806u16).unwrap(), 3806);
    }

    #[test]
    fn test_parse_optional_env_rejects_garbage() {
        let lookup = map_lookup(&[("ITDB_PORT", "not-a-port")]);
        let err = parse_optional_env(&lookup, "ITDB_PORT", 3806u16).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "ITDB_PORT"));
    }

    #[test]
    fn test_parse_bool_env() {
        let lookup = map_lookup(&[("A", "yes"), ("B", "0"), ("C", "maybe")]);
        assert!(parse_bool_env(&lookup, "A", false).unwrap());
        assert!(!parse_bool_env(&lookup, "B", true).unwrap());
        assert!(parse_bool_env(&lookup, "C", true).is_err());
        assert!(parse_bool_env(&lookup, "D", true).unwrap());
    }
}
