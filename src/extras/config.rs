use crate::api::{RegistrationError, Settings};
use serde_yaml::Value;
use std::fs;
use std::path::Path;

/// The function merges two values, either as a mapping or a sequence, into a single value.
///
/// Arguments:
///
/// * `destination`: The value being updated, usually the defaults document.
/// * `source`: The value whose entries take precedence.
///
/// Returns:
///
/// Mappings are merged key by key, sequences are concatenated and any other combination
/// yields `source`.
fn merge_values(destination: Value, source: Value) -> Value {
    match (destination, source) {
        (Value::Mapping(mut map1), Value::Mapping(map2)) => {
            for (key, value) in map2 {
                if let Some(existing_value) = map1.remove(&key) {
                    let merged_value = merge_values(existing_value, value);
                    map1.insert(key, merged_value);
                } else {
                    map1.insert(key, value);
                }
            }
            Value::Mapping(map1)
        }
        (Value::Sequence(mut seq1), Value::Sequence(seq2)) => {
            seq1.extend(seq2);
            Value::Sequence(seq1)
        }
        (Value::Null, value) => value,
        (destination, Value::Null) => destination,
        (_, value) => value,
    }
}

fn parse(contents: &str, origin: &str) -> Result<Value, RegistrationError> {
    serde_yaml::from_str::<Value>(contents)
        .map_err(|e| RegistrationError::Config(format!("{}: {}", origin, e)))
}

/// Layers `overrides` on top of `defaults` and deserializes the result into [`Settings`].
/// Keys missing from both fall back to [`Settings::default`].
pub fn from_yaml_strs(defaults: &str, overrides: &str) -> Result<Settings, RegistrationError> {
    let merged = merge_values(parse(defaults, "defaults")?, parse(overrides, "overrides")?);
    if merged.is_null() {
        return Ok(Settings::default());
    }
    serde_yaml::from_value(merged).map_err(|e| RegistrationError::Config(e.to_string()))
}

/// Loads settings from a defaults file and an override file.
///
/// A missing defaults file counts as empty, a missing override file is an error.
/// The process environment is applied last.
pub fn load(defaults_path: &Path, overrides_path: &Path) -> Result<Settings, RegistrationError> {
    let defaults = match fs::read_to_string(defaults_path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => {
            return Err(RegistrationError::Config(format!(
                "{}: {}",
                defaults_path.display(),
                err
            )))
        }
    };
    let overrides = fs::read_to_string(overrides_path).map_err(|e| {
        RegistrationError::Config(format!("{}: {}", overrides_path.display(), e))
    })?;

    let mut settings = from_yaml_strs(&defaults, &overrides)?;
    settings.apply_env()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULTS: &str = r#"
hostname: o-du-default
ssh_connections: 1
tls_connections: 0
host_ssh_base_port: 50000
retry_interval_ms: 5000
"#;

    #[test]
    fn overrides_take_precedence() {
        let settings = from_yaml_strs(
            DEFAULTS,
            "tls_connections: 2\nip_v4: 172.17.0.9\nretry_interval_ms: 250\n",
        )
        .unwrap();

        assert_eq!(settings.hostname, "o-du-default");
        assert_eq!(settings.ssh_connections, 1);
        assert_eq!(settings.tls_connections, 2);
        assert_eq!(settings.host_ssh_base_port, 50000);
        assert_eq!(settings.ip_v4.as_deref(), Some("172.17.0.9"));
        assert_eq!(settings.retry_interval_ms, 250);
        // untouched keys keep the built in default
        assert_eq!(settings.http_timeout_ms, 10000);
    }

    #[test]
    fn empty_documents_give_defaults() {
        let settings = from_yaml_strs("", "").unwrap();
        assert_eq!(settings.ssh_connections, 1);
        assert_eq!(settings.retry_interval_ms, 5000);
    }

    #[test]
    fn invalid_yaml_is_a_config_error() {
        let err = from_yaml_strs(DEFAULTS, "ssh_connections: [1, 2").unwrap_err();
        assert!(matches!(err, RegistrationError::Config(_)));
    }

    #[test]
    fn sequences_are_concatenated() {
        let merged = merge_values(
            parse("[a, b]", "defaults").unwrap(),
            parse("[c]", "overrides").unwrap(),
        );
        assert_eq!(merged, parse("[a, b, c]", "expected").unwrap());
    }

    #[test]
    fn missing_override_file_fails() {
        let dir = std::env::temp_dir();
        let err = load(
            &dir.join("ves-pnf-registration-no-defaults.yaml"),
            &dir.join("ves-pnf-registration-no-overrides.yaml"),
        )
        .unwrap_err();
        assert!(matches!(err, RegistrationError::Config(_)));
    }
}
