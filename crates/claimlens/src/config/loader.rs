use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let compiled =
        jsonschema::JSONSchema::compile(&schema).map_err(|e| ConfigError::Validation {
            message: format!("Failed to compile JSON schema: {}", e),
        })?;

    let result = compiled.validate(json_value);
    if let Err(errors) = result {
        let error_messages: Vec<String> = errors
            .map(|e| format!("{} at {}", e, e.instance_path))
            .collect();
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    // Collaborator commands are optional (the watcher process never calls
    // them), but a present command must not be a bare empty vector slot.
    for (name, command) in [
        ("search_command", &config.collaborators.search_command),
        ("inference_command", &config.collaborators.inference_command),
        ("report_command", &config.collaborators.report_command),
    ] {
        if command.iter().any(|arg| arg.trim().is_empty()) {
            return Err(ConfigError::Validation {
                message: format!("{} contains an empty argument", name),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> &'static str {
        r#"{
            "version": "1.0",
            "workspace_root": "/var/lib/claimlens"
        }"#
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = load_config_from_str(minimal_config()).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.worker.sleep_interval_secs, 5);
        assert_eq!(config.search.timeout_secs, 60);
        assert_eq!(config.search.max_attempts, 2);
        assert_eq!(config.search.retry_delay_secs, 5);
        assert!(config.collaborators.search_command.is_empty());
    }

    #[test]
    fn test_full_config() {
        let config = load_config_from_str(
            r#"{
                "version": "1.0",
                "workspace_root": "/data/ws",
                "worker": { "sleep_interval_secs": 2 },
                "search": { "timeout_secs": 30, "max_attempts": 3, "retry_delay_secs": 1 },
                "collaborators": {
                    "search_command": ["/usr/bin/evidence-search", "--index", "/data/index"],
                    "inference_command": ["/usr/bin/claim-infer"],
                    "report_command": ["/usr/bin/report-render"]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.worker.sleep_interval_secs, 2);
        assert_eq!(config.search.max_attempts, 3);
        assert_eq!(config.collaborators.search_command.len(), 3);
    }

    #[test]
    fn test_missing_workspace_root_rejected() {
        let result = load_config_from_str(r#"{ "version": "1.0" }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "workspace_root": "/ws", "dashboard": true }"#,
        );
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let result = load_config_from_str(r#"{ "version": "2.0", "workspace_root": "/ws" }"#);
        // The schema enum catches this before semantic validation.
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_sleep_interval_rejected() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "workspace_root": "/ws", "worker": { "sleep_interval_secs": 0 } }"#,
        );
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_invalid_json_rejected() {
        let result = load_config_from_str("not json");
        assert!(matches!(result, Err(ConfigError::ParseJson(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("claimlens.json");
        std::fs::write(&path, minimal_config()).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.workspace_root, Path::new("/var/lib/claimlens"));
    }

    #[test]
    fn test_load_missing_file_errors() {
        let result = load_config("/nonexistent/claimlens.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }
}
