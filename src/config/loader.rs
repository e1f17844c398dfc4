//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::RobotConfig;
use crate::config::validation::{validate_config, ValidationError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<RobotConfig, ConfigError> {
    let config: RobotConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<RobotConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.health.memory_max_percent, 70.0);
        assert_eq!(config.health.disk_max_percent, 80.0);
        assert_eq!(config.panics.retention_secs, 86_400);
        assert_eq!(config.backup.full_backup_hour, 2);
        assert_eq!(config.database.catalog_namespace().to_string(), "Center.ServerConfig");
    }

    #[test]
    fn test_load_hosts_and_processes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[health]
hub_host = "hub"
cpu_max_percent = 90

[[hosts]]
name = "hub"
inner_ip = "10.0.0.1"
ssh = {{ user = "ops", password = "pw" }}

[[hosts]]
name = "db-1"
inner_ip = "10.0.0.2"
ssh = {{ user = "ops" }}
database = {{ path = "/data/mongo", address = "10.0.0.2:27017" }}

[[processes]]
ServerID = "1001"
ServerName = "S1"
InnerIP = "10.0.0.1"
DBName = "game_1001"
StartTime = "2024-01-01T00:00:00Z"
ServerType = 5
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.health.cpu_max_percent, 90.0);
        assert_eq!(config.hosts.len(), 2);
        assert!(config.hosts[1].database.is_some());
        assert_eq!(
            config.processes[0].kind,
            crate::fleet::model::ProcessKind::FreshlyProvisioned
        );
    }

    #[test]
    fn test_validation_errors_are_collected() {
        let err = parse_config(
            r#"
[health]
memory_max_percent = 0
liveness_interval_secs = 0
"#,
        )
        .unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/robot.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
