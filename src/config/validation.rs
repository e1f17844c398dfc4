//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Value ranges: thresholds are percentages, intervals are positive
//! - Host list integrity: unique, named, addressable
//! - The catalog address names a driver this build carries
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Pure function: RobotConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::RobotConfig;
use crate::store::{is_mongo_address, memory};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_config(config: &RobotConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("listener.bind_address", "not a socket address"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "not a socket address"));
    }
    if let Some(url) = &config.notify.webhook_url {
        if url::Url::parse(url).is_err() {
            errors.push(ValidationError::new("notify.webhook_url", "not a valid URL"));
        }
    }

    let address = &config.database.address;
    if !address.starts_with(memory::SCHEME) && !is_mongo_address(address) {
        errors.push(ValidationError::new(
            "database.address",
            "must start with memory://, mongodb:// or mongodb+srv://",
        ));
    }

    let health = &config.health;
    for (field, value) in [
        ("health.memory_max_percent", health.memory_max_percent),
        ("health.cpu_max_percent", health.cpu_max_percent),
        ("health.disk_max_percent", health.disk_max_percent),
    ] {
        if !(value > 0.0 && value <= 100.0) {
            errors.push(ValidationError::new(field, "must be in (0, 100]"));
        }
    }

    for (field, value) in [
        ("health.resource_interval_secs", health.resource_interval_secs),
        ("health.liveness_interval_secs", health.liveness_interval_secs),
        ("health.database_interval_secs", health.database_interval_secs),
        ("panics.flush_interval_secs", config.panics.flush_interval_secs),
        ("panics.retention_secs", config.panics.retention_secs),
        ("backup.incremental_interval_secs", config.backup.incremental_interval_secs),
        ("database.dial_timeout_secs", config.database.dial_timeout_secs),
        ("database.socket_timeout_secs", config.database.socket_timeout_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }

    if config.backup.full_backup_hour > 23 {
        errors.push(ValidationError::new("backup.full_backup_hour", "must be 0-23"));
    }
    if config.remote.connect_attempts == 0 {
        errors.push(ValidationError::new("remote.connect_attempts", "must be at least 1"));
    }
    if config.remote.session_attempts == 0 {
        errors.push(ValidationError::new("remote.session_attempts", "must be at least 1"));
    }

    let mut names = HashSet::new();
    for (i, host) in config.hosts.iter().enumerate() {
        if host.name.is_empty() {
            errors.push(ValidationError::new(format!("hosts[{}].name", i), "must not be empty"));
        } else if !names.insert(host.name.as_str()) {
            errors.push(ValidationError::new(
                format!("hosts[{}].name", i),
                format!("duplicate host {}", host.name),
            ));
        }
        if host.inner_ip.is_empty() {
            errors.push(ValidationError::new(format!("hosts[{}].inner_ip", i), "must not be empty"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
