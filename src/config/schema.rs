//! Configuration schema definitions.
//!
//! Every section has defaults, so a minimal file (or none at all) yields a
//! runnable robot with an empty fleet.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fleet::model::{HostDescriptor, ProcessDescriptor};
use crate::remote::CommandConfig;
use crate::resilience::RetryPolicy;
use crate::store::{DialOptions, Namespace, ReadPreference};

/// Root configuration for the operations robot.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RobotConfig {
    /// HTTP trigger listener.
    pub listener: ListenerConfig,

    pub observability: ObservabilityConfig,

    /// Operator notification channel.
    pub notify: NotifyConfig,

    /// Catalog database.
    pub database: DatabaseConfig,

    /// SSH settings shared by every host.
    pub remote: RemoteConfig,

    pub health: HealthConfig,

    pub panics: PanicConfig,

    pub backup: BackupConfig,

    /// Shell command templates.
    pub commands: CommandConfig,

    /// Fleet hosts.
    pub hosts: Vec<HostDescriptor>,

    /// Seed documents for an in-process catalog database.
    pub processes: Vec<ProcessDescriptor>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Chat robot webhook; notifications go to the log when unset.
    pub webhook_url: Option<String>,

    /// Operator handles mentioned in every notification.
    pub operators: Vec<String>,

    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            operators: Vec::new(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub address: String,
    pub pool_size: usize,
    pub dial_timeout_secs: u64,
    pub socket_timeout_secs: u64,
    pub read_preference: ReadPreference,
    pub catalog_database: String,
    pub catalog_collection: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            address: "memory://catalog".to_string(),
            pool_size: 10,
            dial_timeout_secs: 10,
            socket_timeout_secs: 300,
            read_preference: ReadPreference::PrimaryPreferred,
            catalog_database: "Center".to_string(),
            catalog_collection: "ServerConfig".to_string(),
        }
    }
}

impl DatabaseConfig {
    pub fn dial_options(&self) -> DialOptions {
        DialOptions {
            address: self.address.clone(),
            pool_size: self.pool_size,
            dial_timeout: Duration::from_secs(self.dial_timeout_secs),
            socket_timeout: Duration::from_secs(self.socket_timeout_secs),
            read_preference: self.read_preference,
        }
    }

    pub fn catalog_namespace(&self) -> Namespace {
        Namespace::new(&self.catalog_database, &self.catalog_collection)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub ssh_port: u16,
    pub ssh_binary: String,
    pub connect_timeout_secs: u64,
    pub connect_attempts: u32,
    pub session_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            ssh_port: 22,
            ssh_binary: "ssh".to_string(),
            connect_timeout_secs: 10,
            connect_attempts: 3,
            session_attempts: 3,
            retry_base_delay_ms: 200,
            retry_max_delay_ms: 2000,
        }
    }
}

impl RemoteConfig {
    pub fn connect_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.connect_attempts, self.retry_base_delay_ms, self.retry_max_delay_ms)
    }

    pub fn session_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.session_attempts, self.retry_base_delay_ms, self.retry_max_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    pub resource_interval_secs: u64,
    pub liveness_interval_secs: u64,
    pub database_interval_secs: u64,

    /// Percent thresholds; reached or exceeded means a finding.
    pub memory_max_percent: f64,
    pub cpu_max_percent: f64,
    pub disk_max_percent: f64,

    /// Seconds after `StartTime` before a process is checked.
    pub start_grace_secs: u64,

    /// Host whose service is checked before everything else.
    pub hub_host: String,

    /// Host running the web/payment service; its processes are not checked.
    pub web_host: String,

    /// Initial state of the maintenance toggle (true = checks on).
    pub liveness_checks: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            resource_interval_secs: 300,
            liveness_interval_secs: 60,
            database_interval_secs: 60,
            memory_max_percent: 70.0,
            cpu_max_percent: 70.0,
            disk_max_percent: 80.0,
            start_grace_secs: 60,
            hub_host: "HubServer".to_string(),
            web_host: "PaymentWeb".to_string(),
            liveness_checks: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PanicConfig {
    pub flush_interval_secs: u64,

    /// Records idle this long are swept; also the sweep interval.
    pub retention_secs: u64,
}

impl Default for PanicConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: 300,
            retention_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackupConfig {
    pub enabled: bool,

    /// Local hour of the daily full backup.
    pub full_backup_hour: u32,

    /// Prefix of the dated full backup directory on the source host.
    pub full_backup_dir: String,

    pub script_dir: String,
    pub full_script: String,
    pub incremental_script: String,
    pub replica_role_script: String,

    /// Databases backed up in addition to the catalog's `DBName`s.
    pub extra_databases: Vec<String>,

    /// Pause between two databases of a full backup.
    pub database_gap_secs: u64,

    /// Databases per progress notification.
    pub report_batch: usize,

    pub incremental_interval_secs: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            full_backup_hour: 2,
            full_backup_dir: String::new(),
            script_dir: String::new(),
            full_script: String::new(),
            incremental_script: String::new(),
            replica_role_script: String::new(),
            extra_databases: Vec::new(),
            database_gap_secs: 10,
            report_batch: 10,
            incremental_interval_secs: 3600,
        }
    }
}
