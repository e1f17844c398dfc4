//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RobotConfig (validated, immutable)
//!     → sections handed to each subsystem at startup
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads + validates
//!     → new host list published to the fleet catalog
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Only the host list is hot-reloaded; everything else needs a restart
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BackupConfig, DatabaseConfig, HealthConfig, ListenerConfig, LogFormat, NotifyConfig,
    ObservabilityConfig, PanicConfig, RemoteConfig, RobotConfig,
};
pub use watcher::ConfigWatcher;
