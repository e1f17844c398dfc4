//! Fleet operations robot library.
//!
//! Periodic health checks with auto-remediation, crash report aggregation and
//! database backups for a fleet of game hosts, all driven by self-rescheduling
//! timers and a few HTTP triggers.

// Storage
pub mod store;

// Fleet operations
pub mod fleet;
pub mod panics;
pub mod remote;

// Cross-cutting concerns
pub mod clock;
pub mod config;
pub mod lifecycle;
pub mod notify;
pub mod observability;
pub mod resilience;

// Trigger surface
pub mod http;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use config::schema::RobotConfig;
pub use lifecycle::{Robot, Shutdown};
