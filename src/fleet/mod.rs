//! Fleet monitoring, remediation and backups.
//!
//! # Data Flow
//! ```text
//! timer / http trigger
//!     → catalog.rs (immutable snapshot: hosts + processes per host)
//!     → health.rs / backup.rs (fan out one task per target)
//!         → probe.rs (remote command, parse output)
//!         → classify → remediate (restart in a fresh session)
//!     → notifier (operators)
//! ```
//!
//! # Design Decisions
//! - Checks read one snapshot per cycle; host updates publish a new one
//! - Probes never hold a lock across remote I/O
//! - Remediation failures are reported once per cycle, not retried

pub mod backup;
pub mod catalog;
pub mod health;
pub mod model;
pub mod probe;

pub use backup::{BackupScheduler, FullBackupOutcome, IncrementalOutcome};
pub use catalog::{FleetCatalog, FleetSnapshot, HostUpdate};
pub use health::{
    FleetHealth, HostSummary, Liveness, ProbeReport, Remediation, RestartError, SummaryError,
};
pub use model::{DatabaseEndpoint, HostDescriptor, ProcessDescriptor, ProcessKind, SshCredentials};
pub use probe::{DiskUsage, MemoryUsage, ProbeContext};
