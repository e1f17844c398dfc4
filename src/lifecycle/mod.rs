//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Open session pool → Seed catalog → Build schedulers
//!            → spawn_timers (timer.rs) → HTTP listener
//!
//! Timers (timer.rs):
//!     sleep(delay) → spawn(run) → await → delay = run's answer → repeat
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger → timers exit → HTTP drains → pool closed
//! ```
//!
//! # Design Decisions
//! - Fail fast only on the session pool; an unreadable catalog is reported
//!   and the robot runs with hosts from config
//! - A timer re-arms after its run completes, never on a fixed tick
//! - A panicking run is contained in its own task

pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod timer;

pub use shutdown::Shutdown;
pub use signals::wait_for_shutdown;
pub use startup::{Robot, StartupError};
pub use timer::{run_self_rescheduling, Schedule};
