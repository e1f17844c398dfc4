//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`clock`]: `ManualClock`, a settable [`Clock`](crate::clock::Clock).
//! - [`notify`]: `RecordingNotifier`, which keeps every message it is sent.
//! - [`remote`]: `ScriptedRemote`, a [`RemoteExec`](crate::remote::RemoteExec)
//!   answering commands from substring rules.
//! - [`fleet`]: Builders for hosts and process descriptors.

pub mod clock;
pub mod fleet;
pub mod notify;
pub mod remote;

pub use clock::ManualClock;
pub use notify::{Notification, RecordingNotifier};
pub use remote::{ExecutedCommand, ScriptedRemote};
