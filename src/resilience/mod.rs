//! Resilience helpers for remote calls.
//!
//! # Data Flow
//! ```text
//! Remote connect / session open:
//!     → retries.rs (bounded attempts per operation)
//!     → backoff.rs (jittered exponential delay between attempts)
//! ```
//!
//! # Design Decisions
//! - Attempts are bounded per call; a cycle never retries forever
//! - Jitter keeps concurrent probes from hammering one host in lockstep

pub mod backoff;
pub mod retries;

pub use retries::{retry_with_backoff, RetryPolicy};
