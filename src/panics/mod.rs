//! Crash/error report aggregation.
//!
//! # Data Flow
//! ```text
//! POST /panic → PanicAggregator::record (per-host bucket, dedup by log key)
//! flush timer → build_digest(auto) → Notifier (one message per log key)
//! sweep timer → drop records idle past retention, then empty buckets
//! GET /panic  → build_digest(manual), lifetime counts, read-only
//! ```
//!
//! # Design Decisions
//! - Host buckets live in a sharded map; each bucket has its own lock, so
//!   reports from different hosts never contend on one mutex
//! - Auto digests reset the since-last-flush counts; manual digests never
//!   mutate anything

pub mod aggregator;
pub mod record;

pub use aggregator::{PanicAggregator, SweepStats};
pub use record::{PanicDigest, PanicRecord, PanicReport};
