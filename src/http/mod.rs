//! HTTP trigger surface.
//!
//! # Data Flow
//! ```text
//! POST /panic            → PanicAggregator::record
//! GET  /panic            → PanicAggregator::build_digest(false)
//! GET|PUT /maintenance   → FleetHealth liveness toggle
//! POST /catalog/refresh  → FleetHealth::refresh_catalog
//! PUT  /hosts            → FleetCatalog::apply_host_update
//! GET  /hosts/summary    → FleetHealth::host_summary
//! POST /restart          → FleetHealth::restart_process
//! ```
//!
//! # Design Decisions
//! - Input is validated before any side effect; rejects are 400 with a
//!   plain-text reason and are not logged as errors
//! - Handlers hold `Arc`s only; no request waits on a lock across I/O

pub mod handlers;
pub mod server;

pub use server::{router, serve, AppState};
