//! Document store access.
//!
//! # Data Flow
//! ```text
//! caller (catalog refresh, backup, http)
//!     → SessionPool helper (ops.rs)
//!     → acquire(): heap root = least-referenced session (pool.rs, heap.rs)
//!     → one driver call (session.rs trait; mongo.rs or memory.rs)
//!     → SessionLease dropped → release(): decrement + re-sort that session
//! ```
//!
//! # Design Decisions
//! - The driver is a trait so the pool never depends on a concrete client
//! - Documents cross the trait as `serde_json::Value`; helpers (de)serialize
//!   typed records at the edge
//! - Leases are RAII guards, so early returns and cancelled futures still
//!   release their session

pub mod heap;
pub mod memory;
pub mod mongo;
pub mod ops;
pub mod pool;
pub mod session;
pub mod types;

pub use memory::{MemoryDriver, MemorySession};
pub use mongo::{is_mongo_address, MongoDriver, MongoSession};
pub use pool::{SessionLease, SessionPool};
pub use session::{DocumentDriver, DocumentSession};
pub use types::{
    ConnectionError, DeleteScope, DialOptions, DriverError, FindQuery, Namespace, PoolError,
    ReadPreference, StoreError, StoreResult, UpsertOutcome,
};
