//! Store types and errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Which replica set members reads may be served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadPreference {
    Primary,
    #[default]
    PrimaryPreferred,
    Secondary,
    SecondaryPreferred,
    Nearest,
}

/// Parameters for dialing a document-store cluster.
#[derive(Debug, Clone)]
pub struct DialOptions {
    pub address: String,
    pub pool_size: usize,
    pub dial_timeout: Duration,
    pub socket_timeout: Duration,
    pub read_preference: ReadPreference,
}

impl DialOptions {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            pool_size: 10,
            dial_timeout: Duration::from_secs(10),
            socket_timeout: Duration::from_secs(300),
            read_preference: ReadPreference::default(),
        }
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }
}

/// Database plus collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// A filtered, projected, sorted and limited read.
///
/// A `Null` filter matches every document. Sort keys prefixed with `-` sort
/// descending.
#[derive(Debug, Clone, Default)]
pub struct FindQuery {
    pub filter: Value,
    pub projection: Option<Value>,
    pub sort: Vec<String>,
    pub limit: Option<usize>,
}

impl FindQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(filter: Value) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn project(mut self, projection: Value) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn sort_by<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.sort = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Result of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpsertOutcome {
    pub matched: u64,
    pub upserted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteScope {
    One,
    Many,
}

/// Failure to reach the cluster at dial time.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("cluster at {address} is unreachable: {reason}")]
    Unreachable { address: String, reason: String },

    #[error("dialing {address} timed out after {timeout:?}")]
    Timeout { address: String, timeout: Duration },
}

/// Failure reported by a driver session.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("document store operation failed: {0}")]
    Operation(String),

    #[error("session is closed")]
    Closed,

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// Failure to lease a session.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("session pool is closed")]
    Closed,

    #[error("session pool has no sessions")]
    Empty,
}

/// Error returned by the pool helper operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("failed to decode document: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to encode document: {0}")]
    Encode(#[source] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
