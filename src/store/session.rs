//! Document-store driver interface.

use async_trait::async_trait;
use serde_json::Value;

use super::types::{
    ConnectionError, DeleteScope, DialOptions, DriverError, FindQuery, Namespace, UpsertOutcome,
};

/// Dials a cluster and hands back the first session.
#[async_trait]
pub trait DocumentDriver: Send + Sync {
    type Session: DocumentSession;

    async fn dial(&self, options: &DialOptions) -> Result<Self::Session, ConnectionError>;
}

/// One long-lived driver session.
///
/// `refresh` and `close` are synchronous socket resets and never block on the
/// network, so the pool may call them while holding its lock. Everything else
/// may wait on the network and is bounded by the socket timeout.
#[async_trait]
pub trait DocumentSession: Send + Sync + 'static {
    /// A new session sharing this one's cluster topology.
    fn fork(&self) -> Self
    where
        Self: Sized;

    /// Drop cached sockets so the next operation picks a fresh one.
    fn refresh(&self);

    fn close(&self);

    /// Addresses of the replica set members currently reachable.
    async fn live_servers(&self) -> Result<Vec<String>, DriverError>;

    async fn find(&self, ns: &Namespace, query: &FindQuery) -> Result<Vec<Value>, DriverError>;

    async fn upsert(
        &self,
        ns: &Namespace,
        selector: Value,
        document: Value,
    ) -> Result<UpsertOutcome, DriverError>;

    async fn insert(&self, ns: &Namespace, documents: Vec<Value>) -> Result<(), DriverError>;

    async fn delete(
        &self,
        ns: &Namespace,
        filter: Value,
        scope: DeleteScope,
    ) -> Result<u64, DriverError>;

    async fn count(&self, ns: &Namespace, filter: &Value) -> Result<u64, DriverError>;

    async fn create_index(&self, ns: &Namespace, keys: &[String]) -> Result<(), DriverError>;
}
