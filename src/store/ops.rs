//! Pool helper operations.
//!
//! Every helper leases one session, performs one driver call and releases the
//! session on every exit path through the lease guard.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use super::pool::SessionPool;
use super::session::DocumentSession;
use super::types::{
    DeleteScope, FindQuery, Namespace, StoreError, StoreResult, UpsertOutcome,
};

fn key_filter(key: &str, value: impl Serialize) -> StoreResult<Value> {
    let value = serde_json::to_value(value).map_err(StoreError::Encode)?;
    let mut filter = Map::new();
    filter.insert(key.to_string(), value);
    Ok(Value::Object(filter))
}

fn decode<T: DeserializeOwned>(document: Value) -> StoreResult<T> {
    serde_json::from_value(document).map_err(StoreError::Decode)
}

fn encode_all<T: Serialize>(documents: &[T]) -> StoreResult<Vec<Value>> {
    documents
        .iter()
        .map(|d| serde_json::to_value(d).map_err(StoreError::Encode))
        .collect()
}

impl<S: DocumentSession> SessionPool<S> {
    /// First document whose `key` equals `value`.
    pub async fn find_one<T: DeserializeOwned>(
        &self,
        ns: &Namespace,
        key: &str,
        value: impl Serialize,
    ) -> StoreResult<Option<T>> {
        let query = FindQuery::filter(key_filter(key, value)?).limit(1);
        let lease = self.acquire()?;
        let documents = lease.find(ns, &query).await?;
        documents.into_iter().next().map(decode).transpose()
    }

    /// Every document matching `filter` (`Null` matches all).
    pub async fn find_all<T: DeserializeOwned>(
        &self,
        ns: &Namespace,
        filter: Value,
    ) -> StoreResult<Vec<T>> {
        self.find_query(ns, &FindQuery::filter(filter)).await
    }

    pub async fn find_query<T: DeserializeOwned>(
        &self,
        ns: &Namespace,
        query: &FindQuery,
    ) -> StoreResult<Vec<T>> {
        let lease = self.acquire()?;
        let documents = lease.find(ns, query).await?;
        documents.into_iter().map(decode).collect()
    }

    /// Number of documents whose `key` equals `value`.
    pub async fn exists(&self, ns: &Namespace, key: &str, value: impl Serialize) -> StoreResult<u64> {
        let filter = key_filter(key, value)?;
        let lease = self.acquire()?;
        Ok(lease.count(ns, &filter).await?)
    }

    /// Replace the document whose `key` equals `value`, inserting it if absent.
    pub async fn upsert<T: Serialize>(
        &self,
        ns: &Namespace,
        key: &str,
        value: impl Serialize,
        document: &T,
    ) -> StoreResult<UpsertOutcome> {
        let selector = key_filter(key, value)?;
        let document = serde_json::to_value(document).map_err(StoreError::Encode)?;
        let lease = self.acquire()?;
        Ok(lease.upsert(ns, selector, document).await?)
    }

    /// Set individual fields on the document whose `key` equals `value`.
    pub async fn update_fields(
        &self,
        ns: &Namespace,
        key: &str,
        value: impl Serialize,
        fields: Value,
    ) -> StoreResult<UpsertOutcome> {
        let selector = key_filter(key, value)?;
        let mut update = Map::new();
        update.insert("$set".to_string(), fields);
        let lease = self.acquire()?;
        Ok(lease.upsert(ns, selector, Value::Object(update)).await?)
    }

    pub async fn insert<T: Serialize>(&self, ns: &Namespace, documents: &[T]) -> StoreResult<()> {
        let documents = encode_all(documents)?;
        self.insert_documents(ns, documents).await
    }

    async fn insert_documents(&self, ns: &Namespace, documents: Vec<Value>) -> StoreResult<()> {
        let lease = self.acquire()?;
        Ok(lease.insert(ns, documents).await?)
    }

    pub async fn delete_one(&self, ns: &Namespace, key: &str, value: impl Serialize) -> StoreResult<u64> {
        let filter = key_filter(key, value)?;
        self.delete_matching(ns, filter, DeleteScope::One).await
    }

    pub async fn delete_many(&self, ns: &Namespace, key: &str, value: impl Serialize) -> StoreResult<u64> {
        let filter = key_filter(key, value)?;
        self.delete_matching(ns, filter, DeleteScope::Many).await
    }

    pub async fn delete_all(&self, ns: &Namespace) -> StoreResult<u64> {
        self.delete_matching(ns, Value::Null, DeleteScope::Many).await
    }

    async fn delete_matching(&self, ns: &Namespace, filter: Value, scope: DeleteScope) -> StoreResult<u64> {
        let lease = self.acquire()?;
        Ok(lease.delete(ns, filter, scope).await?)
    }

    pub async fn count(&self, ns: &Namespace) -> StoreResult<u64> {
        let lease = self.acquire()?;
        Ok(lease.count(ns, &Value::Null).await?)
    }

    pub async fn create_index(&self, ns: &Namespace, keys: &[&str]) -> StoreResult<()> {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        let lease = self.acquire()?;
        Ok(lease.create_index(ns, &keys).await?)
    }

    /// Replica set members visible to the pool.
    pub async fn live_members(&self) -> StoreResult<Vec<String>> {
        let lease = self.acquire()?;
        Ok(lease.live_servers().await?)
    }
}

impl<S: DocumentSession> SessionPool<S> {
    /// Insert in a background task, then call `on_done(param)`.
    ///
    /// Failures are logged; `on_done` runs whether or not the insert succeeded.
    pub fn insert_async<T, P, F>(self: &Arc<Self>, ns: Namespace, documents: &[T], on_done: Option<F>, param: P)
    where
        T: Serialize,
        P: Send + 'static,
        F: FnOnce(P) + Send + 'static,
    {
        let pool = Arc::clone(self);
        let encoded = encode_all(documents);
        tokio::spawn(async move {
            let outcome = match encoded {
                Ok(documents) => pool.insert_documents(&ns, documents).await,
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                warn!(namespace = %ns, error = %e, "background insert failed");
            }
            if let Some(done) = on_done {
                done(param);
            }
        });
    }

    /// Delete documents whose `key` equals `value` in a background task.
    pub fn delete_async<P, F>(
        self: &Arc<Self>,
        ns: Namespace,
        key: &str,
        value: impl Serialize,
        scope: DeleteScope,
        on_done: Option<F>,
        param: P,
    ) where
        P: Send + 'static,
        F: FnOnce(P) + Send + 'static,
    {
        let pool = Arc::clone(self);
        let filter = key_filter(key, value);
        tokio::spawn(async move {
            let outcome = match filter {
                Ok(filter) => pool.delete_matching(&ns, filter, scope).await,
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                warn!(namespace = %ns, error = %e, "background delete failed");
            }
            if let Some(done) = on_done {
                done(param);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryDriver, MemorySession};
    use crate::store::types::DialOptions;
    use serde::Deserialize;
    use serde_json::json;
    use tokio::sync::oneshot;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Server {
        #[serde(rename = "ServerID")]
        id: String,
        #[serde(rename = "DBName")]
        db_name: String,
    }

    fn ns() -> Namespace {
        Namespace::new("Center", "ServerConfig")
    }

    async fn open() -> Arc<SessionPool<MemorySession>> {
        let driver = MemoryDriver::new();
        Arc::new(
            SessionPool::open(&driver, &DialOptions::new("memory://ops").pool_size(2))
                .await
                .unwrap(),
        )
    }

    fn server(id: &str, db: &str) -> Server {
        Server { id: id.to_string(), db_name: db.to_string() }
    }

    #[tokio::test]
    async fn test_insert_find_and_delete() {
        let pool = open().await;
        pool.insert(&ns(), &[server("1", "game_1"), server("2", "game_2")]).await.unwrap();

        let found: Option<Server> = pool.find_one(&ns(), "ServerID", "2").await.unwrap();
        assert_eq!(found, Some(server("2", "game_2")));
        assert_eq!(pool.exists(&ns(), "ServerID", "1").await.unwrap(), 1);
        assert_eq!(pool.count(&ns()).await.unwrap(), 2);

        assert_eq!(pool.delete_one(&ns(), "ServerID", "1").await.unwrap(), 1);
        let rest: Vec<Server> = pool.find_all(&ns(), Value::Null).await.unwrap();
        assert_eq!(rest, vec![server("2", "game_2")]);

        assert_eq!(pool.delete_all(&ns()).await.unwrap(), 1);
        assert!(pool.stats().iter().all(|&c| c == 0));
    }

    #[tokio::test]
    async fn test_upsert_and_update_fields() {
        let pool = open().await;
        let first = pool.upsert(&ns(), "ServerID", "7", &server("7", "a")).await.unwrap();
        assert!(first.upserted);

        let second = pool.update_fields(&ns(), "ServerID", "7", json!({"DBName": "b"})).await.unwrap();
        assert_eq!(second.matched, 1);

        let found: Option<Server> = pool.find_one(&ns(), "ServerID", "7").await.unwrap();
        assert_eq!(found.unwrap().db_name, "b");
    }

    #[tokio::test]
    async fn test_decode_failure_releases_lease() {
        let pool = open().await;
        pool.insert(&ns(), &[json!({"ServerID": 5})]).await.unwrap();
        let result: StoreResult<Vec<Server>> = pool.find_all(&ns(), Value::Null).await;
        assert!(matches!(result, Err(StoreError::Decode(_))));
        assert!(pool.stats().iter().all(|&c| c == 0));
    }

    #[tokio::test]
    async fn test_closed_pool_surfaces_pool_error() {
        let pool = open().await;
        pool.close();
        let result = pool.count(&ns()).await;
        assert!(matches!(result, Err(StoreError::Pool(_))));
    }

    #[tokio::test]
    async fn test_live_members_reports_driver_members() {
        let driver = MemoryDriver::new().with_members(["10.0.0.1:27017", "10.0.0.2:27017"]);
        let pool = SessionPool::open(&driver, &DialOptions::new("memory://ops"))
            .await
            .unwrap();
        assert_eq!(
            pool.live_members().await.unwrap(),
            vec!["10.0.0.1:27017".to_string(), "10.0.0.2:27017".to_string()]
        );
        assert!(pool.stats().iter().all(|&c| c == 0));
    }

    #[tokio::test]
    async fn test_insert_async_runs_callback() {
        let pool = open().await;
        let (tx, rx) = oneshot::channel();
        pool.insert_async(
            ns(),
            &[server("9", "game_9")],
            Some(move |tag: &'static str| {
                let _ = tx.send(tag);
            }),
            "inserted",
        );
        assert_eq!(rx.await.unwrap(), "inserted");
        assert_eq!(pool.exists(&ns(), "ServerID", "9").await.unwrap(), 1);

        let (tx, rx) = oneshot::channel();
        pool.delete_async(
            ns(),
            "ServerID",
            "9",
            DeleteScope::Many,
            Some(move |n: u32| {
                let _ = tx.send(n);
            }),
            3,
        );
        assert_eq!(rx.await.unwrap(), 3);
        assert_eq!(pool.count(&ns()).await.unwrap(), 0);
    }
}
