//! MongoDB driver.
//!
//! Serves `mongodb://` and `mongodb+srv://` addresses. Every forked session
//! shares one [`Client`]; the client's own connection pool is sized to the
//! session pool.
//!
//! Documents cross the session boundary as JSON. Dates come back as RFC 3339
//! strings and object ids as hex strings, so catalog records deserialize the
//! same way they do from the in-process store.

use std::future::IntoFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::{self, doc, Bson, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, IndexModel};
use serde_json::{Map, Number, Value};
use tokio::time::timeout;
use tracing::{debug, info};

use super::session::{DocumentDriver, DocumentSession};
use super::types::{
    ConnectionError, DeleteScope, DialOptions, DriverError, FindQuery, Namespace, ReadPreference,
    UpsertOutcome,
};

pub const SCHEMES: [&str; 2] = ["mongodb://", "mongodb+srv://"];

/// True when `address` names a MongoDB deployment.
pub fn is_mongo_address(address: &str) -> bool {
    SCHEMES.iter().any(|scheme| address.starts_with(scheme))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MongoDriver;

impl MongoDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentDriver for MongoDriver {
    type Session = MongoSession;

    async fn dial(&self, options: &DialOptions) -> Result<MongoSession, ConnectionError> {
        let unreachable = |reason: String| ConnectionError::Unreachable {
            address: options.address.clone(),
            reason,
        };

        let uri = with_read_preference(&options.address, options.read_preference);
        let mut client_options = ClientOptions::parse(uri.as_str())
            .await
            .map_err(|e| unreachable(e.to_string()))?;
        client_options.app_name = Some("fleet-robot".to_string());
        client_options.connect_timeout = Some(options.dial_timeout);
        client_options.server_selection_timeout = Some(options.dial_timeout);
        client_options.max_pool_size = Some(u32::try_from(options.pool_size).unwrap_or(u32::MAX));
        let seeds: Vec<String> = client_options.hosts.iter().map(|h| h.to_string()).collect();

        let client = Client::with_options(client_options).map_err(|e| unreachable(e.to_string()))?;
        match timeout(
            options.dial_timeout,
            client.database("admin").run_command(doc! { "ping": 1 }).into_future(),
        )
        .await
        {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(unreachable(e.to_string())),
            Err(_) => {
                return Err(ConnectionError::Timeout {
                    address: options.address.clone(),
                    timeout: options.dial_timeout,
                })
            }
        }

        info!(seeds = ?seeds, "mongodb deployment reachable");
        Ok(MongoSession {
            client,
            shared: Arc::new(Settings {
                socket_timeout: options.socket_timeout,
                seeds,
            }),
            closed: AtomicBool::new(false),
        })
    }
}

#[derive(Debug)]
struct Settings {
    socket_timeout: Duration,
    seeds: Vec<String>,
}

/// A session over a shared MongoDB client.
#[derive(Debug)]
pub struct MongoSession {
    client: Client,
    shared: Arc<Settings>,
    closed: AtomicBool,
}

impl MongoSession {
    fn collection(&self, ns: &Namespace) -> Result<Collection<Document>, DriverError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(DriverError::Closed);
        }
        Ok(self
            .client
            .database(&ns.database)
            .collection::<Document>(&ns.collection))
    }

    /// Run one driver call under the socket timeout.
    async fn bounded<F, T>(&self, call: F) -> Result<T, DriverError>
    where
        F: IntoFuture<Output = mongodb::error::Result<T>>,
    {
        match timeout(self.shared.socket_timeout, call.into_future()).await {
            Ok(result) => result.map_err(|e| DriverError::Operation(e.to_string())),
            Err(_) => Err(DriverError::Operation(format!(
                "no reply within {:?}",
                self.shared.socket_timeout
            ))),
        }
    }
}

#[async_trait]
impl DocumentSession for MongoSession {
    fn fork(&self) -> Self {
        Self {
            client: self.client.clone(),
            shared: Arc::clone(&self.shared),
            closed: AtomicBool::new(false),
        }
    }

    // The client's pool checks connections out per operation and drops broken
    // ones itself, so a session holds no socket to reset.
    fn refresh(&self) {}

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    async fn live_servers(&self) -> Result<Vec<String>, DriverError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(DriverError::Closed);
        }
        let admin = self.client.database("admin");
        match self
            .bounded(admin.run_command(doc! { "replSetGetStatus": 1 }))
            .await
        {
            Ok(status) => Ok(healthy_members(&status)),
            Err(e) => {
                // Standalone servers have no replica set status.
                debug!(error = %e, "replica set status unavailable, pinging seeds");
                self.bounded(admin.run_command(doc! { "ping": 1 })).await?;
                Ok(self.shared.seeds.clone())
            }
        }
    }

    async fn find(&self, ns: &Namespace, query: &FindQuery) -> Result<Vec<Value>, DriverError> {
        let collection = self.collection(ns)?;
        let mut find = collection.find(to_document(&query.filter)?);
        if !query.sort.is_empty() {
            find = find.sort(sort_document(&query.sort));
        }
        if let Some(limit) = query.limit {
            find = find.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(projection) = &query.projection {
            find = find.projection(to_document(projection)?);
        }

        let mut cursor = self.bounded(find).await?;
        let mut out = Vec::new();
        while self.bounded(cursor.advance()).await? {
            let document = cursor
                .deserialize_current()
                .map_err(|e| DriverError::Operation(e.to_string()))?;
            out.push(document_to_json(document));
        }
        Ok(out)
    }

    async fn upsert(
        &self,
        ns: &Namespace,
        selector: Value,
        document: Value,
    ) -> Result<UpsertOutcome, DriverError> {
        let collection = self.collection(ns)?;
        let selector = to_document(&selector)?;
        let is_update = document
            .as_object()
            .is_some_and(|fields| fields.keys().any(|k| k.starts_with('$')));
        let document = to_document(&document)?;

        let result = if is_update {
            self.bounded(collection.update_one(selector, document).upsert(true))
                .await?
        } else {
            self.bounded(collection.replace_one(selector, document).upsert(true))
                .await?
        };
        Ok(UpsertOutcome {
            matched: result.matched_count,
            upserted: result.upserted_id.is_some(),
        })
    }

    async fn insert(&self, ns: &Namespace, documents: Vec<Value>) -> Result<(), DriverError> {
        let collection = self.collection(ns)?;
        if documents.is_empty() {
            return Ok(());
        }
        let documents = documents
            .iter()
            .map(to_document)
            .collect::<Result<Vec<_>, _>>()?;
        self.bounded(collection.insert_many(documents)).await?;
        Ok(())
    }

    async fn delete(
        &self,
        ns: &Namespace,
        filter: Value,
        scope: DeleteScope,
    ) -> Result<u64, DriverError> {
        let collection = self.collection(ns)?;
        let filter = to_document(&filter)?;
        let result = match scope {
            DeleteScope::One => self.bounded(collection.delete_one(filter)).await?,
            DeleteScope::Many => self.bounded(collection.delete_many(filter)).await?,
        };
        Ok(result.deleted_count)
    }

    async fn count(&self, ns: &Namespace, filter: &Value) -> Result<u64, DriverError> {
        let collection = self.collection(ns)?;
        self.bounded(collection.count_documents(to_document(filter)?))
            .await
    }

    async fn create_index(&self, ns: &Namespace, keys: &[String]) -> Result<(), DriverError> {
        let collection = self.collection(ns)?;
        let model = IndexModel::builder().keys(sort_document(keys)).build();
        self.bounded(collection.create_index(model)).await?;
        Ok(())
    }
}

/// Append the read preference unless the address already sets one.
fn with_read_preference(address: &str, preference: ReadPreference) -> String {
    if address.contains("readPreference=") {
        return address.to_string();
    }
    let mode = match preference {
        ReadPreference::Primary => "primary",
        ReadPreference::PrimaryPreferred => "primaryPreferred",
        ReadPreference::Secondary => "secondary",
        ReadPreference::SecondaryPreferred => "secondaryPreferred",
        ReadPreference::Nearest => "nearest",
    };
    if address.contains('?') {
        return format!("{}&readPreference={}", address, mode);
    }
    let hosts_start = SCHEMES
        .iter()
        .find_map(|scheme| address.strip_prefix(scheme).map(|_| scheme.len()))
        .unwrap_or(0);
    let slash = if address[hosts_start..].contains('/') { "" } else { "/" };
    format!("{}{}?readPreference={}", address, slash, mode)
}

/// `["a", "-b"]` → `{ a: 1, b: -1 }`.
fn sort_document(keys: &[String]) -> Document {
    let mut sort = Document::new();
    for key in keys {
        match key.strip_prefix('-') {
            Some(field) => sort.insert(field, -1),
            None => sort.insert(key.as_str(), 1),
        };
    }
    sort
}

fn to_document(value: &Value) -> Result<Document, DriverError> {
    match value {
        Value::Null => Ok(Document::new()),
        Value::Object(_) => {
            bson::to_document(value).map_err(|e| DriverError::InvalidQuery(e.to_string()))
        }
        other => Err(DriverError::InvalidQuery(format!(
            "expected a document, got {}",
            other
        ))),
    }
}

fn document_to_json(document: Document) -> Value {
    bson_to_json(Bson::Document(document))
}

fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::Document(document) => Value::Object(
            document
                .into_iter()
                .map(|(key, value)| (key, bson_to_json(value)))
                .collect::<Map<_, _>>(),
        ),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        Bson::String(s) => Value::String(s),
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(i) => Value::from(i),
        Bson::Int64(i) => Value::from(i),
        Bson::Double(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::ObjectId(id) => Value::String(id.to_hex()),
        Bson::DateTime(at) => at
            .try_to_rfc3339_string()
            .map_or(Value::Null, Value::String),
        other => other.into_relaxed_extjson(),
    }
}

/// Names of the members a replica set status reports healthy.
fn healthy_members(status: &Document) -> Vec<String> {
    let Ok(members) = status.get_array("members") else {
        return Vec::new();
    };
    members
        .iter()
        .filter_map(|member| {
            let member = member.as_document()?;
            let health = match member.get("health")? {
                Bson::Double(h) => *h,
                Bson::Int32(h) => f64::from(*h),
                Bson::Int64(h) => *h as f64,
                _ => return None,
            };
            if health < 1.0 {
                return None;
            }
            member.get_str("name").ok().map(str::to_string)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_read_preference_appended_to_address() {
        assert_eq!(
            with_read_preference("mongodb://db1:27017", ReadPreference::Secondary),
            "mongodb://db1:27017/?readPreference=secondary"
        );
        assert_eq!(
            with_read_preference("mongodb://db1,db2/Center", ReadPreference::Nearest),
            "mongodb://db1,db2/Center?readPreference=nearest"
        );
        assert_eq!(
            with_read_preference("mongodb://db1/?replicaSet=rs0", ReadPreference::PrimaryPreferred),
            "mongodb://db1/?replicaSet=rs0&readPreference=primaryPreferred"
        );
    }

    #[test]
    fn test_explicit_read_preference_wins() {
        let address = "mongodb://db1/?readPreference=primary";
        assert_eq!(with_read_preference(address, ReadPreference::Nearest), address);
    }

    #[test]
    fn test_sort_keys_with_direction() {
        let sort = sort_document(&["ServerID".to_string(), "-StartTime".to_string()]);
        assert_eq!(sort, doc! { "ServerID": 1, "StartTime": -1 });
    }

    #[test]
    fn test_null_filter_matches_everything() {
        assert_eq!(to_document(&Value::Null).unwrap(), Document::new());
        assert!(matches!(
            to_document(&json!([1, 2])),
            Err(DriverError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_catalog_record_converts_to_json() {
        let started = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let id = bson::oid::ObjectId::new();
        let record = doc! {
            "_id": id,
            "ServerID": "7",
            "ServerType": 1,
            "StartTime": bson::DateTime::from_millis(started.timestamp_millis()),
            "Tags": ["a", "b"],
        };

        let value = document_to_json(record);
        assert_eq!(value["_id"], json!(id.to_hex()));
        assert_eq!(value["ServerID"], json!("7"));
        assert_eq!(value["ServerType"], json!(1));
        assert_eq!(value["Tags"], json!(["a", "b"]));

        let start: chrono::DateTime<Utc> =
            serde_json::from_value(value["StartTime"].clone()).unwrap();
        assert_eq!(start, started);
    }

    #[test]
    fn test_only_healthy_members_listed() {
        let status = doc! {
            "set": "rs0",
            "members": [
                { "name": "10.0.0.1:27017", "health": 1.0, "stateStr": "PRIMARY" },
                { "name": "10.0.0.2:27017", "health": 0.0, "stateStr": "(not reachable/healthy)" },
                { "name": "10.0.0.3:27017", "health": 1, "stateStr": "SECONDARY" },
            ],
        };
        assert_eq!(
            healthy_members(&status),
            vec!["10.0.0.1:27017".to_string(), "10.0.0.3:27017".to_string()]
        );
        assert!(healthy_members(&doc! { "ok": 1 }).is_empty());
    }

    #[test]
    fn test_scheme_detection() {
        assert!(is_mongo_address("mongodb://db1:27017"));
        assert!(is_mongo_address("mongodb+srv://cluster.example.net"));
        assert!(!is_mongo_address("memory://catalog"));
    }
}
