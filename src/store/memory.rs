//! In-process document store.
//!
//! Serves `memory://` addresses. Used for static catalogs seeded from the
//! configuration file, and by the tests.
//!
//! Supported query surface: equality filters (dotted paths allowed), inclusion
//! projections, multi-key sort with `-field` for descending, limit, and `$set`
//! upserts. Anything else is rejected as an invalid query.

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::debug;

use super::session::{DocumentDriver, DocumentSession};
use super::types::{
    ConnectionError, DeleteScope, DialOptions, DriverError, FindQuery, Namespace, UpsertOutcome,
};

pub const SCHEME: &str = "memory://";

#[derive(Debug, Default)]
struct Shared {
    collections: RwLock<HashMap<Namespace, Vec<Value>>>,
    indexes: RwLock<HashMap<Namespace, Vec<Vec<String>>>>,
    members: RwLock<Vec<String>>,
    refreshes: AtomicUsize,
}

/// Driver whose sessions all share one in-process data set.
#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    shared: Arc<Shared>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-load `documents` into `ns`.
    pub fn with_documents(self, ns: Namespace, documents: Vec<Value>) -> Self {
        self.shared
            .collections
            .write()
            .entry(ns)
            .or_default()
            .extend(documents);
        self
    }

    /// Replica set members reported by `live_servers`.
    pub fn with_members<I, M>(self, members: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        *self.shared.members.write() = members.into_iter().map(Into::into).collect();
        self
    }

    /// Snapshot of a collection.
    pub fn documents(&self, ns: &Namespace) -> Vec<Value> {
        self.shared
            .collections
            .read()
            .get(ns)
            .cloned()
            .unwrap_or_default()
    }

    /// Total `refresh` calls across every session dialed from this driver.
    pub fn refresh_count(&self) -> usize {
        self.shared.refreshes.load(Ordering::Relaxed)
    }

    pub fn indexes(&self, ns: &Namespace) -> Vec<Vec<String>> {
        self.shared.indexes.read().get(ns).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl DocumentDriver for MemoryDriver {
    type Session = MemorySession;

    async fn dial(&self, options: &DialOptions) -> Result<MemorySession, ConnectionError> {
        if !options.address.starts_with(SCHEME) {
            return Err(ConnectionError::Unreachable {
                address: options.address.clone(),
                reason: format!("only {} addresses are served in-process", SCHEME),
            });
        }
        {
            let mut members = self.shared.members.write();
            if members.is_empty() {
                members.push(options.address.trim_start_matches(SCHEME).to_string());
            }
        }
        debug!(address = %options.address, "memory store dialed");
        Ok(MemorySession::new(Arc::clone(&self.shared)))
    }
}

/// A session over the driver's shared data set.
#[derive(Debug)]
pub struct MemorySession {
    shared: Arc<Shared>,
    closed: AtomicBool,
}

impl MemorySession {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(DriverError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentSession for MemorySession {
    fn fork(&self) -> Self {
        Self::new(Arc::clone(&self.shared))
    }

    fn refresh(&self) {
        self.shared.refreshes.fetch_add(1, Ordering::Relaxed);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    async fn live_servers(&self) -> Result<Vec<String>, DriverError> {
        self.ensure_open()?;
        Ok(self.shared.members.read().clone())
    }

    async fn find(&self, ns: &Namespace, query: &FindQuery) -> Result<Vec<Value>, DriverError> {
        self.ensure_open()?;
        let collections = self.shared.collections.read();
        let Some(documents) = collections.get(ns) else {
            return Ok(Vec::new());
        };

        let mut hits = Vec::new();
        for document in documents {
            if matches(document, &query.filter)? {
                hits.push(document);
            }
        }

        if !query.sort.is_empty() {
            hits.sort_by(|a, b| compare_by_keys(a, b, &query.sort));
        }
        if let Some(limit) = query.limit {
            hits.truncate(limit);
        }

        let mut out = Vec::with_capacity(hits.len());
        for document in hits {
            out.push(match &query.projection {
                Some(projection) => project(document, projection)?,
                None => document.clone(),
            });
        }
        Ok(out)
    }

    async fn upsert(
        &self,
        ns: &Namespace,
        selector: Value,
        document: Value,
    ) -> Result<UpsertOutcome, DriverError> {
        self.ensure_open()?;
        let set_fields = match document.get("$set") {
            Some(Value::Object(fields)) => Some(fields.clone()),
            Some(_) => return Err(DriverError::InvalidQuery("$set expects an object".into())),
            None => None,
        };

        let mut collections = self.shared.collections.write();
        let documents = collections.entry(ns.clone()).or_default();

        let mut position = None;
        for (i, existing) in documents.iter().enumerate() {
            if matches(existing, &selector)? {
                position = Some(i);
                break;
            }
        }

        match (position, set_fields) {
            (Some(i), Some(fields)) => {
                if let Value::Object(existing) = &mut documents[i] {
                    existing.extend(fields);
                }
                Ok(UpsertOutcome { matched: 1, upserted: false })
            }
            (Some(i), None) => {
                documents[i] = document;
                Ok(UpsertOutcome { matched: 1, upserted: false })
            }
            (None, fields) => {
                let mut created = match selector {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                match fields {
                    Some(fields) => created.extend(fields),
                    None => {
                        if let Value::Object(body) = document {
                            created.extend(body);
                        }
                    }
                }
                documents.push(Value::Object(created));
                Ok(UpsertOutcome { matched: 0, upserted: true })
            }
        }
    }

    async fn insert(&self, ns: &Namespace, documents: Vec<Value>) -> Result<(), DriverError> {
        self.ensure_open()?;
        self.shared
            .collections
            .write()
            .entry(ns.clone())
            .or_default()
            .extend(documents);
        Ok(())
    }

    async fn delete(
        &self,
        ns: &Namespace,
        filter: Value,
        scope: DeleteScope,
    ) -> Result<u64, DriverError> {
        self.ensure_open()?;
        let mut collections = self.shared.collections.write();
        let Some(documents) = collections.get_mut(ns) else {
            return Ok(0);
        };

        let mut kept = Vec::with_capacity(documents.len());
        let mut removed = 0u64;
        for document in documents.drain(..) {
            let take = match scope {
                DeleteScope::One => removed == 0,
                DeleteScope::Many => true,
            };
            if take && matches(&document, &filter)? {
                removed += 1;
            } else {
                kept.push(document);
            }
        }
        *documents = kept;
        Ok(removed)
    }

    async fn count(&self, ns: &Namespace, filter: &Value) -> Result<u64, DriverError> {
        self.ensure_open()?;
        let collections = self.shared.collections.read();
        let Some(documents) = collections.get(ns) else {
            return Ok(0);
        };
        let mut total = 0;
        for document in documents {
            if matches(document, filter)? {
                total += 1;
            }
        }
        Ok(total)
    }

    async fn create_index(&self, ns: &Namespace, keys: &[String]) -> Result<(), DriverError> {
        self.ensure_open()?;
        let mut indexes = self.shared.indexes.write();
        let existing = indexes.entry(ns.clone()).or_default();
        if !existing.iter().any(|k| k.as_slice() == keys) {
            existing.push(keys.to_vec());
        }
        Ok(())
    }
}

fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(document, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn matches(document: &Value, filter: &Value) -> Result<bool, DriverError> {
    match filter {
        Value::Null => Ok(true),
        Value::Object(conditions) => {
            for (path, expected) in conditions {
                if path.starts_with('$') || matches!(expected, Value::Object(m) if m.keys().any(|k| k.starts_with('$'))) {
                    return Err(DriverError::InvalidQuery(format!(
                        "operator filters are not supported: {}",
                        path
                    )));
                }
                if lookup(document, path) != Some(expected) {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        other => Err(DriverError::InvalidQuery(format!(
            "filter must be an object, got {}",
            other
        ))),
    }
}

fn project(document: &Value, projection: &Value) -> Result<Value, DriverError> {
    let Value::Object(fields) = projection else {
        return Err(DriverError::InvalidQuery("projection must be an object".into()));
    };
    let Value::Object(source) = document else {
        return Ok(document.clone());
    };
    let mut out = Map::new();
    for (field, include) in fields {
        let included = match include {
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_i64() != Some(0),
            _ => true,
        };
        if !included {
            return Err(DriverError::InvalidQuery(format!(
                "exclusion projections are not supported: {}",
                field
            )));
        }
        if let Some(value) = source.get(field) {
            out.insert(field.clone(), value.clone());
        }
    }
    Ok(Value::Object(out))
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> CmpOrdering {
    match (a, b) {
        (None, None) => CmpOrdering::Equal,
        (None, Some(_)) => CmpOrdering::Less,
        (Some(_), None) => CmpOrdering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(CmpOrdering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

fn compare_by_keys(a: &Value, b: &Value, keys: &[String]) -> CmpOrdering {
    for key in keys {
        let (path, descending) = match key.strip_prefix('-') {
            Some(path) => (path, true),
            None => (key.as_str(), false),
        };
        let ordering = compare_values(lookup(a, path), lookup(b, path));
        let ordering = if descending { ordering.reverse() } else { ordering };
        if ordering != CmpOrdering::Equal {
            return ordering;
        }
    }
    CmpOrdering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ns() -> Namespace {
        Namespace::new("db", "items")
    }

    async fn session_with(documents: Vec<Value>) -> MemorySession {
        MemoryDriver::new()
            .with_documents(ns(), documents)
            .dial(&DialOptions::new("memory://unit"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_dotted_filter_sort_and_limit() {
        let session = session_with(vec![
            json!({"name": "a", "meta": {"zone": 1}, "rank": 3}),
            json!({"name": "b", "meta": {"zone": 2}, "rank": 1}),
            json!({"name": "c", "meta": {"zone": 1}, "rank": 7}),
        ])
        .await;

        let query = FindQuery::filter(json!({"meta.zone": 1})).sort_by(["-rank"]).limit(1);
        let found = session.find(&ns(), &query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["name"], "c");
    }

    #[tokio::test]
    async fn test_projection_keeps_only_included_fields() {
        let session = session_with(vec![json!({"DBName": "game_1", "InnerIP": "10.0.0.1"})]).await;
        let query = FindQuery::all().project(json!({"DBName": 1}));
        let found = session.find(&ns(), &query).await.unwrap();
        assert_eq!(found, vec![json!({"DBName": "game_1"})]);
    }

    #[tokio::test]
    async fn test_operator_filters_rejected() {
        let session = session_with(vec![json!({"n": 1})]).await;
        let query = FindQuery::filter(json!({"n": {"$gt": 0}}));
        assert!(matches!(
            session.find(&ns(), &query).await,
            Err(DriverError::InvalidQuery(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_one_removes_first_match_only() {
        let session = session_with(vec![json!({"k": 1}), json!({"k": 1}), json!({"k": 2})]).await;
        let removed = session.delete(&ns(), json!({"k": 1}), DeleteScope::One).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(session.count(&ns(), &Value::Null).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_forks_share_data_but_close_independently() {
        let session = session_with(vec![]).await;
        let fork = session.fork();
        fork.insert(&ns(), vec![json!({"k": 1})]).await.unwrap();
        assert_eq!(session.count(&ns(), &Value::Null).await.unwrap(), 1);

        fork.close();
        assert!(matches!(fork.count(&ns(), &Value::Null).await, Err(DriverError::Closed)));
        assert!(session.count(&ns(), &Value::Null).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_index_is_idempotent() {
        let driver = MemoryDriver::new();
        let session = driver.dial(&DialOptions::new("memory://idx")).await.unwrap();
        let keys = vec!["ServerID".to_string()];
        session.create_index(&ns(), &keys).await.unwrap();
        session.create_index(&ns(), &keys).await.unwrap();
        assert_eq!(driver.indexes(&ns()), vec![keys]);
    }
}
