//! Fleet catalog: hosts plus the processes installed on them.
//!
//! Readers take an immutable [`FleetSnapshot`] per cycle. Writers publish a
//! new snapshot; every host change regroups the last-loaded process list so
//! the next cycle sees added or removed hosts without a store round trip.
//!
//! A configuration reload names the hosts the file owns. Hosts an operator
//! added at runtime survive the reload unless the file names them too, and
//! replica roles learned from the cluster carry over to reloaded entries.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::model::{HostDescriptor, ProcessDescriptor};
use crate::store::{DocumentSession, Namespace, SessionPool, StoreResult};

#[derive(Debug, Default)]
pub struct FleetSnapshot {
    hosts: Vec<Arc<HostDescriptor>>,
    by_host: HashMap<String, Vec<Arc<ProcessDescriptor>>>,
    loaded: Vec<Arc<ProcessDescriptor>>,
}

impl FleetSnapshot {
    fn build(mut hosts: Vec<Arc<HostDescriptor>>, loaded: Vec<Arc<ProcessDescriptor>>) -> Self {
        hosts.sort_by(|a, b| a.name.cmp(&b.name));

        let owner: HashMap<&str, &str> = hosts
            .iter()
            .map(|h| (h.inner_ip.as_str(), h.name.as_str()))
            .collect();

        let mut by_host: HashMap<String, Vec<Arc<ProcessDescriptor>>> = HashMap::new();
        let mut orphans = 0usize;
        for process in &loaded {
            match owner.get(process.inner_ip.as_str()) {
                Some(host) => by_host
                    .entry((*host).to_string())
                    .or_default()
                    .push(Arc::clone(process)),
                None => orphans += 1,
            }
        }
        if orphans > 0 {
            debug!(orphans, "processes without a matching host");
        }

        Self { hosts, by_host, loaded }
    }

    /// Hosts sorted by name.
    pub fn hosts(&self) -> &[Arc<HostDescriptor>] {
        &self.hosts
    }

    pub fn host(&self, name: &str) -> Option<&Arc<HostDescriptor>> {
        self.hosts.iter().find(|h| h.name == name)
    }

    pub fn processes_on(&self, host: &str) -> &[Arc<ProcessDescriptor>] {
        self.by_host.get(host).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Hosts with a database endpoint, sorted by name.
    pub fn database_hosts(&self) -> impl Iterator<Item = &Arc<HostDescriptor>> {
        self.hosts.iter().filter(|h| h.database.is_some())
    }

    /// Processes matched to a host.
    pub fn process_count(&self) -> usize {
        self.by_host.values().map(Vec::len).sum()
    }
}

/// What a host update did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostUpdate {
    Added,
    Replaced,
    Removed,
    /// Removal of a host that was not in the catalog.
    Unknown,
}

#[derive(Debug, Default)]
pub struct FleetCatalog {
    current: ArcSwap<FleetSnapshot>,
    /// Hosts added or replaced through `apply_host_update`.
    operator_hosts: Mutex<HashSet<String>>,
}

impl FleetCatalog {
    pub fn new(hosts: Vec<HostDescriptor>) -> Self {
        let hosts = hosts.into_iter().map(Arc::new).collect();
        Self {
            current: ArcSwap::from_pointee(FleetSnapshot::build(hosts, Vec::new())),
            operator_hosts: Mutex::new(HashSet::new()),
        }
    }

    pub fn snapshot(&self) -> Arc<FleetSnapshot> {
        self.current.load_full()
    }

    fn publish_hosts<F>(&self, mut edit: F)
    where
        F: FnMut(&mut Vec<Arc<HostDescriptor>>),
    {
        self.current.rcu(|snapshot| {
            let mut hosts = snapshot.hosts.clone();
            edit(&mut hosts);
            FleetSnapshot::build(hosts, snapshot.loaded.clone())
        });
    }

    pub fn replace_hosts(&self, hosts: Vec<HostDescriptor>) {
        let hosts: Vec<Arc<HostDescriptor>> = hosts.into_iter().map(Arc::new).collect();
        let count = hosts.len();
        self.publish_hosts(|current| *current = hosts.clone());
        self.operator_hosts.lock().clear();
        info!(hosts = count, "host list replaced");
    }

    /// Apply a reloaded configuration host list.
    ///
    /// The file wins for every host it names. Operator-added hosts it does not
    /// name are kept, and a reloaded host keeps the replica role currently
    /// recorded for it.
    pub fn reload_hosts(&self, configured: Vec<HostDescriptor>) {
        let operator_hosts = self.operator_hosts.lock().clone();
        let named: HashSet<String> = configured.iter().map(|h| h.name.clone()).collect();
        let mut kept = 0usize;
        self.publish_hosts(|current| {
            let roles: HashMap<&str, bool> = current
                .iter()
                .map(|h| (h.name.as_str(), h.is_primary))
                .collect();
            let mut merged: Vec<Arc<HostDescriptor>> = configured
                .iter()
                .map(|host| {
                    let mut host = host.clone();
                    if let Some(&is_primary) = roles.get(host.name.as_str()) {
                        host.is_primary = is_primary;
                    }
                    Arc::new(host)
                })
                .collect();
            let runtime: Vec<Arc<HostDescriptor>> = current
                .iter()
                .filter(|h| operator_hosts.contains(&h.name) && !named.contains(&h.name))
                .cloned()
                .collect();
            kept = runtime.len();
            merged.extend(runtime);
            *current = merged;
        });
        self.operator_hosts.lock().retain(|name| !named.contains(name));
        info!(configured = named.len(), operator_added = kept, "host list reloaded");
    }

    /// Upsert `host` by name; empty SSH user and password removes it.
    pub fn apply_host_update(&self, host: HostDescriptor) -> HostUpdate {
        let mut outcome = HostUpdate::Unknown;
        let remove = host.ssh.is_empty();
        let host = Arc::new(host);
        self.publish_hosts(|hosts| {
            let existing = hosts.iter().position(|h| h.name == host.name);
            outcome = match (existing, remove) {
                (Some(i), true) => {
                    hosts.remove(i);
                    HostUpdate::Removed
                }
                (None, true) => HostUpdate::Unknown,
                (Some(i), false) => {
                    hosts[i] = Arc::clone(&host);
                    HostUpdate::Replaced
                }
                (None, false) => {
                    hosts.push(Arc::clone(&host));
                    HostUpdate::Added
                }
            };
        });
        match outcome {
            HostUpdate::Added | HostUpdate::Replaced => {
                self.operator_hosts.lock().insert(host.name.clone());
            }
            HostUpdate::Removed => {
                self.operator_hosts.lock().remove(&host.name);
            }
            HostUpdate::Unknown => {}
        }
        info!(host = %host.name, outcome = ?outcome, "host update applied");
        outcome
    }

    /// Record a host's replica role. Returns false for unknown hosts.
    pub fn set_primary(&self, name: &str, is_primary: bool) -> bool {
        let mut found = false;
        self.publish_hosts(|hosts| {
            found = false;
            if let Some(slot) = hosts.iter_mut().find(|h| h.name == name) {
                found = true;
                if slot.is_primary != is_primary {
                    let mut updated = HostDescriptor::clone(slot);
                    updated.is_primary = is_primary;
                    *slot = Arc::new(updated);
                }
            }
        });
        found
    }

    pub fn load_processes(&self, processes: Vec<ProcessDescriptor>) {
        let loaded: Vec<Arc<ProcessDescriptor>> = processes.into_iter().map(Arc::new).collect();
        self.current.rcu(|snapshot| FleetSnapshot::build(snapshot.hosts.clone(), loaded.clone()));
        let snapshot = self.snapshot();
        info!(
            loaded = snapshot.loaded.len(),
            matched = snapshot.process_count(),
            "process catalog loaded"
        );
    }

    /// Reload every process descriptor from `ns`.
    pub async fn refresh_from_store<S: DocumentSession>(
        &self,
        pool: &SessionPool<S>,
        ns: &Namespace,
    ) -> StoreResult<usize> {
        let processes: Vec<ProcessDescriptor> = pool.find_all(ns, Value::Null).await?;
        let count = processes.len();
        self.load_processes(processes);
        Ok(count)
    }
}
