//! Full and incremental database backups.
//!
//! # Responsibilities
//! - Pick a backup source, preferring a non-primary replica
//! - Run one full backup per day at a configured hour, skipping days whose
//!   backup directory already exists on the source
//! - Run the incremental script on a fixed interval
//!
//! # Design Decisions
//! - Replica roles are refreshed before each full backup; hosts whose role
//!   cannot be read keep their last-known flag
//! - Full backup output is sent in batches so a long run reports progress
//! - Incremental runs are silent unless they fail

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::catalog::FleetCatalog;
use super::model::HostDescriptor;
use super::probe::{answered_yes, ProbeContext};
use crate::config::BackupConfig;
use crate::observability::metrics;
use crate::remote::commands::ScriptInvocation;
use crate::store::{DocumentSession, FindQuery, Namespace, SessionPool};

/// Start of `now`'s day, plus one day, plus `hour` hours.
pub fn next_full_backup_at<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32) -> DateTime<Tz> {
    let tz = now.timezone();
    let midnight = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| tz.from_local_datetime(&naive).earliest())
        .unwrap_or_else(|| now.clone());
    midnight + chrono::Duration::hours(24 + i64::from(hour))
}

/// Chosen backup source and whether it was a fallback choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSource {
    pub host: Arc<HostDescriptor>,
    pub fallback: Option<&'static str>,
}

/// Pick among `hosts` (database hosts in name order).
pub fn choose_source(hosts: &[Arc<HostDescriptor>]) -> Option<BackupSource> {
    match hosts {
        [] => None,
        [only] => Some(BackupSource {
            host: Arc::clone(only),
            fallback: Some("only one database host is configured"),
        }),
        _ => match hosts.iter().find(|h| !h.is_primary) {
            Some(secondary) => Some(BackupSource {
                host: Arc::clone(secondary),
                fallback: None,
            }),
            None => Some(BackupSource {
                host: Arc::clone(&hosts[0]),
                fallback: Some("no secondary database host found"),
            }),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FullBackupOutcome {
    Misconfigured(&'static str),
    NoSource,
    AlreadyDone { directory: String },
    ProbeFailed(String),
    Completed { databases: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncrementalOutcome {
    Misconfigured(&'static str),
    NoSource,
    Failed(String),
    Clean,
}

#[derive(Deserialize)]
struct DatabaseName {
    #[serde(rename = "DBName", default)]
    db_name: String,
}

pub struct BackupScheduler<S: DocumentSession> {
    probes: ProbeContext,
    catalog: Arc<FleetCatalog>,
    pool: Arc<SessionPool<S>>,
    catalog_ns: Namespace,
    config: BackupConfig,
}

impl<S: DocumentSession> BackupScheduler<S> {
    pub fn new(
        probes: ProbeContext,
        catalog: Arc<FleetCatalog>,
        pool: Arc<SessionPool<S>>,
        catalog_ns: Namespace,
        config: BackupConfig,
    ) -> Self {
        Self {
            probes,
            catalog,
            pool,
            catalog_ns,
            config,
        }
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    fn invocation<'a>(&'a self, host: &'a HostDescriptor, script: &'a str) -> Option<ScriptInvocation<'a>> {
        let database = host.database.as_ref()?;
        let (ip, port) = database.host_port();
        Some(ScriptInvocation {
            script_dir: &self.config.script_dir,
            script,
            ip,
            port,
            account: &database.account,
            password: &database.password,
        })
    }

    /// Database host to back up from; fallbacks are reported to operators.
    pub async fn select_backup_source(&self) -> Option<Arc<HostDescriptor>> {
        let snapshot = self.catalog.snapshot();
        let hosts: Vec<Arc<HostDescriptor>> = snapshot.database_hosts().cloned().collect();
        let source = choose_source(&hosts)?;
        if let Some(reason) = source.fallback {
            self.probes
                .report(&format!(
                    "{}; backing up from {} ({})",
                    reason, source.host.name, source.host.inner_ip
                ))
                .await;
        }
        Some(source.host)
    }

    /// Ask every database host for its replica role.
    pub async fn refresh_replica_roles(&self) {
        if self.config.replica_role_script.is_empty() {
            return;
        }
        let snapshot = self.catalog.snapshot();
        for host in snapshot.database_hosts() {
            let Some(invocation) = self.invocation(host, &self.config.replica_role_script) else {
                continue;
            };
            let command = self.probes.commands.replica_role(&invocation);
            match self.probes.run_once(host, &command).await {
                Ok(output) => {
                    let primary = output.contains("true");
                    self.catalog.set_primary(&host.name, primary);
                    debug!(host = %host.name, primary, "replica role refreshed");
                }
                Err(e) => debug!(host = %host.name, error = %e, "replica role unknown, keeping last value"),
            }
        }
    }

    /// Run today's full backup if needed; returns the delay until the next one.
    #[instrument(skip(self), fields(cycle = %Uuid::new_v4()))]
    pub async fn run_full_backup_cycle(&self) -> Duration {
        let now = self.probes.clock.now().with_timezone(&Local);
        let next = next_full_backup_at(&now, self.config.full_backup_hour);

        let outcome = self.run_full_backup(now.date_naive()).await;
        metrics::record_backup("full", outcome_label(&outcome));
        info!(outcome = ?outcome, next = %next, "full backup cycle finished");

        let after = self.probes.clock.now().with_timezone(&Local);
        (next - after).to_std().unwrap_or(Duration::ZERO)
    }

    pub async fn run_full_backup(&self, today: NaiveDate) -> FullBackupOutcome {
        if let Some(missing) = self.missing_full_backup_setting() {
            self.probes
                .report(&format!("{} is not configured; full backup skipped", missing))
                .await;
            return FullBackupOutcome::Misconfigured(missing);
        }

        self.refresh_replica_roles().await;
        let Some(source) = self.select_backup_source().await else {
            self.probes
                .report("no database host is configured; full backup skipped")
                .await;
            return FullBackupOutcome::NoSource;
        };

        let directory = format!("{}{}", self.config.full_backup_dir, today.format("%Y%m%d"));
        let check = self.probes.commands.path_exists(&directory);
        match self.probes.run_once(&source, &check).await {
            Ok(output) if answered_yes(&output) => {
                info!(directory = %directory, host = %source.name, "full backup already present");
                return FullBackupOutcome::AlreadyDone { directory };
            }
            Ok(_) => {}
            Err(e) => {
                let message = format!(
                    "cannot check {} on {}: {}; full backup failed",
                    directory, source.name, e
                );
                self.probes.report(&message).await;
                return FullBackupOutcome::ProbeFailed(e.to_string());
            }
        }

        let databases = self.database_names().await;
        info!(host = %source.name, databases = databases.len(), "full backup starting");

        let gap = Duration::from_secs(self.config.database_gap_secs);
        let batch = self.config.report_batch.max(1);
        let mut pending = String::new();
        for (i, name) in databases.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(gap).await;
            }
            pending.push_str(&self.backup_database(&source, name).await);
            if (i + 1) % batch == 0 {
                self.probes.report(&pending).await;
                pending.clear();
            }
        }
        pending.push_str("full database backup finished");
        self.probes.report(&pending).await;

        FullBackupOutcome::Completed {
            databases: databases.len(),
        }
    }

    fn missing_full_backup_setting(&self) -> Option<&'static str> {
        if self.config.full_backup_dir.is_empty() {
            Some("full backup directory")
        } else if self.config.script_dir.is_empty() {
            Some("backup script directory")
        } else if self.config.full_script.is_empty() {
            Some("full backup script")
        } else {
            None
        }
    }

    /// Catalog database names plus the configured extras, empties dropped.
    async fn database_names(&self) -> Vec<String> {
        let query = FindQuery::all().project(serde_json::json!({ "DBName": 1 }));
        let mut names: Vec<String> = match self.pool.find_query::<DatabaseName>(&self.catalog_ns, &query).await {
            Ok(records) => records.into_iter().map(|r| r.db_name).collect(),
            Err(e) => {
                warn!(error = %e, "cannot list catalog databases");
                self.probes
                    .report(&format!("cannot list catalog databases: {}", e))
                    .await;
                Vec::new()
            }
        };
        names.extend(self.config.extra_databases.iter().cloned());
        names.retain(|n| !n.is_empty());
        names
    }

    async fn backup_database(&self, source: &HostDescriptor, name: &str) -> String {
        let Some(invocation) = self.invocation(source, &self.config.full_script) else {
            return format!("backup of {} skipped: {} has no database endpoint\n", name, source.name);
        };
        let command = self.probes.commands.full_backup(&invocation, name);
        match self.probes.run_once(source, &command).await {
            Ok(output) => {
                let mut line = output.trim_end().to_string();
                line.push('\n');
                line
            }
            Err(e) => format!("backup of {} failed: {}\n", name, e),
        }
    }

    /// Run the incremental script once.
    #[instrument(skip(self), fields(cycle = %Uuid::new_v4()))]
    pub async fn run_incremental_backup(&self) -> IncrementalOutcome {
        let outcome = self.incremental_backup().await;
        let label = match &outcome {
            IncrementalOutcome::Clean => "completed",
            IncrementalOutcome::Failed(_) => "failed",
            _ => "skipped",
        };
        metrics::record_backup("incremental", label);
        outcome
    }

    async fn incremental_backup(&self) -> IncrementalOutcome {
        let missing = if self.config.script_dir.is_empty() {
            Some("backup script directory")
        } else if self.config.incremental_script.is_empty() {
            Some("incremental backup script")
        } else {
            None
        };
        if let Some(missing) = missing {
            self.probes
                .report(&format!("{} is not configured; incremental backup skipped", missing))
                .await;
            return IncrementalOutcome::Misconfigured(missing);
        }

        let Some(source) = self.select_backup_source().await else {
            self.probes
                .report("no database host is configured; incremental backup skipped")
                .await;
            return IncrementalOutcome::NoSource;
        };
        let Some(invocation) = self.invocation(&source, &self.config.incremental_script) else {
            return IncrementalOutcome::NoSource;
        };

        let command = self.probes.commands.incremental_backup(&invocation);
        match self.probes.run_once(&source, &command).await {
            Ok(output) if output.contains("Fatal Error") => {
                let message = format!("incremental backup on {} reported errors:\n{}", source.name, output.trim_end());
                self.probes.report(&message).await;
                IncrementalOutcome::Failed(output)
            }
            Ok(_) => {
                debug!(host = %source.name, "incremental backup finished");
                IncrementalOutcome::Clean
            }
            Err(e) => {
                let message = format!("incremental backup on {} failed: {}", source.name, e);
                self.probes.report(&message).await;
                IncrementalOutcome::Failed(e.to_string())
            }
        }
    }
}

fn outcome_label(outcome: &FullBackupOutcome) -> &'static str {
    match outcome {
        FullBackupOutcome::Completed { .. } => "completed",
        FullBackupOutcome::AlreadyDone { .. } => "already_done",
        FullBackupOutcome::ProbeFailed(_) => "failed",
        FullBackupOutcome::Misconfigured(_) | FullBackupOutcome::NoSource => "skipped",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::model::{DatabaseEndpoint, SshCredentials};
    use chrono::FixedOffset;

    fn db_host(name: &str, primary: bool) -> Arc<HostDescriptor> {
        Arc::new(HostDescriptor {
            name: name.into(),
            external_ip: String::new(),
            inner_ip: format!("10.0.1.{}", name.len()),
            ssh: SshCredentials { user: "ops".into(), password: String::new() },
            database: Some(DatabaseEndpoint {
                path: "/data/mongo".into(),
                address: "10.0.1.1:27017".into(),
                account: "root".into(),
                password: "pw".into(),
            }),
            is_primary: primary,
        })
    }

    #[test]
    fn test_next_full_backup_is_tomorrow_at_hour() {
        let tz = FixedOffset::east_opt(8 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2024, 5, 1, 15, 30, 0).unwrap();
        let next = next_full_backup_at(&now, 2);
        assert_eq!(next, tz.with_ymd_and_hms(2024, 5, 2, 2, 0, 0).unwrap());

        // Just after midnight still schedules for the following day.
        let early = tz.with_ymd_and_hms(2024, 5, 1, 0, 5, 0).unwrap();
        assert_eq!(next_full_backup_at(&early, 2), tz.with_ymd_and_hms(2024, 5, 2, 2, 0, 0).unwrap());
    }

    #[test]
    fn test_source_prefers_secondary() {
        let hosts = vec![db_host("db-a", true), db_host("db-b", false), db_host("db-c", false)];
        let source = choose_source(&hosts).unwrap();
        assert_eq!(source.host.name, "db-b");
        assert_eq!(source.fallback, None);
    }

    #[test]
    fn test_source_fallbacks() {
        assert!(choose_source(&[]).is_none());

        let single = choose_source(&[db_host("db-a", true)]).unwrap();
        assert_eq!(single.host.name, "db-a");
        assert!(single.fallback.is_some());

        let all_primary = choose_source(&[db_host("db-a", true), db_host("db-b", true)]).unwrap();
        assert_eq!(all_primary.host.name, "db-a");
        assert!(all_primary.fallback.is_some());
    }
}
