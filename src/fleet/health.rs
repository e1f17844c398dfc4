//! Fleet health checks and auto-remediation.
//!
//! # Responsibilities
//! - Probe host resources and report threshold breaches in one message
//! - Probe process, service and database liveness; restart what is down
//! - Honour the maintenance toggle for process liveness
//! - Operator-triggered restarts, catalog reloads and host summaries
//!
//! Each check fans out one spawned task per probe target. A panicking probe
//! is logged at the task boundary and the cycle still completes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::catalog::FleetCatalog;
use super::model::HostDescriptor;
use super::probe::{
    answered_yes, parse_cpu, parse_disks, parse_memory, DiskUsage, MemoryUsage, ProbeContext,
};
use crate::config::HealthConfig;
use crate::observability::metrics;
use crate::remote::RemoteError;
use crate::store::{DocumentSession, Namespace, SessionPool, StoreResult};

/// Result of one liveness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Liveness {
    Healthy,
    /// The probe itself could not run; logged only.
    Unreachable(String),
    Down(Remediation),
}

/// What happened when a down target was restarted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Remediation {
    Restarted,
    /// No session could be opened for the restart.
    NoSession(String),
    CommandFailed(String),
}

/// One probed target and its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub host: String,
    pub target: String,
    pub liveness: Liveness,
}

#[derive(Debug, Clone, Copy)]
struct Thresholds {
    memory: f64,
    cpu: f64,
    disk: f64,
}

/// Raw resource usage of one host, independent of thresholds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostSummary {
    pub host: String,
    pub inner_ip: String,
    pub memory: Option<MemoryUsage>,
    pub cpu_percent: Option<f64>,
    pub disks: Vec<DiskUsage>,
    /// Metrics that could not be sampled, as `metric: reason`.
    pub unavailable: Vec<String>,
}

impl HostSummary {
    fn new(host: &HostDescriptor) -> Self {
        Self {
            host: host.name.clone(),
            inner_ip: host.inner_ip.clone(),
            memory: None,
            cpu_percent: None,
            disks: Vec::new(),
            unavailable: Vec::new(),
        }
    }

    fn skip(&mut self, metric: &str, reason: impl std::fmt::Display) {
        debug!(host = %self.host, metric, reason = %reason, "resource sample skipped");
        self.unavailable.push(format!("{}: {}", metric, reason));
    }

    fn breaches(&self, limits: Thresholds) -> Vec<String> {
        let mut findings = Vec::new();
        if let Some(mem) = self.memory.filter(|m| m.used_percent >= limits.memory) {
            findings.push(format!(
                "{} ({}): memory {:.1}% used",
                self.host, self.inner_ip, mem.used_percent
            ));
        }
        if let Some(cpu) = self.cpu_percent.filter(|&c| c >= limits.cpu) {
            findings.push(format!("{} ({}): cpu {:.1}% busy", self.host, self.inner_ip, cpu));
        }
        for disk in self.disks.iter().filter(|d| d.used_percent >= limits.disk) {
            findings.push(format!(
                "{} ({}): disk {} ({}) {:.0}% used",
                self.host, self.inner_ip, disk.mount, disk.size, disk.used_percent
            ));
        }
        findings
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SummaryError {
    #[error("host {0} is not in the catalog")]
    UnknownHost(String),
}

#[derive(Debug, Error)]
pub enum RestartError {
    #[error("host {0} is not in the catalog")]
    UnknownHost(String),

    #[error("{0:?} is not a valid service directory")]
    InvalidDirectory(String),

    #[error("{stage} on {host} failed: {source}")]
    Remote {
        stage: &'static str,
        host: String,
        #[source]
        source: RemoteError,
    },
}

/// Health scheduler state shared by the three check timers and the HTTP
/// triggers.
pub struct FleetHealth<S: DocumentSession> {
    probes: ProbeContext,
    catalog: Arc<FleetCatalog>,
    pool: Arc<SessionPool<S>>,
    catalog_ns: Namespace,
    config: HealthConfig,
    liveness_enabled: AtomicBool,
}

impl<S: DocumentSession> FleetHealth<S> {
    pub fn new(
        probes: ProbeContext,
        catalog: Arc<FleetCatalog>,
        pool: Arc<SessionPool<S>>,
        catalog_ns: Namespace,
        config: HealthConfig,
    ) -> Self {
        let liveness_enabled = AtomicBool::new(config.liveness_checks);
        Self {
            probes,
            catalog,
            pool,
            catalog_ns,
            config,
            liveness_enabled,
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Maintenance toggle; suspends process liveness checks only.
    pub fn set_liveness_checks(&self, enabled: bool) {
        let previous = self.liveness_enabled.swap(enabled, Ordering::Relaxed);
        if previous != enabled {
            info!(enabled, "process liveness checks toggled");
        }
    }

    pub fn liveness_checks_enabled(&self) -> bool {
        self.liveness_enabled.load(Ordering::Relaxed)
    }

    fn thresholds(&self) -> Thresholds {
        Thresholds {
            memory: self.config.memory_max_percent,
            cpu: self.config.cpu_max_percent,
            disk: self.config.disk_max_percent,
        }
    }

    /// Probe memory, CPU and disk on every host. Returns the findings; a
    /// single merged notification is sent when there are any.
    #[instrument(skip(self), fields(cycle = %Uuid::new_v4()))]
    pub async fn check_host_resources(&self) -> Vec<String> {
        let snapshot = self.catalog.snapshot();
        let thresholds = self.thresholds();

        let mut probes = JoinSet::new();
        for host in snapshot.hosts() {
            let ctx = self.probes.clone();
            let host = Arc::clone(host);
            probes.spawn(async move { inspect_resources(&ctx, &host, thresholds).await });
        }

        let mut findings = Vec::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(mut host_findings) => findings.append(&mut host_findings),
                Err(e) => error!(error = %e, "resource probe task failed"),
            }
        }

        if findings.is_empty() {
            debug!(hosts = snapshot.hosts().len(), "all hosts within resource thresholds");
        } else {
            findings.sort();
            let message = format!("Resource thresholds exceeded:\n{}", findings.join("\n"));
            self.probes.report(&message).await;
        }
        findings
    }

    /// Sample every host, or only `host`, and return raw usage sorted by host
    /// name. Failed samples are listed per host rather than failing the call.
    #[instrument(skip(self))]
    pub async fn host_summary(&self, host: Option<&str>) -> Result<Vec<HostSummary>, SummaryError> {
        let snapshot = self.catalog.snapshot();
        let targets: Vec<Arc<HostDescriptor>> = match host {
            Some(name) => vec![snapshot
                .host(name)
                .cloned()
                .ok_or_else(|| SummaryError::UnknownHost(name.to_string()))?],
            None => snapshot.hosts().to_vec(),
        };

        let mut probes = JoinSet::new();
        for target in targets {
            let ctx = self.probes.clone();
            probes.spawn(async move { sample_resources(&ctx, &target).await });
        }

        let mut summaries = Vec::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(summary) => summaries.push(summary),
                Err(e) => error!(error = %e, "host summary task failed"),
            }
        }
        summaries.sort_by(|a, b| a.host.cmp(&b.host));
        Ok(summaries)
    }

    /// Hub service first, then the web service and every eligible process
    /// concurrently. Returns `None` while in maintenance mode.
    #[instrument(skip(self), fields(cycle = %Uuid::new_v4()))]
    pub async fn check_process_liveness(&self) -> Option<Vec<ProbeReport>> {
        if !self.liveness_checks_enabled() {
            debug!("process liveness checks suspended");
            return None;
        }

        let snapshot = self.catalog.snapshot();
        let mut reports = Vec::new();

        if let Some(hub) = snapshot.host(&self.config.hub_host) {
            let ctx = self.probes.clone();
            let hub = Arc::clone(hub);
            match tokio::spawn(async move { check_service(&ctx, &hub).await }).await {
                Ok(report) => reports.push(report),
                Err(e) => error!(error = %e, "hub probe task failed"),
            }
        }

        let now = self.probes.clock.now();
        let grace = chrono::Duration::seconds(self.config.start_grace_secs as i64);
        let mut probes = JoinSet::new();

        if let Some(web) = snapshot.host(&self.config.web_host) {
            let ctx = self.probes.clone();
            let web = Arc::clone(web);
            probes.spawn(async move { check_service(&ctx, &web).await });
        }

        for host in snapshot.hosts() {
            if host.name == self.config.web_host {
                continue;
            }
            for process in snapshot.processes_on(&host.name) {
                if process.liveness_exempt(now, grace) {
                    debug!(host = %host.name, process = %process.id, "process exempt from liveness");
                    continue;
                }
                let ctx = self.probes.clone();
                let host = Arc::clone(host);
                let process = Arc::clone(process);
                probes.spawn(async move {
                    let timestamp = ctx.timestamp();
                    let check = ctx.commands.process_check(&process.id);
                    let restart = ctx.commands.process_restart(&process.id, &timestamp);
                    probe_and_remedy(&ctx, &host, process.label(), "process", &check, &restart).await
                });
            }
        }

        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => error!(error = %e, "liveness probe task failed"),
            }
        }
        Some(reports)
    }

    /// Check the database process on every host that has one.
    #[instrument(skip(self), fields(cycle = %Uuid::new_v4()))]
    pub async fn check_database_liveness(&self) -> Vec<ProbeReport> {
        let snapshot = self.catalog.snapshot();
        let mut probes = JoinSet::new();
        for host in snapshot.database_hosts() {
            let Some(database) = host.database.as_ref() else {
                continue;
            };
            let ctx = self.probes.clone();
            let host = Arc::clone(host);
            let restart = ctx.commands.database_restart(&database.path);
            probes.spawn(async move {
                let check = ctx.commands.database_check.clone();
                let target = format!("database {}", host.name);
                probe_and_remedy(&ctx, &host, target, "database", &check, &restart).await
            });
        }

        let mut reports = Vec::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => error!(error = %e, "database probe task failed"),
            }
        }

        match self.pool.live_members().await {
            Ok(members) => {
                metrics::record_live_members(members.len());
                debug!(members = ?members, "database members visible to the pool");
            }
            Err(e) => warn!(error = %e, "cannot read database members"),
        }
        reports
    }

    /// Stop then start the service in `dir` on `host`.
    pub async fn restart_process(&self, host: &str, dir: &str) -> Result<String, RestartError> {
        if dir.is_empty()
            || dir.contains("..")
            || !dir
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/'))
        {
            return Err(RestartError::InvalidDirectory(dir.to_string()));
        }
        let snapshot = self.catalog.snapshot();
        let target = snapshot
            .host(host)
            .cloned()
            .ok_or_else(|| RestartError::UnknownHost(host.to_string()))?;

        let stop = self.probes.commands.service_stop(dir);
        let stopped = self
            .probes
            .run_once(&target, &stop)
            .await
            .map_err(|source| RestartError::Remote { stage: "stop", host: host.to_string(), source })?;

        let start = self.probes.commands.service_start(dir);
        let started = self
            .probes
            .run_once(&target, &start)
            .await
            .map_err(|source| RestartError::Remote { stage: "start", host: host.to_string(), source })?;

        info!(host, dir, "service restarted by operator");
        Ok(format!("{}{}", stopped, started))
    }

    /// Reload process descriptors from the catalog collection.
    pub async fn refresh_catalog(&self) -> StoreResult<usize> {
        self.catalog.refresh_from_store(&self.pool, &self.catalog_ns).await
    }
}

/// Memory, CPU and disk usage of one host, one short-lived session each.
async fn sample_resources(ctx: &ProbeContext, host: &HostDescriptor) -> HostSummary {
    let mut summary = HostSummary::new(host);

    match ctx.run_once(host, &ctx.commands.memory_probe).await {
        Ok(output) => match parse_memory(&output) {
            Some(mem) => summary.memory = Some(mem),
            None => summary.skip("memory", "unparseable output"),
        },
        Err(e) => summary.skip("memory", e),
    }

    match ctx.run_once(host, &ctx.commands.cpu_probe).await {
        Ok(output) => match parse_cpu(&output) {
            Some(cpu) => summary.cpu_percent = Some(cpu),
            None => summary.skip("cpu", "unparseable output"),
        },
        Err(e) => summary.skip("cpu", e),
    }

    match ctx.run_once(host, &ctx.commands.disk_probe).await {
        Ok(output) => summary.disks = parse_disks(&output),
        Err(e) => summary.skip("disk", e),
    }

    summary
}

async fn inspect_resources(ctx: &ProbeContext, host: &HostDescriptor, limits: Thresholds) -> Vec<String> {
    let findings = sample_resources(ctx, host).await.breaches(limits);

    let outcome = if findings.is_empty() { "ok" } else { "breach" };
    metrics::record_probe("resources", outcome);
    findings
}

async fn check_service(ctx: &ProbeContext, host: &HostDescriptor) -> ProbeReport {
    let check = ctx.commands.service_check(&host.name);
    let restart = ctx.commands.service_restart(&host.name, &ctx.timestamp());
    probe_and_remedy(ctx, host, format!("service {}", host.name), "service", &check, &restart).await
}

/// Probe a target; when it is down, restart it in a fresh session and
/// notify the outcome.
async fn probe_and_remedy(
    ctx: &ProbeContext,
    host: &HostDescriptor,
    target: String,
    kind: &'static str,
    check: &str,
    restart: &str,
) -> ProbeReport {
    let liveness = match ctx.run_once(host, check).await {
        Err(e) => {
            warn!(host = %host.name, target = %target, error = %e, "liveness probe could not run");
            metrics::record_probe(kind, "unreachable");
            Liveness::Unreachable(e.to_string())
        }
        Ok(output) if answered_yes(&output) => {
            metrics::record_probe(kind, "healthy");
            Liveness::Healthy
        }
        Ok(_) => {
            warn!(host = %host.name, target = %target, "target is down, restarting");
            metrics::record_probe(kind, "down");
            let remediation = remediate(ctx, host, restart).await;
            metrics::record_remediation(kind, remediation == Remediation::Restarted);
            ctx.report(&down_message(&target, host, &remediation)).await;
            Liveness::Down(remediation)
        }
    };

    ProbeReport {
        host: host.name.clone(),
        target,
        liveness,
    }
}

async fn remediate(ctx: &ProbeContext, host: &HostDescriptor, restart: &str) -> Remediation {
    let mut session = match ctx.remote.open(host, ctx.ssh_port).await {
        Ok(session) => session,
        Err(e) => return Remediation::NoSession(e.to_string()),
    };
    let result = session.run(restart).await;
    session.close().await;
    match result {
        Ok(_) => Remediation::Restarted,
        Err(e) => Remediation::CommandFailed(e.to_string()),
    }
}

fn down_message(target: &str, host: &HostDescriptor, remediation: &Remediation) -> String {
    match remediation {
        Remediation::Restarted => {
            format!("{} on {} ({}) was down and has been restarted", target, host.name, host.inner_ip)
        }
        Remediation::NoSession(reason) => format!(
            "{} on {} ({}) is down; restart failed, no session: {}",
            target, host.name, host.inner_ip, reason
        ),
        Remediation::CommandFailed(reason) => format!(
            "{} on {} ({}) is down; restart command failed: {}",
            target, host.name, host.inner_ip, reason
        ),
    }
}
