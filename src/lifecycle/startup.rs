//! Startup orchestration.
//!
//! # Responsibilities
//! - Open the session pool (the only fatal step)
//! - Seed the fleet catalog from config, then from the catalog database
//! - Build the health, backup and panic subsystems around one probe context
//! - Arm every periodic task against the shutdown broadcast
//!
//! # Design Decisions
//! - Subsystems initialize in order, not concurrently
//! - Timers are spawned by the caller once the listener is bound

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::shutdown::Shutdown;
use super::timer::{run_self_rescheduling, Schedule};
use crate::clock::Clock;
use crate::config::RobotConfig;
use crate::fleet::{BackupScheduler, FleetCatalog, FleetHealth, ProbeContext};
use crate::http::AppState;
use crate::notify::Notifier;
use crate::panics::PanicAggregator;
use crate::remote::RemoteExec;
use crate::store::{ConnectionError, DocumentDriver, DocumentSession, SessionPool};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to open session pool: {0}")]
    Pool(#[from] ConnectionError),
}

/// The assembled robot: every subsystem, sharing one pool and one catalog.
pub struct Robot<S: DocumentSession> {
    config: RobotConfig,
    probes: ProbeContext,
    pool: Arc<SessionPool<S>>,
    catalog: Arc<FleetCatalog>,
    health: Arc<FleetHealth<S>>,
    backup: Arc<BackupScheduler<S>>,
    panics: Arc<PanicAggregator>,
}

impl<S: DocumentSession> Robot<S> {
    pub async fn assemble<D>(
        config: RobotConfig,
        driver: &D,
        remote: Arc<dyn RemoteExec>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StartupError>
    where
        D: DocumentDriver<Session = S>,
    {
        let pool = Arc::new(SessionPool::open(driver, &config.database.dial_options()).await?);
        let catalog_ns = config.database.catalog_namespace();

        let probes = ProbeContext {
            remote,
            notifier,
            clock: clock.clone(),
            commands: Arc::new(config.commands.clone()),
            operators: config.notify.operators.clone().into(),
            ssh_port: config.remote.ssh_port,
        };

        let catalog = Arc::new(FleetCatalog::new(config.hosts.clone()));
        match catalog.refresh_from_store(&*pool, &catalog_ns).await {
            Ok(count) => info!(processes = count, namespace = %catalog_ns, "Process catalog loaded"),
            Err(e) => {
                error!(namespace = %catalog_ns, error = %e, "Failed to load process catalog");
                probes
                    .report(&format!("failed to load process catalog from {}: {}", catalog_ns, e))
                    .await;
            }
        }

        let health = Arc::new(FleetHealth::new(
            probes.clone(),
            catalog.clone(),
            pool.clone(),
            catalog_ns.clone(),
            config.health.clone(),
        ));
        let backup = Arc::new(BackupScheduler::new(
            probes.clone(),
            catalog.clone(),
            pool.clone(),
            catalog_ns,
            config.backup.clone(),
        ));
        let panics = Arc::new(PanicAggregator::new(
            clock,
            Duration::from_secs(config.panics.retention_secs),
        ));

        info!(
            hosts = catalog.snapshot().hosts().len(),
            backups = config.backup.enabled,
            "Robot assembled"
        );

        Ok(Self {
            config,
            probes,
            pool,
            catalog,
            health,
            backup,
            panics,
        })
    }

    pub fn config(&self) -> &RobotConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<SessionPool<S>> {
        &self.pool
    }

    pub fn catalog(&self) -> &Arc<FleetCatalog> {
        &self.catalog
    }

    pub fn health(&self) -> &Arc<FleetHealth<S>> {
        &self.health
    }

    pub fn backup(&self) -> &Arc<BackupScheduler<S>> {
        &self.backup
    }

    pub fn panics(&self) -> &Arc<PanicAggregator> {
        &self.panics
    }

    pub fn app_state(&self) -> AppState<S> {
        AppState {
            aggregator: self.panics.clone(),
            health: self.health.clone(),
            catalog: self.catalog.clone(),
        }
    }

    /// Arm every periodic task. Each handle finishes once `shutdown` fires.
    pub fn spawn_timers(&self, shutdown: &Shutdown) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        let health_cfg = &self.config.health;

        let interval = Duration::from_secs(health_cfg.resource_interval_secs);
        let health = self.health.clone();
        handles.push(tokio::spawn(run_self_rescheduling(
            Schedule::every("host_resources", interval),
            shutdown.subscribe(),
            move || {
                let health = health.clone();
                async move {
                    health.check_host_resources().await;
                    interval
                }
            },
        )));

        let interval = Duration::from_secs(health_cfg.liveness_interval_secs);
        let health = self.health.clone();
        handles.push(tokio::spawn(run_self_rescheduling(
            Schedule::every("process_liveness", interval),
            shutdown.subscribe(),
            move || {
                let health = health.clone();
                async move {
                    health.check_process_liveness().await;
                    interval
                }
            },
        )));

        let interval = Duration::from_secs(health_cfg.database_interval_secs);
        let health = self.health.clone();
        handles.push(tokio::spawn(run_self_rescheduling(
            Schedule::every("database_liveness", interval),
            shutdown.subscribe(),
            move || {
                let health = health.clone();
                async move {
                    health.check_database_liveness().await;
                    interval
                }
            },
        )));

        let interval = Duration::from_secs(self.config.panics.flush_interval_secs);
        let panics = self.panics.clone();
        let notifier = self.probes.notifier.clone();
        let operators = self.probes.operators.clone();
        handles.push(tokio::spawn(run_self_rescheduling(
            Schedule::every("panic_flush", interval),
            shutdown.subscribe(),
            move || {
                let panics = panics.clone();
                let notifier = notifier.clone();
                let operators = operators.clone();
                async move {
                    panics.flush(notifier.as_ref(), &operators).await;
                    interval
                }
            },
        )));

        let interval = Duration::from_secs(self.config.panics.retention_secs);
        let panics = self.panics.clone();
        handles.push(tokio::spawn(run_self_rescheduling(
            Schedule::every("panic_sweep", interval),
            shutdown.subscribe(),
            move || {
                let panics = panics.clone();
                async move {
                    panics.sweep();
                    interval
                }
            },
        )));

        if self.config.backup.enabled {
            let backup = self.backup.clone();
            handles.push(tokio::spawn(run_self_rescheduling(
                Schedule::every("full_backup", Duration::from_secs(3600))
                    .starting_after(Duration::ZERO),
                shutdown.subscribe(),
                move || {
                    let backup = backup.clone();
                    async move { backup.run_full_backup_cycle().await }
                },
            )));

            let interval = Duration::from_secs(self.config.backup.incremental_interval_secs);
            let backup = self.backup.clone();
            handles.push(tokio::spawn(run_self_rescheduling(
                Schedule::every("incremental_backup", interval).starting_after(Duration::ZERO),
                shutdown.subscribe(),
                move || {
                    let backup = backup.clone();
                    async move {
                        backup.run_incremental_backup().await;
                        interval
                    }
                },
            )));
        }

        info!(timers = handles.len(), "Periodic tasks armed");
        handles
    }

    /// Close the session pool. Timers must already have stopped.
    pub fn shutdown(&self) {
        self.pool.close();
        info!("Robot stopped");
    }
}
