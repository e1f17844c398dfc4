//! Fleet operations robot
//!
//! # Architecture Overview
//!
//! ```text
//!  ┌───────────────────────────────────────────────────────────────────┐
//!  │                          FLEET ROBOT                              │
//!  │                                                                   │
//!  │  lifecycle::timer (self-rescheduling)       http (triggers)       │
//!  │   ├─ host resources ─┐                       ├─ POST /panic ──┐   │
//!  │   ├─ process liveness├─▶ fleet::health        ├─ /maintenance  │   │
//!  │   ├─ database liveness┘      │                ├─ /hosts, /restart  │
//!  │   ├─ full backup ────┐       │                └────────────────┼─┐ │
//!  │   ├─ incr. backup ───┴─▶ fleet::backup                         │ │ │
//!  │   ├─ panic flush ────┐       │                                 │ │ │
//!  │   └─ panic sweep ────┴─▶ panics::aggregator ◀──────────────────┘ │ │
//!  │                              │                                   │ │
//!  │   remote (ssh) ◀─────────────┤         fleet::catalog ◀──────────┘ │
//!  │   notify (webhook) ◀─────────┘               │                     │
//!  │                                  store (session pool, indexed heap)│
//!  └───────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use fleet_robot::clock::SystemClock;
use fleet_robot::config::{load_config, ConfigWatcher, RobotConfig};
use fleet_robot::lifecycle::{wait_for_shutdown, Robot, Shutdown};
use fleet_robot::notify::{LogNotifier, Notifier, WebhookNotifier};
use fleet_robot::observability::{logging, metrics};
use fleet_robot::remote::{OpenSshTransport, RemoteExec, RetryingExec};
use fleet_robot::store::{is_mongo_address, DocumentDriver, MemoryDriver, MongoDriver};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "fleet-robot", about = "Fleet health, crash report and backup robot")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => RobotConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!("fleet-robot v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let notifier: Arc<dyn Notifier> = match &config.notify.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(
            url,
            Duration::from_secs(config.notify.timeout_secs),
        )?),
        None => {
            tracing::warn!("No webhook configured, notifications go to the log");
            Arc::new(LogNotifier)
        }
    };

    let remote: Arc<dyn RemoteExec> = Arc::new(RetryingExec::new(
        OpenSshTransport::new(
            config.remote.ssh_binary.clone(),
            Duration::from_secs(config.remote.connect_timeout_secs),
        ),
        config.remote.connect_policy(),
        config.remote.session_policy(),
    ));

    if is_mongo_address(&config.database.address) {
        tracing::info!("Catalog served by MongoDB");
        return run(args, config, &MongoDriver::new(), remote, notifier).await;
    }

    // Static catalog: processes come from the configuration file.
    let seed = config
        .processes
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?;
    let members: Vec<String> = config
        .hosts
        .iter()
        .filter_map(|h| h.database.as_ref().map(|d| d.address.clone()))
        .collect();
    let driver = MemoryDriver::new()
        .with_documents(config.database.catalog_namespace(), seed)
        .with_members(members);
    tracing::info!(processes = config.processes.len(), "Catalog served from the configuration file");
    run(args, config, &driver, remote, notifier).await
}

async fn run<D: DocumentDriver>(
    args: Args,
    config: RobotConfig,
    driver: &D,
    remote: Arc<dyn RemoteExec>,
    notifier: Arc<dyn Notifier>,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for triggers");

    let robot = Robot::assemble(config, driver, remote, notifier, Arc::new(SystemClock)).await?;
    let shutdown = Shutdown::new();
    let timers = robot.spawn_timers(&shutdown);

    // Keep the watcher alive for the life of the process.
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let catalog = robot.catalog().clone();
            tokio::spawn(async move {
                while let Some(updated) = updates.recv().await {
                    catalog.reload_hosts(updated.hosts);
                }
            });
            match watcher.run() {
                Ok(w) => Some(w),
                Err(e) => {
                    tracing::error!(error = %e, "Config watcher failed to start, host list is static");
                    None
                }
            }
        }
        None => None,
    };

    let app = fleet_robot::http::router(robot.app_state());
    let server = tokio::spawn(fleet_robot::http::serve(listener, app, shutdown.subscribe()));

    wait_for_shutdown().await;
    shutdown.trigger();

    // A run in progress finishes unless it outlives the grace period.
    let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
    for timer in timers {
        let abort = timer.abort_handle();
        match tokio::time::timeout_at(deadline, timer).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "timer task failed"),
            Err(_) => {
                tracing::warn!("timer still running at shutdown deadline, aborting");
                abort.abort();
            }
        }
    }
    match server.await {
        Ok(Err(e)) => tracing::error!(error = %e, "HTTP listener failed"),
        Err(e) => tracing::error!(error = %e, "HTTP listener task failed"),
        Ok(Ok(())) => {}
    }

    robot.shutdown();
    tracing::info!("Shutdown complete");
    Ok(())
}
