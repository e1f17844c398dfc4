//! Shared harness for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::net::TcpListener;

use fleet_robot::config::RobotConfig;
use fleet_robot::fleet::{HostDescriptor, ProcessDescriptor};
use fleet_robot::lifecycle::{Robot, Shutdown};
use fleet_robot::store::{MemoryDriver, MemorySession};
use fleet_robot::testkit::{ManualClock, RecordingNotifier, ScriptedRemote};

pub use fleet_robot::testkit::fleet::{db_host, fresh_process, host, process, removal};

pub const OPERATOR: &str = "13800000000";

/// A robot wired to scripted collaborators.
pub struct Harness {
    pub robot: Robot<MemorySession>,
    pub driver: MemoryDriver,
    pub remote: ScriptedRemote,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn now(&self) -> DateTime<Utc> {
        use fleet_robot::clock::Clock;
        self.clock.now()
    }
}

/// Config with short names for the hub and web hosts and backups set up.
pub fn base_config(hosts: Vec<HostDescriptor>) -> RobotConfig {
    let mut config = RobotConfig::default();
    config.hosts = hosts;
    config.notify.operators = vec![OPERATOR.to_string()];
    config.health.hub_host = "hub".to_string();
    config.health.web_host = "web".to_string();
    config.backup.full_backup_dir = "/backup/full/".to_string();
    config.backup.script_dir = "/opt/backup".to_string();
    config.backup.full_script = "full.sh".to_string();
    config.backup.incremental_script = "incr.sh".to_string();
    config.backup.replica_role_script = "role.sh".to_string();
    config.backup.database_gap_secs = 1;
    config
}

pub async fn harness(config: RobotConfig, processes: Vec<ProcessDescriptor>) -> Harness {
    let documents: Vec<Value> = processes
        .iter()
        .map(|p| serde_json::to_value(p).unwrap())
        .collect();
    let driver = MemoryDriver::new().with_documents(config.database.catalog_namespace(), documents);
    let remote = ScriptedRemote::new();
    let notifier = Arc::new(RecordingNotifier::new());
    let clock = Arc::new(ManualClock::default());

    let robot = Robot::assemble(
        config,
        &driver,
        Arc::new(remote.clone()),
        notifier.clone(),
        clock.clone(),
    )
    .await
    .unwrap();

    Harness {
        robot,
        driver,
        remote,
        notifier,
        clock,
    }
}

/// Serve the robot's triggers on an ephemeral port.
pub async fn start_triggers(robot: &Robot<MemorySession>, shutdown: &Shutdown) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = fleet_robot::http::router(robot.app_state());
    tokio::spawn(fleet_robot::http::serve(listener, app, shutdown.subscribe()));
    addr
}
