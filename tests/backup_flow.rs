//! Full and incremental backups against a scripted replica set.

mod common;

use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};

use common::*;
use fleet_robot::fleet::{FullBackupOutcome, IncrementalOutcome};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn catalog() -> Vec<fleet_robot::fleet::ProcessDescriptor> {
    let started = Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap();
    vec![process("1001", "10.0.0.3", started), process("1002", "10.0.0.3", started)]
}

fn replica_set() -> Vec<fleet_robot::fleet::HostDescriptor> {
    vec![db_host("db-a", "10.0.1.1", false), db_host("db-b", "10.0.1.2", false)]
}

#[tokio::test(start_paused = true)]
async fn test_full_backup_runs_on_secondary() {
    let mut config = base_config(replica_set());
    config.backup.extra_databases = vec!["Center".to_string()];
    let h = harness(config, catalog()).await;
    h.remote.reply_on("db-a", "role.sh", "true\n").reply("[ -d", "no\n");

    let outcome = h.robot.backup().run_full_backup(today()).await;
    assert_eq!(outcome, FullBackupOutcome::Completed { databases: 3 });

    assert!(h.robot.catalog().snapshot().host("db-a").unwrap().is_primary);
    let check = h.remote.ran("[ -d /backup/full/20240101 ]");
    assert_eq!(check.len(), 1);
    assert_eq!(check[0].host, "db-b");

    let dumps: Vec<String> = h.remote.ran("full.sh").into_iter().map(|e| e.command).collect();
    assert_eq!(
        dumps,
        vec![
            "cd /opt/backup;chmod +x full.sh;./full.sh 10.0.1.2 27017 root 'secret' game_1001",
            "cd /opt/backup;chmod +x full.sh;./full.sh 10.0.1.2 27017 root 'secret' game_1002",
            "cd /opt/backup;chmod +x full.sh;./full.sh 10.0.1.2 27017 root 'secret' Center",
        ]
    );
    assert!(h.remote.commands_on("db-a").iter().all(|c| !c.contains("full.sh")));

    let messages = h.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].ends_with("full database backup finished"));
}

#[tokio::test(start_paused = true)]
async fn test_progress_is_reported_in_batches() {
    let mut config = base_config(replica_set());
    config.backup.report_batch = 2;
    config.backup.extra_databases = vec!["Center".to_string()];
    let h = harness(config, catalog()).await;
    h.remote
        .reply_on("db-a", "role.sh", "true\n")
        .reply("[ -d", "no\n")
        .reply("full.sh", "dumped\n");

    h.robot.backup().run_full_backup(today()).await;
    let messages = h.notifier.messages();
    assert_eq!(messages, vec!["dumped\ndumped\n", "dumped\nfull database backup finished"]);
}

#[tokio::test]
async fn test_existing_backup_directory_skips_the_day() {
    let h = harness(base_config(replica_set()), catalog()).await;
    h.remote.reply_on("db-a", "role.sh", "true\n");

    let outcome = h.robot.backup().run_full_backup(today()).await;
    assert_eq!(
        outcome,
        FullBackupOutcome::AlreadyDone {
            directory: "/backup/full/20240101".to_string()
        }
    );
    assert!(h.remote.ran("full.sh").is_empty());
    assert!(h.notifier.messages().is_empty());
}

#[tokio::test]
async fn test_single_database_host_is_reported_as_fallback() {
    let h = harness(base_config(vec![db_host("db-a", "10.0.1.1", true)]), catalog()).await;
    h.remote.reply_on("db-a", "role.sh", "true\n");

    let source = h.robot.backup().select_backup_source().await.unwrap();
    assert_eq!(source.name, "db-a");
    assert_eq!(
        h.notifier.messages(),
        vec!["only one database host is configured; backing up from db-a (10.0.1.1)"]
    );
}

#[tokio::test]
async fn test_missing_script_is_reported() {
    let mut config = base_config(replica_set());
    config.backup.full_script = String::new();
    let h = harness(config, catalog()).await;

    let outcome = h.robot.backup().run_full_backup(today()).await;
    assert_eq!(outcome, FullBackupOutcome::Misconfigured("full backup script"));
    assert!(h.remote.executed().is_empty());
    assert_eq!(h.notifier.matching("not configured").len(), 1);
}

#[tokio::test]
async fn test_incremental_backup_reports_only_failures() {
    let h = harness(base_config(replica_set()), catalog()).await;
    h.robot.catalog().set_primary("db-a", true);

    assert_eq!(h.robot.backup().run_incremental_backup().await, IncrementalOutcome::Clean);
    let runs = h.remote.ran("incr.sh");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].host, "db-b");
    assert!(h.notifier.messages().is_empty());

    h.remote.reply("incr.sh", "Fatal Error: oplog rolled over\n");
    let outcome = h.robot.backup().run_incremental_backup().await;
    assert!(matches!(outcome, IncrementalOutcome::Failed(_)));
    assert_eq!(h.notifier.matching("incremental backup on db-b reported errors").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_full_backup_cycle_schedules_next_day() {
    let h = harness(base_config(replica_set()), catalog()).await;
    let delay = h.robot.backup().run_full_backup_cycle().await;
    assert!(delay > Duration::ZERO);
    assert!(delay <= Duration::from_secs(48 * 3600));
}
