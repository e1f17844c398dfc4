//! Crash report ingestion, digests and retention.

mod common;

use std::time::Duration;

use serde_json::{json, Value};

use common::*;
use fleet_robot::lifecycle::Shutdown;
use fleet_robot::panics::PanicReport;

fn report(host: &str) -> Value {
    json!({
        "ServerID": host,
        "Short": "runtime error: index out of range",
        "Line": "battle.go:218",
        "Content": "runtime error: index out of range",
    })
}

#[tokio::test]
async fn test_reports_from_two_servers_merge_into_one_digest() {
    let h = harness(base_config(Vec::new()), Vec::new()).await;
    let shutdown = Shutdown::new();
    let addr = start_triggers(&h.robot, &shutdown).await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/panic", addr);

    for host in ["S1", "S1", "S1", "S2", "S2"] {
        let res = client.post(&url).json(&report(host)).send().await.unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::ACCEPTED);
    }

    let digest: Value = client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(digest.as_array().unwrap().len(), 1);
    assert_eq!(digest[0]["log_key"], "runtime error: index out of rangebattle.go:218");
    assert_eq!(digest[0]["per_host"], json!({ "S1": 3, "S2": 2 }));

    // The manual digest left the pending counts alone.
    let sent = h.robot.panics().flush(&*h.notifier, &[OPERATOR.to_string()]).await;
    assert_eq!(sent, 1);
    let messages = h.notifier.messages();
    assert!(messages[0].ends_with("servers: S1x3, S2x2"));

    assert_eq!(h.robot.panics().flush(&*h.notifier, &[]).await, 0);
    assert_eq!(h.notifier.messages().len(), 1);

    // Lifetime counts are still available on demand.
    let digest: Value = client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(digest[0]["per_host"], json!({ "S1": 3, "S2": 2 }));

    shutdown.trigger();
}

#[tokio::test]
async fn test_malformed_reports_are_rejected() {
    let h = harness(base_config(Vec::new()), Vec::new()).await;
    let shutdown = Shutdown::new();
    let addr = start_triggers(&h.robot, &shutdown).await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/panic", addr);

    let res = client.post(&url).json(&report("")).send().await.unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::BAD_REQUEST);
    assert!(res.text().await.unwrap().contains("ServerID"));

    let res = client
        .post(&url)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::BAD_REQUEST);

    let res = client.post(&url).json(&json!({ "ServerID": "S1" })).send().await.unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::BAD_REQUEST);

    assert_eq!(h.robot.panics().record_count(), 0);
    shutdown.trigger();
}

#[tokio::test]
async fn test_stale_records_are_swept() {
    let h = harness(base_config(Vec::new()), Vec::new()).await;
    let panics = h.robot.panics();
    let crash = |host: &str, line: &str| PanicReport {
        host_id: host.to_string(),
        short: "nil map".to_string(),
        line: line.to_string(),
        content: "nil map".to_string(),
    };

    panics.record(crash("S1", "a.go:1"));
    h.clock.advance(chrono::Duration::hours(20));
    panics.record(crash("S2", "a.go:1"));
    panics.record(crash("S2", "a.go:2"));

    h.clock.advance(chrono::Duration::hours(4));
    let stats = panics.sweep();
    assert_eq!(stats.records, 1);
    assert_eq!(stats.hosts, 1);
    assert_eq!(panics.host_count(), 1);
    assert_eq!(panics.record_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_flush_timer_delivers_pending_digests() {
    let mut config = base_config(Vec::new());
    config.backup.enabled = false;
    config.panics.flush_interval_secs = 300;
    let h = harness(config, Vec::new()).await;

    let shutdown = Shutdown::new();
    let timers = h.robot.spawn_timers(&shutdown);
    assert_eq!(timers.len(), 5);

    h.robot.panics().record(serde_json::from_value(report("S1")).unwrap());
    tokio::time::sleep(Duration::from_secs(301)).await;

    let notes = h.notifier.notifications();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].message.contains("battle.go:218"));
    assert_eq!(notes[0].mentions, vec![OPERATOR.to_string()]);

    shutdown.trigger();
    for timer in timers {
        timer.await.unwrap();
    }
}
