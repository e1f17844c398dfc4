//! Per-host deduplicating store of crash reports.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::record::{PanicDigest, PanicRecord, PanicReport};
use crate::clock::Clock;
use crate::notify::Notifier;
use crate::observability::metrics;

/// Records of one host, keyed by log key.
///
/// Callers clone the bucket out of the map and drop the map guard before
/// locking it, so one host's lock never stalls another host's shard.
#[derive(Debug, Default)]
struct HostBucket {
    state: Mutex<BucketState>,
}

#[derive(Debug, Default)]
struct BucketState {
    records: HashMap<String, PanicRecord>,
    /// Unlinked from the map by a sweep; writers must fetch a new bucket.
    retired: bool,
}

/// What a sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub records: usize,
    pub hosts: usize,
}

pub struct PanicAggregator {
    buckets: DashMap<String, Arc<HostBucket>>,
    clock: Arc<dyn Clock>,
    retention: chrono::Duration,
}

impl PanicAggregator {
    pub fn new(clock: Arc<dyn Clock>, retention: Duration) -> Self {
        let retention = chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::days(36_500));
        Self {
            buckets: DashMap::new(),
            clock,
            retention,
        }
    }

    /// Count one occurrence of `report` in its host's bucket.
    pub fn record(&self, report: PanicReport) {
        let key = report.log_key();
        let now = self.clock.now();
        let host = report.host_id.clone();

        loop {
            let bucket = Arc::clone(self.buckets.entry(host.clone()).or_default().value());
            let mut state = bucket.state.lock();
            if state.retired {
                continue;
            }
            match state.records.entry(key) {
                Entry::Occupied(mut existing) => existing.get_mut().bump(now),
                Entry::Vacant(slot) => {
                    let key = slot.key().clone();
                    slot.insert(PanicRecord::first(key, report, now));
                }
            }
            break;
        }

        metrics::record_panic_report(&host);
    }

    /// Merge records by log key across hosts, sorted by key.
    ///
    /// `auto` reports since-last-flush counts, skips zeros and resets them.
    /// Otherwise lifetime counts are reported and nothing changes.
    pub fn build_digest(&self, auto: bool) -> Vec<PanicDigest> {
        let mut merged: BTreeMap<String, PanicDigest> = BTreeMap::new();
        for (_, bucket) in self.bucket_list() {
            let mut state = bucket.state.lock();
            for record in state.records.values_mut() {
                let count = if auto { record.pending } else { record.total };
                if count == 0 {
                    continue;
                }
                merged
                    .entry(record.log_key.clone())
                    .or_insert_with(|| PanicDigest::from_record(record))
                    .per_host
                    .insert(record.host_id.clone(), count);
                if auto {
                    record.pending = 0;
                }
            }
        }
        merged.into_values().collect()
    }

    /// Send every pending digest. Returns how many were sent.
    pub async fn flush(&self, notifier: &dyn Notifier, mentions: &[String]) -> usize {
        let digests = self.build_digest(true);
        for digest in &digests {
            notifier.notify(&digest.to_string(), mentions).await;
        }
        if !digests.is_empty() {
            info!(digests = digests.len(), "panic digests flushed");
        }
        digests.len()
    }

    /// Drop records idle for at least the retention window, then empty buckets.
    pub fn sweep(&self) -> SweepStats {
        let now = self.clock.now();
        let mut stats = SweepStats::default();
        let mut emptied = Vec::new();

        for (host, bucket) in self.bucket_list() {
            let mut state = bucket.state.lock();
            let before = state.records.len();
            state.records.retain(|_, r| now - r.last_update < self.retention);
            stats.records += before - state.records.len();
            if state.records.is_empty() {
                emptied.push(host);
            }
        }

        for host in emptied {
            // A report may have landed since the scan; only drop still-empty buckets.
            let removed = self.buckets.remove_if(&host, |_, bucket| {
                let mut state = bucket.state.lock();
                if state.records.is_empty() {
                    state.retired = true;
                }
                state.retired
            });
            if removed.is_some() {
                stats.hosts += 1;
            }
        }

        metrics::record_panic_records(self.record_count());
        debug!(records = stats.records, hosts = stats.hosts, "panic records swept");
        stats
    }

    pub fn host_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn record_count(&self) -> usize {
        self.bucket_list()
            .iter()
            .map(|(_, bucket)| bucket.state.lock().records.len())
            .sum()
    }

    /// Every bucket, cloned out so no map guard outlives the call.
    fn bucket_list(&self) -> Vec<(String, Arc<HostBucket>)> {
        self.buckets
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::ManualClock;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn report(host: &str, short: &str, line: &str) -> PanicReport {
        PanicReport {
            host_id: host.into(),
            short: short.into(),
            line: line.into(),
            content: short.into(),
        }
    }

    fn aggregator() -> (Arc<ManualClock>, PanicAggregator) {
        let clock = Arc::new(ManualClock::default());
        let agg = PanicAggregator::new(clock.clone(), Duration::from_secs(86_400));
        (clock, agg)
    }

    #[test]
    fn test_record_dedups_per_host() {
        let (_, agg) = aggregator();
        agg.record(report("S1", "nil map", "a.go:1"));
        agg.record(report("S1", "nil map", "a.go:1"));
        agg.record(report("S1", "nil map", "a.go:2"));
        agg.record(report("S2", "nil map", "a.go:1"));
        assert_eq!(agg.host_count(), 2);
        assert_eq!(agg.record_count(), 3);
    }

    #[test]
    fn test_manual_digest_is_read_only() {
        let (_, agg) = aggregator();
        agg.record(report("S1", "boom", "b.go:9"));
        let first = agg.build_digest(false);
        let second = agg.build_digest(false);
        assert_eq!(first, second);
        assert_eq!(first[0].per_host["S1"], 1);
        // The pending count survives manual digests.
        assert_eq!(agg.build_digest(true).len(), 1);
    }

    #[test]
    fn test_auto_digest_resets_pending() {
        let (_, agg) = aggregator();
        agg.record(report("S1", "boom", "b.go:9"));
        assert_eq!(agg.build_digest(true).len(), 1);
        assert!(agg.build_digest(true).is_empty());

        // Lifetime count is kept for manual digests.
        agg.record(report("S1", "boom", "b.go:9"));
        assert_eq!(agg.build_digest(false)[0].per_host["S1"], 2);
        assert_eq!(agg.build_digest(true)[0].per_host["S1"], 1);
    }

    #[test]
    fn test_digest_sorted_by_key() {
        let (_, agg) = aggregator();
        agg.record(report("S1", "zeta", "1"));
        agg.record(report("S2", "alpha", "1"));
        let keys: Vec<_> = agg.build_digest(false).into_iter().map(|d| d.log_key).collect();
        assert_eq!(keys, vec!["alpha1", "zeta1"]);
    }

    #[test]
    fn test_concurrent_reports_and_digests_lose_nothing() {
        let (_, agg) = aggregator();
        let digested = AtomicU64::new(0);
        let sum = |digests: Vec<PanicDigest>| -> u64 {
            digests.iter().map(PanicDigest::occurrences).sum()
        };

        std::thread::scope(|scope| {
            let writers: Vec<_> = (0..16)
                .map(|h| {
                    let agg = &agg;
                    scope.spawn(move || {
                        let host = format!("S{}", h);
                        for i in 0..1000 {
                            agg.record(report(&host, "boom", &format!("x.go:{}", i % 7)));
                        }
                    })
                })
                .collect();
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..200 {
                        digested.fetch_add(sum(agg.build_digest(true)), Ordering::Relaxed);
                    }
                });
            }
            for writer in writers {
                writer.join().unwrap();
            }
        });

        let total = digested.into_inner() + sum(agg.build_digest(true));
        assert_eq!(total, 16_000);
        assert_eq!(agg.host_count(), 16);
        assert_eq!(agg.record_count(), 16 * 7);
    }

    #[test]
    fn test_report_after_sweep_lands_in_new_bucket() {
        let (clock, agg) = aggregator();
        agg.record(report("S1", "old", "1"));
        clock.advance(chrono::Duration::days(2));
        assert_eq!(agg.sweep(), SweepStats { records: 1, hosts: 1 });

        agg.record(report("S1", "old", "1"));
        assert_eq!(agg.host_count(), 1);
        assert_eq!(agg.build_digest(false)[0].per_host["S1"], 1);
    }

    #[test]
    fn test_sweep_uses_retention_boundary() {
        let (clock, agg) = aggregator();
        agg.record(report("S1", "old", "1"));
        clock.advance(chrono::Duration::hours(12));
        agg.record(report("S2", "new", "1"));

        clock.advance(chrono::Duration::hours(12));
        let stats = agg.sweep();
        assert_eq!(stats, SweepStats { records: 1, hosts: 1 });
        assert_eq!(agg.host_count(), 1);

        clock.advance(chrono::Duration::hours(11));
        assert_eq!(agg.sweep(), SweepStats::default());
    }
}
