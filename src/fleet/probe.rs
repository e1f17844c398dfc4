//! Probe execution and output parsing.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::clock::Clock;
use crate::fleet::model::HostDescriptor;
use crate::notify::Notifier;
use crate::remote::{CommandConfig, RemoteError, RemoteExec};

/// Everything a probe task needs, cheap to clone into spawned tasks.
#[derive(Clone)]
pub struct ProbeContext {
    pub remote: Arc<dyn RemoteExec>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub commands: Arc<CommandConfig>,
    pub operators: Arc<[String]>,
    pub ssh_port: u16,
}

impl ProbeContext {
    /// Open a session, run one command, close the session.
    pub async fn run_once(&self, host: &HostDescriptor, command: &str) -> Result<String, RemoteError> {
        let mut session = self.remote.open(host, self.ssh_port).await?;
        let result = session.run(command).await;
        session.close().await;
        if let Err(e) = &result {
            debug!(host = %host.name, command, error = %e, "remote command failed");
        }
        result
    }

    /// Notify the configured operators.
    pub async fn report(&self, message: &str) {
        self.notifier.notify(message, &self.operators).await;
    }

    /// Timestamp used in backup file names.
    pub fn timestamp(&self) -> String {
        self.clock.now().format("%Y%m%d-%H%M%S").to_string()
    }
}

/// Last non-empty line is exactly `yes`.
pub fn answered_yes(output: &str) -> bool {
    output
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        == Some("yes")
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryUsage {
    pub total_kb: u64,
    pub used_kb: u64,
    pub used_percent: f64,
}

/// Parse the `Mem:` line of `free`.
///
/// Columns are located through the header line. Used memory is
/// `total - available` when the header names an `available` column, otherwise
/// the `used` column. Older procps prints `buffers cached` where newer builds
/// print `buff/cache available`, so headerless output always reads `used`.
pub fn parse_memory(output: &str) -> Option<MemoryUsage> {
    let mut header: Vec<&str> = Vec::new();
    let mut mem_line = None;
    for line in output.lines() {
        match line.split_whitespace().next() {
            Some("Mem:") => {
                mem_line = Some(line);
                break;
            }
            Some("total") => header = line.split_whitespace().collect(),
            _ => {}
        }
    }
    let columns: Vec<u64> = mem_line?
        .split_whitespace()
        .skip(1)
        .map(|c| c.parse().ok())
        .collect::<Option<Vec<u64>>>()?;

    let column = |name: &str| header.iter().position(|h| *h == name);
    let total = *columns.get(column("total").unwrap_or(0))?;
    if total == 0 {
        return None;
    }
    let used = match column("available") {
        Some(i) => total.saturating_sub(*columns.get(i)?),
        None => *columns.get(column("used").unwrap_or(1))?,
    };

    Some(MemoryUsage {
        total_kb: total,
        used_kb: used,
        used_percent: used as f64 * 100.0 / total as f64,
    })
}

/// Average `us + sy` over every `Cpu` sample line of `top -b`.
pub fn parse_cpu(output: &str) -> Option<f64> {
    let mut total = 0.0;
    let mut samples = 0u32;
    for line in output.lines().filter(|l| l.contains("Cpu")) {
        let Some((_, fields)) = line.split_once(':') else {
            continue;
        };
        let mut busy = None::<f64>;
        for field in fields.split(',') {
            let mut parts = field.split_whitespace();
            let (Some(value), Some(label)) = (parts.next(), parts.next()) else {
                continue;
            };
            if label == "us" || label == "sy" {
                if let Ok(v) = value.parse::<f64>() {
                    busy = Some(busy.unwrap_or(0.0) + v);
                }
            }
        }
        if let Some(busy) = busy {
            total += busy;
            samples += 1;
        }
    }
    (samples > 0).then(|| total / samples as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskUsage {
    pub filesystem: String,
    pub size: String,
    pub mount: String,
    pub used_percent: f64,
}

fn is_large_volume(size: &str) -> bool {
    let Some(unit) = size.chars().last() else {
        return false;
    };
    let number = &size[..size.len() - unit.len_utf8()];
    match unit {
        'G' => number.parse::<f64>().map(|g| g >= 10.0).unwrap_or(false),
        'T' | 'P' => true,
        _ => false,
    }
}

/// Volumes of at least 10G from `df -h`.
pub fn parse_disks(output: &str) -> Vec<DiskUsage> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            if columns.len() < 6 || !is_large_volume(columns[1]) {
                return None;
            }
            let used_percent = columns[4].trim_end_matches('%').parse::<f64>().ok()?;
            Some(DiskUsage {
                filesystem: columns[0].to_string(),
                size: columns[1].to_string(),
                mount: columns[5..].join(" "),
                used_percent,
            })
        })
        .collect()
}
