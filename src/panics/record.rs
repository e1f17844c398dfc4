//! Crash report, per-host record and digest types.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Markers that identify a multi-line stack trace.
const STACK_MARKERS: [&str; 2] = ["stack start", "stack end"];

/// A crash/error report as posted by a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanicReport {
    #[serde(rename = "ServerID")]
    pub host_id: String,
    #[serde(rename = "Short", default)]
    pub short: String,
    #[serde(rename = "Line", default)]
    pub line: String,
    #[serde(rename = "Content", default)]
    pub content: String,
}

impl PanicReport {
    /// Deduplication key: `short + line` for single-line errors, the whole
    /// content for stack traces.
    pub fn log_key(&self) -> String {
        if STACK_MARKERS.iter().any(|m| self.content.contains(m)) {
            self.content.clone()
        } else {
            format!("{}{}", self.short, self.line)
        }
    }
}

/// One deduplicated error on one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanicRecord {
    pub log_key: String,
    pub host_id: String,
    pub short: String,
    pub line: String,
    pub content: String,
    /// Occurrences since the last automatic flush.
    pub pending: u64,
    pub total: u64,
    pub last_update: DateTime<Utc>,
}

impl PanicRecord {
    pub(crate) fn first(log_key: String, report: PanicReport, now: DateTime<Utc>) -> Self {
        Self {
            log_key,
            host_id: report.host_id,
            short: report.short,
            line: report.line,
            content: report.content,
            pending: 1,
            total: 1,
            last_update: now,
        }
    }

    pub(crate) fn bump(&mut self, now: DateTime<Utc>) {
        self.pending += 1;
        self.total += 1;
        self.last_update = now;
    }
}

/// One log key merged across hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanicDigest {
    pub log_key: String,
    pub short: String,
    pub line: String,
    pub content: String,
    pub per_host: BTreeMap<String, u64>,
}

impl PanicDigest {
    pub(crate) fn from_record(record: &PanicRecord) -> Self {
        Self {
            log_key: record.log_key.clone(),
            short: record.short.clone(),
            line: record.line.clone(),
            content: record.content.clone(),
            per_host: BTreeMap::new(),
        }
    }

    pub fn occurrences(&self) -> u64 {
        self.per_host.values().sum()
    }
}

impl fmt::Display for PanicDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.short, self.line)?;
        if self.content != self.short {
            writeln!(f, "{}", self.content)?;
        }
        let hosts: Vec<String> = self
            .per_host
            .iter()
            .map(|(host, count)| format!("{}x{}", host, count))
            .collect();
        write!(f, "servers: {}", hosts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(short: &str, line: &str, content: &str) -> PanicReport {
        PanicReport {
            host_id: "S1".into(),
            short: short.into(),
            line: line.into(),
            content: content.into(),
        }
    }

    #[test]
    fn test_single_line_key() {
        assert_eq!(report("nil map", "main.go:42", "nil map write").log_key(), "nil mapmain.go:42");
    }

    #[test]
    fn test_stack_trace_key_is_content() {
        let trace = "stack start\ngoroutine 1\nstack end";
        assert_eq!(report("nil map", "main.go:42", trace).log_key(), trace);
        let half = "goroutine 1\nstack end";
        assert_eq!(report("x", "1", half).log_key(), half);
    }

    #[test]
    fn test_line_distinguishes_keys() {
        assert_ne!(
            report("nil map", "main.go:42", "").log_key(),
            report("nil map", "main.go:43", "").log_key()
        );
    }

    #[test]
    fn test_wire_field_names() {
        let parsed: PanicReport = serde_json::from_str(
            r#"{"ServerID":"S9","Short":"oops","Line":"a.go:1","Content":"oops"}"#,
        )
        .unwrap();
        assert_eq!(parsed.host_id, "S9");
        assert_eq!(parsed.line, "a.go:1");
    }
}
