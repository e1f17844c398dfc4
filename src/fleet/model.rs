//! Host and process descriptors.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// SSH login for a host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshCredentials {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl SshCredentials {
    /// Both fields empty; used by host updates to mean "remove".
    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.password.is_empty()
    }
}

/// Database installed on a host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseEndpoint {
    /// Install directory holding the start script.
    pub path: String,
    /// `ip:port` of the database server.
    pub address: String,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub password: String,
}

impl DatabaseEndpoint {
    /// Address split into host and port; port defaults to 27017.
    pub fn host_port(&self) -> (&str, &str) {
        match self.address.rsplit_once(':') {
            Some((host, port)) if !port.is_empty() => (host, port),
            _ => (self.address.as_str(), "27017"),
        }
    }
}

/// A physical machine in the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDescriptor {
    pub name: String,
    #[serde(default)]
    pub external_ip: String,
    pub inner_ip: String,
    #[serde(default)]
    pub ssh: SshCredentials,
    #[serde(default)]
    pub database: Option<DatabaseEndpoint>,
    #[serde(default)]
    pub is_primary: bool,
}

impl HostDescriptor {
    /// Address used for SSH: the external address when known.
    pub fn ssh_address(&self) -> &str {
        if self.external_ip.is_empty() {
            &self.inner_ip
        } else {
            &self.external_ip
        }
    }
}

/// `ServerType` of a process record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum ProcessKind {
    #[default]
    Normal,
    /// Still being provisioned; never liveness-checked.
    FreshlyProvisioned,
    Other(i32),
}

impl From<i32> for ProcessKind {
    fn from(code: i32) -> Self {
        match code {
            1 => ProcessKind::Normal,
            5 => ProcessKind::FreshlyProvisioned,
            other => ProcessKind::Other(other),
        }
    }
}

impl From<ProcessKind> for i32 {
    fn from(kind: ProcessKind) -> Self {
        match kind {
            ProcessKind::Normal => 1,
            ProcessKind::FreshlyProvisioned => 5,
            ProcessKind::Other(code) => code,
        }
    }
}

/// A game/service process as recorded in the catalog collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDescriptor {
    #[serde(rename = "ServerID")]
    pub id: String,
    #[serde(rename = "ServerName", default)]
    pub name: String,
    #[serde(rename = "InnerIP", default)]
    pub inner_ip: String,
    #[serde(rename = "DBName", default)]
    pub db_name: String,
    #[serde(rename = "StartTime")]
    pub start_time: DateTime<Utc>,
    #[serde(rename = "ServerType", default)]
    pub kind: ProcessKind,
}

impl ProcessDescriptor {
    /// Not yet subject to liveness checks at `now`.
    pub fn liveness_exempt(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        self.kind == ProcessKind::FreshlyProvisioned || now < self.start_time + grace
    }

    /// Label used in logs and notifications.
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            format!("process {}", self.id)
        } else {
            format!("process {}|{}", self.id, self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn process(kind: i32, start: DateTime<Utc>) -> ProcessDescriptor {
        serde_json::from_value(json!({
            "ServerID": "1001",
            "ServerName": "S1",
            "InnerIP": "10.0.0.5",
            "DBName": "game_1001",
            "StartTime": start,
            "ServerType": kind,
        }))
        .unwrap()
    }

    #[test]
    fn test_kind_codes() {
        assert_eq!(ProcessKind::from(1), ProcessKind::Normal);
        assert_eq!(ProcessKind::from(5), ProcessKind::FreshlyProvisioned);
        assert_eq!(ProcessKind::from(3), ProcessKind::Other(3));
        assert_eq!(i32::from(ProcessKind::Other(3)), 3);
    }

    #[test]
    fn test_exemptions() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let grace = Duration::seconds(60);

        let fresh = process(5, start - Duration::days(30));
        assert!(fresh.liveness_exempt(start, grace));

        let booting = process(1, start);
        assert!(booting.liveness_exempt(start + Duration::seconds(59), grace));
        assert!(!booting.liveness_exempt(start + Duration::seconds(60), grace));
    }

    #[test]
    fn test_missing_server_type_is_normal() {
        let p: ProcessDescriptor = serde_json::from_value(json!({
            "ServerID": "7",
            "StartTime": "2024-01-01T00:00:00Z",
        }))
        .unwrap();
        assert_eq!(p.kind, ProcessKind::Normal);
        assert_eq!(p.label(), "process 7");
    }

    #[test]
    fn test_database_host_port() {
        let db = DatabaseEndpoint {
            path: "/data/mongo".into(),
            address: "10.0.0.9:27018".into(),
            ..Default::default()
        };
        assert_eq!(db.host_port(), ("10.0.0.9", "27018"));

        let bare = DatabaseEndpoint { address: "10.0.0.9".into(), ..Default::default() };
        assert_eq!(bare.host_port(), ("10.0.0.9", "27017"));
    }
}
