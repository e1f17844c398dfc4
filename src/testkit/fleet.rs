//! Builders for fleet descriptors used across tests.

use chrono::{DateTime, Utc};

use crate::fleet::{DatabaseEndpoint, HostDescriptor, ProcessDescriptor, ProcessKind, SshCredentials};

/// A host with SSH credentials `ops`/`pw` and no database.
pub fn host(name: &str, inner_ip: &str) -> HostDescriptor {
    HostDescriptor {
        name: name.to_string(),
        external_ip: String::new(),
        inner_ip: inner_ip.to_string(),
        ssh: SshCredentials {
            user: "ops".to_string(),
            password: "pw".to_string(),
        },
        database: None,
        is_primary: false,
    }
}

/// A host carrying a database endpoint on port 27017.
pub fn db_host(name: &str, inner_ip: &str, primary: bool) -> HostDescriptor {
    HostDescriptor {
        database: Some(DatabaseEndpoint {
            path: format!("/data/mongo/{}", name),
            address: format!("{}:27017", inner_ip),
            account: "root".to_string(),
            password: "secret".to_string(),
        }),
        is_primary: primary,
        ..host(name, inner_ip)
    }
}

/// A host update that removes `name` from the catalog.
pub fn removal(name: &str) -> HostDescriptor {
    HostDescriptor {
        ssh: SshCredentials::default(),
        ..host(name, "")
    }
}

pub fn process(id: &str, inner_ip: &str, started: DateTime<Utc>) -> ProcessDescriptor {
    ProcessDescriptor {
        id: id.to_string(),
        name: format!("S{}", id),
        inner_ip: inner_ip.to_string(),
        db_name: format!("game_{}", id),
        start_time: started,
        kind: ProcessKind::Normal,
    }
}

pub fn fresh_process(id: &str, inner_ip: &str, started: DateTime<Utc>) -> ProcessDescriptor {
    ProcessDescriptor {
        kind: ProcessKind::FreshlyProvisioned,
        ..process(id, inner_ip, started)
    }
}
