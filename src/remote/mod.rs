//! Remote command execution on fleet hosts.
//!
//! # Data Flow
//! ```text
//! probe / remediation / backup
//!     → RemoteExec::open(host, port)
//!         → retrying.rs: Transport::connect (≤ connect_attempts)
//!         → retrying.rs: Transport::open_session (≤ session_attempts)
//!     → RemoteSession::run(command) → stdout
//!     → RemoteSession::close()
//! ```
//!
//! # Design Decisions
//! - One short-lived session per probe or remediation step
//! - Command text is rendered from configurable templates (commands.rs)
//! - The transport is a trait; ssh.rs drives the system `ssh` client

pub mod commands;
pub mod retrying;
pub mod ssh;

use async_trait::async_trait;
use thiserror::Error;

use crate::fleet::model::HostDescriptor;

pub use commands::CommandConfig;
pub use retrying::RetryingExec;
pub use ssh::OpenSshTransport;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("cannot connect to {host} ({address}): {reason}")]
    Connect {
        host: String,
        address: String,
        reason: String,
    },

    #[error("cannot open a session on {host}: {reason}")]
    Session { host: String, reason: String },

    #[error("command exited with status {status}: {stderr}")]
    Command { status: i32, stderr: String },

    #[error("failed to spawn remote command: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Where and as whom to log in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub address: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl SshTarget {
    pub fn for_host(host: &HostDescriptor, port: u16) -> Self {
        Self {
            host: host.name.clone(),
            address: host.ssh_address().to_string(),
            port,
            user: host.ssh.user.clone(),
            password: host.ssh.password.clone(),
        }
    }
}

/// An open session on one host.
#[async_trait]
pub trait RemoteSession: Send {
    /// Run `command` and return its standard output.
    async fn run(&mut self, command: &str) -> Result<String, RemoteError>;

    async fn close(self: Box<Self>);
}

/// Opens sessions on fleet hosts.
#[async_trait]
pub trait RemoteExec: Send + Sync {
    async fn open(
        &self,
        host: &HostDescriptor,
        port: u16,
    ) -> Result<Box<dyn RemoteSession>, RemoteError>;
}
