//! Transport backed by the system OpenSSH client.
//!
//! `connect` only verifies that the SSH port accepts TCP connections; every
//! `run` spawns one `ssh` invocation. Password logins go through `sshpass -e`
//! so the secret is passed in the environment, not on the command line.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::retrying::Transport;
use super::{RemoteError, RemoteSession, SshTarget};

#[derive(Debug, Clone)]
pub struct OpenSshTransport {
    ssh_binary: String,
    connect_timeout: Duration,
}

impl OpenSshTransport {
    pub fn new(ssh_binary: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            ssh_binary: ssh_binary.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl Transport for OpenSshTransport {
    type Client = SshTarget;
    type Session = SshCliSession;

    async fn connect(&self, target: &SshTarget) -> Result<SshTarget, RemoteError> {
        let address = format!("{}:{}", target.address, target.port);
        match timeout(self.connect_timeout, TcpStream::connect(&address)).await {
            Ok(Ok(_stream)) => Ok(target.clone()),
            Ok(Err(e)) => Err(RemoteError::Connect {
                host: target.host.clone(),
                address,
                reason: e.to_string(),
            }),
            Err(_) => Err(RemoteError::Connect {
                host: target.host.clone(),
                address,
                reason: format!("timed out after {:?}", self.connect_timeout),
            }),
        }
    }

    async fn open_session(&self, client: &SshTarget) -> Result<SshCliSession, RemoteError> {
        if client.user.is_empty() {
            return Err(RemoteError::Session {
                host: client.host.clone(),
                reason: "no ssh user configured".into(),
            });
        }
        Ok(SshCliSession {
            target: client.clone(),
            ssh_binary: self.ssh_binary.clone(),
            connect_timeout: self.connect_timeout,
        })
    }
}

#[derive(Debug)]
pub struct SshCliSession {
    target: SshTarget,
    ssh_binary: String,
    connect_timeout: Duration,
}

impl SshCliSession {
    fn command(&self, remote_command: &str) -> Command {
        let mut cmd = if self.target.password.is_empty() {
            let mut cmd = Command::new(&self.ssh_binary);
            cmd.arg("-o").arg("BatchMode=yes");
            cmd
        } else {
            let mut cmd = Command::new("sshpass");
            cmd.arg("-e")
                .env("SSHPASS", &self.target.password)
                .arg(&self.ssh_binary);
            cmd
        };
        cmd.arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)))
            .arg("-p")
            .arg(self.target.port.to_string())
            .arg(format!("{}@{}", self.target.user, self.target.address))
            .arg(remote_command)
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl RemoteSession for SshCliSession {
    async fn run(&mut self, command: &str) -> Result<String, RemoteError> {
        debug!(host = %self.target.host, command, "running remote command");
        let output = self.command(command).output().await?;
        if !output.status.success() {
            return Err(RemoteError::Command {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn close(self: Box<Self>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(password: &str) -> SshTarget {
        SshTarget {
            host: "game-1".into(),
            address: "127.0.0.1".into(),
            port: 1,
            user: "ops".into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn test_closed_port_is_connect_error() {
        let transport = OpenSshTransport::new("ssh", Duration::from_millis(500));
        let result = transport.connect(&target("")).await;
        assert!(matches!(result, Err(RemoteError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_missing_user_refuses_session() {
        let transport = OpenSshTransport::new("ssh", Duration::from_secs(1));
        let mut anonymous = target("");
        anonymous.user.clear();
        assert!(matches!(
            transport.open_session(&anonymous).await,
            Err(RemoteError::Session { .. })
        ));
    }

    #[test]
    fn test_password_login_uses_sshpass() {
        let session = SshCliSession {
            target: target("secret"),
            ssh_binary: "ssh".into(),
            connect_timeout: Duration::from_secs(5),
        };
        let cmd = session.command("uptime");
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "sshpass");
        let args: Vec<_> = std_cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert!(!args.iter().any(|a| a.contains("secret")));
        assert_eq!(args.last().map(String::as_str), Some("uptime"));
        assert!(args.contains(&"ops@127.0.0.1".to_string()));
    }
}
