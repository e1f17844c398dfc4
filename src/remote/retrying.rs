//! Retrying remote executor.

use async_trait::async_trait;

use super::{RemoteError, RemoteExec, RemoteSession, SshTarget};
use crate::fleet::model::HostDescriptor;
use crate::resilience::{retry_with_backoff, RetryPolicy};

/// Low-level connection and session setup.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Client: Send + Sync;
    type Session: RemoteSession + 'static;

    async fn connect(&self, target: &SshTarget) -> Result<Self::Client, RemoteError>;

    async fn open_session(&self, client: &Self::Client) -> Result<Self::Session, RemoteError>;
}

/// [`RemoteExec`] that retries connect and session setup separately.
#[derive(Debug)]
pub struct RetryingExec<T> {
    transport: T,
    connect: RetryPolicy,
    session: RetryPolicy,
}

impl<T: Transport> RetryingExec<T> {
    pub fn new(transport: T, connect: RetryPolicy, session: RetryPolicy) -> Self {
        Self {
            transport,
            connect,
            session,
        }
    }
}

#[async_trait]
impl<T: Transport> RemoteExec for RetryingExec<T> {
    async fn open(
        &self,
        host: &HostDescriptor,
        port: u16,
    ) -> Result<Box<dyn RemoteSession>, RemoteError> {
        let target = SshTarget::for_host(host, port);
        let client = retry_with_backoff(&self.connect, "remote connect", || {
            self.transport.connect(&target)
        })
        .await?;
        let session = retry_with_backoff(&self.session, "remote session", || {
            self.transport.open_session(&client)
        })
        .await?;
        Ok(Box::new(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::model::SshCredentials;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyTransport {
        connect_failures: u32,
        session_failures: u32,
        connects: AtomicU32,
        sessions: AtomicU32,
    }

    struct EchoSession;

    #[async_trait]
    impl RemoteSession for EchoSession {
        async fn run(&mut self, command: &str) -> Result<String, RemoteError> {
            Ok(command.to_string())
        }

        async fn close(self: Box<Self>) {}
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        type Client = ();
        type Session = EchoSession;

        async fn connect(&self, target: &SshTarget) -> Result<(), RemoteError> {
            if self.connects.fetch_add(1, Ordering::SeqCst) < self.connect_failures {
                return Err(RemoteError::Connect {
                    host: target.host.clone(),
                    address: target.address.clone(),
                    reason: "refused".into(),
                });
            }
            Ok(())
        }

        async fn open_session(&self, _client: &()) -> Result<EchoSession, RemoteError> {
            if self.sessions.fetch_add(1, Ordering::SeqCst) < self.session_failures {
                return Err(RemoteError::Session {
                    host: "h".into(),
                    reason: "channel refused".into(),
                });
            }
            Ok(EchoSession)
        }
    }

    fn host() -> HostDescriptor {
        HostDescriptor {
            name: "game-1".into(),
            external_ip: String::new(),
            inner_ip: "10.0.0.5".into(),
            ssh: SshCredentials { user: "ops".into(), password: String::new() },
            database: None,
            is_primary: false,
        }
    }

    fn exec(connect_failures: u32, session_failures: u32) -> RetryingExec<FlakyTransport> {
        RetryingExec::new(
            FlakyTransport {
                connect_failures,
                session_failures,
                connects: AtomicU32::new(0),
                sessions: AtomicU32::new(0),
            },
            RetryPolicy::new(3, 10, 50),
            RetryPolicy::new(3, 10, 50),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_within_attempts() {
        let exec = exec(2, 2);
        let mut session = exec.open(&host(), 22).await.unwrap();
        assert_eq!(session.run("uptime").await.unwrap(), "uptime");
        assert_eq!(exec.transport.connects.load(Ordering::SeqCst), 3);
        assert_eq!(exec.transport.sessions.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_three_connects() {
        let exec = exec(3, 0);
        let result = exec.open(&host(), 22).await;
        assert!(matches!(result, Err(RemoteError::Connect { .. })));
        assert_eq!(exec.transport.connects.load(Ordering::SeqCst), 3);
        assert_eq!(exec.transport.sessions.load(Ordering::SeqCst), 0);
    }
}
