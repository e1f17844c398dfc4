//! Scripted remote execution.
//!
//! Commands are answered by substring rules, most recently added first.
//! A rule can be limited to one host. Anything unmatched answers `yes`, so a
//! fleet with no rules looks healthy.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::fleet::HostDescriptor;
use crate::remote::{RemoteError, RemoteExec, RemoteSession};

/// One command run through a scripted session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedCommand {
    pub host: String,
    pub command: String,
}

#[derive(Debug, Clone)]
enum Reply {
    Output(String),
    Fail { status: i32, stderr: String },
}

#[derive(Debug, Clone)]
struct Rule {
    host: Option<String>,
    pattern: String,
    reply: Reply,
}

#[derive(Debug, Default)]
struct Script {
    rules: Vec<Rule>,
    unreachable: HashSet<String>,
    /// Remaining successful opens per host; absent means unlimited.
    open_budget: HashMap<String, usize>,
    opens: usize,
    executed: Vec<ExecutedCommand>,
}

impl Script {
    fn answer(&self, host: &str, command: &str) -> Reply {
        self.rules
            .iter()
            .rev()
            .find(|r| {
                r.host.as_deref().map_or(true, |h| h == host) && command.contains(&r.pattern)
            })
            .map(|r| r.reply.clone())
            .unwrap_or_else(|| Reply::Output("yes\n".to_string()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedRemote {
    script: Arc<Mutex<Script>>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, host: Option<&str>, pattern: &str, reply: Reply) -> &Self {
        self.script.lock().rules.push(Rule {
            host: host.map(str::to_string),
            pattern: pattern.to_string(),
            reply,
        });
        self
    }

    /// Commands containing `pattern` print `output` on every host.
    pub fn reply(&self, pattern: &str, output: &str) -> &Self {
        self.push(None, pattern, Reply::Output(output.to_string()))
    }

    pub fn reply_on(&self, host: &str, pattern: &str, output: &str) -> &Self {
        self.push(Some(host), pattern, Reply::Output(output.to_string()))
    }

    /// Commands containing `pattern` exit non-zero on every host.
    pub fn fail(&self, pattern: &str, stderr: &str) -> &Self {
        self.push(None, pattern, Reply::Fail { status: 1, stderr: stderr.to_string() })
    }

    pub fn fail_on(&self, host: &str, pattern: &str, stderr: &str) -> &Self {
        self.push(Some(host), pattern, Reply::Fail { status: 1, stderr: stderr.to_string() })
    }

    /// Every open on `host` fails to connect.
    pub fn unreachable(&self, host: &str) -> &Self {
        self.script.lock().unreachable.insert(host.to_string());
        self
    }

    /// Allow `opens` more sessions on `host`, then fail every open.
    pub fn fail_opens_after(&self, host: &str, opens: usize) -> &Self {
        self.script.lock().open_budget.insert(host.to_string(), opens);
        self
    }

    pub fn executed(&self) -> Vec<ExecutedCommand> {
        self.script.lock().executed.clone()
    }

    /// Commands run on `host`, in order.
    pub fn commands_on(&self, host: &str) -> Vec<String> {
        self.script
            .lock()
            .executed
            .iter()
            .filter(|e| e.host == host)
            .map(|e| e.command.clone())
            .collect()
    }

    /// Commands containing `needle`, on any host.
    pub fn ran(&self, needle: &str) -> Vec<ExecutedCommand> {
        self.script
            .lock()
            .executed
            .iter()
            .filter(|e| e.command.contains(needle))
            .cloned()
            .collect()
    }

    /// Sessions opened so far.
    pub fn open_count(&self) -> usize {
        self.script.lock().opens
    }
}

#[async_trait]
impl RemoteExec for ScriptedRemote {
    async fn open(
        &self,
        host: &HostDescriptor,
        _port: u16,
    ) -> Result<Box<dyn RemoteSession>, RemoteError> {
        let mut script = self.script.lock();
        if script.unreachable.contains(&host.name) {
            return Err(RemoteError::Connect {
                host: host.name.clone(),
                address: host.ssh_address().to_string(),
                reason: "scripted unreachable".to_string(),
            });
        }
        if let Some(remaining) = script.open_budget.get_mut(&host.name) {
            if *remaining == 0 {
                return Err(RemoteError::Session {
                    host: host.name.clone(),
                    reason: "scripted session failure".to_string(),
                });
            }
            *remaining -= 1;
        }
        script.opens += 1;
        Ok(Box::new(ScriptedSession {
            host: host.name.clone(),
            script: self.script.clone(),
        }))
    }
}

struct ScriptedSession {
    host: String,
    script: Arc<Mutex<Script>>,
}

#[async_trait]
impl RemoteSession for ScriptedSession {
    async fn run(&mut self, command: &str) -> Result<String, RemoteError> {
        let reply = {
            let mut script = self.script.lock();
            script.executed.push(ExecutedCommand {
                host: self.host.clone(),
                command: command.to_string(),
            });
            script.answer(&self.host, command)
        };
        match reply {
            Reply::Output(output) => Ok(output),
            Reply::Fail { status, stderr } => Err(RemoteError::Command { status, stderr }),
        }
    }

    async fn close(self: Box<Self>) {}
}
