//! Shell command templates.
//!
//! Templates use `{name}` placeholders. Liveness and path checks must print
//! `yes` or `no` as their last line.

use serde::{Deserialize, Serialize};

/// Substitute `{key}` placeholders in `template`.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{}}}", key), value);
    }
    out
}

/// The `[commands]` configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Placeholders: `{id}`.
    pub process_check: String,
    /// Placeholders: `{id}`, `{timestamp}`.
    pub process_restart: String,
    /// Placeholders: `{service}`.
    pub service_check: String,
    /// Placeholders: `{service}`, `{timestamp}`.
    pub service_restart: String,
    /// Placeholders: `{dir}`.
    pub service_stop: String,
    /// Placeholders: `{dir}`.
    pub service_start: String,
    pub database_check: String,
    /// Placeholders: `{path}`.
    pub database_restart: String,
    pub memory_probe: String,
    pub cpu_probe: String,
    pub disk_probe: String,
    /// Placeholders: `{path}`.
    pub path_exists: String,
    /// Placeholders: `{script_dir}`, `{script}`, `{ip}`, `{port}`, `{account}`,
    /// `{password}`, `{database}`.
    pub full_backup: String,
    /// Same as `full_backup` without `{database}`.
    pub incremental_backup: String,
    /// Same as `incremental_backup`; prints `true` on the primary.
    pub replica_role: String,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            process_check: "ps -ef|grep 'GameServer {id}'|grep -v grep && echo yes || echo no".into(),
            process_restart: "cd /data/gamesvr;mkdir -p backuplog;cp output_{id} backuplog/output_{id}_{timestamp};setsid ./start.sh {id} >/dev/null 2>&1 &".into(),
            service_check: "ps -ef|grep '{service}'|grep -v grep && echo yes || echo no".into(),
            service_restart: "cd /data/{service};mkdir -p backuplog;cp output backuplog/output_{timestamp};setsid ./start.sh >/dev/null 2>&1 &".into(),
            service_stop: "cd /data/{dir};chmod +x stop.sh;./stop.sh".into(),
            service_start: "cd /data/{dir};chmod +x start.sh;setsid ./start.sh >/dev/null 2>&1 &".into(),
            database_check: "ps -ef|grep mongod|grep -v grep && echo yes || echo no".into(),
            database_restart: "cd {path};setsid ./start.sh >/dev/null 2>&1 &".into(),
            memory_probe: "free".into(),
            cpu_probe: "top -b -n 3 -d 1|grep Cpu".into(),
            disk_probe: "df -h".into(),
            path_exists: "[ -d {path} ] && echo yes || echo no".into(),
            full_backup: "cd {script_dir};chmod +x {script};./{script} {ip} {port} {account} '{password}' {database}".into(),
            incremental_backup: "cd {script_dir};chmod +x {script};./{script} {ip} {port} {account} '{password}'".into(),
            replica_role: "cd {script_dir};chmod +x {script};./{script} {ip} {port} {account} '{password}'".into(),
        }
    }
}

/// Database login plus the script to run against it.
#[derive(Debug, Clone, Copy)]
pub struct ScriptInvocation<'a> {
    pub script_dir: &'a str,
    pub script: &'a str,
    pub ip: &'a str,
    pub port: &'a str,
    pub account: &'a str,
    pub password: &'a str,
}

impl ScriptInvocation<'_> {
    fn vars(&self) -> [(&str, &str); 6] {
        [
            ("script_dir", self.script_dir),
            ("script", self.script),
            ("ip", self.ip),
            ("port", self.port),
            ("account", self.account),
            ("password", self.password),
        ]
    }
}

impl CommandConfig {
    pub fn process_check(&self, id: &str) -> String {
        render(&self.process_check, &[("id", id)])
    }

    pub fn process_restart(&self, id: &str, timestamp: &str) -> String {
        render(&self.process_restart, &[("id", id), ("timestamp", timestamp)])
    }

    pub fn service_check(&self, service: &str) -> String {
        render(&self.service_check, &[("service", service)])
    }

    pub fn service_restart(&self, service: &str, timestamp: &str) -> String {
        render(&self.service_restart, &[("service", service), ("timestamp", timestamp)])
    }

    pub fn service_stop(&self, dir: &str) -> String {
        render(&self.service_stop, &[("dir", dir)])
    }

    pub fn service_start(&self, dir: &str) -> String {
        render(&self.service_start, &[("dir", dir)])
    }

    pub fn database_restart(&self, path: &str) -> String {
        render(&self.database_restart, &[("path", path)])
    }

    pub fn path_exists(&self, path: &str) -> String {
        render(&self.path_exists, &[("path", path)])
    }

    pub fn full_backup(&self, script: &ScriptInvocation<'_>, database: &str) -> String {
        let mut vars = script.vars().to_vec();
        vars.push(("database", database));
        render(&self.full_backup, &vars)
    }

    pub fn incremental_backup(&self, script: &ScriptInvocation<'_>) -> String {
        render(&self.incremental_backup, &script.vars())
    }

    pub fn replica_role(&self, script: &ScriptInvocation<'_>) -> String {
        render(&self.replica_role, &script.vars())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_replaces_every_occurrence() {
        let out = render("cp output_{id} backuplog/output_{id}_{ts}", &[("id", "42"), ("ts", "20240501")]);
        assert_eq!(out, "cp output_42 backuplog/output_42_20240501");
    }

    #[test]
    fn test_unknown_placeholders_are_left_alone() {
        assert_eq!(render("echo {missing}", &[("id", "1")]), "echo {missing}");
    }

    #[test]
    fn test_default_templates() {
        let commands = CommandConfig::default();
        assert_eq!(
            commands.process_check("1001"),
            "ps -ef|grep 'GameServer 1001'|grep -v grep && echo yes || echo no"
        );
        assert!(commands
            .process_restart("1001", "20240501-120000")
            .contains("backuplog/output_1001_20240501-120000"));

        let script = ScriptInvocation {
            script_dir: "/data/backup",
            script: "all.sh",
            ip: "10.0.0.9",
            port: "27017",
            account: "root",
            password: "pw",
        };
        assert_eq!(
            commands.full_backup(&script, "game_1"),
            "cd /data/backup;chmod +x all.sh;./all.sh 10.0.0.9 27017 root 'pw' game_1"
        );
    }
}
