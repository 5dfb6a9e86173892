//! Shared helpers for integration tests: a fake command runner that
//! records every invocation and simulates networks and running
//! services.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use master_builder::cmd::{CommandOutput, CommandRunner, format_command};
use master_builder::error::{DeployError, DeployResult};
use master_builder::{Layout, PersistedConfig};
use tempfile::TempDir;

/// One recorded invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Call {
    pub command: String,
    pub cwd: Option<PathBuf>,
    pub interactive: bool,
    pub env: Vec<(String, String)>,
    pub stdin: Option<String>,
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    networks: Vec<String>,
    running: BTreeMap<PathBuf, Vec<String>>,
    failures: Vec<String>,
    outputs: Vec<(String, String)>,
}

/// Stands in for the `docker` and `ssh` binaries.
///
/// `compose up` marks the services of the compose file in the
/// working directory as running, `compose down` stops them, and
/// `network create` adds to the network list.
#[derive(Default)]
pub struct FakeRunner {
    state: RefCell<State>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_network(self, name: &str) -> Self {
        self.state.borrow_mut().networks.push(name.to_string());
        self
    }

    /// Make every command whose rendered form contains `pattern`
    /// exit with status 1.
    pub fn fail_on(&self, pattern: &str) {
        self.state.borrow_mut().failures.push(pattern.to_string());
    }

    /// Answer captured commands containing `pattern` with `stdout`.
    #[must_use]
    pub fn with_output(self, pattern: &str, stdout: &str) -> Self {
        self.state
            .borrow_mut()
            .outputs
            .push((pattern.to_string(), stdout.to_string()));
        self
    }

    pub fn clear_failures(&self) {
        self.state.borrow_mut().failures.clear();
    }

    /// Pretend the services of the compose project in `dir` are
    /// running.
    pub fn set_running(&self, dir: &Path, services: &[&str]) {
        self.state.borrow_mut().running.insert(
            dir.to_path_buf(),
            services.iter().map(ToString::to_string).collect(),
        );
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    /// Rendered commands that changed something (interactive runs).
    pub fn actions(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.interactive)
            .map(|c| c.command)
            .collect()
    }

    pub fn count(&self, command: &str) -> usize {
        self.calls().iter().filter(|c| c.command == command).count()
    }

    pub fn networks(&self) -> Vec<String> {
        self.state.borrow().networks.clone()
    }

    pub fn is_running(&self, dir: &Path) -> bool {
        self.state
            .borrow()
            .running
            .get(dir)
            .is_some_and(|s| !s.is_empty())
    }

    fn record(&self, program: &str, args: &[&str], cwd: Option<&Path>, call: Call) -> bool {
        let command = format_command(program, args);
        let mut state = self.state.borrow_mut();
        let failed = state.failures.iter().any(|p| command.contains(p.as_str()));
        state.calls.push(Call {
            command,
            cwd: cwd.map(Path::to_path_buf),
            ..call
        });
        failed
    }

    fn apply(&self, args: &[&str], cwd: Option<&Path>) {
        let mut state = self.state.borrow_mut();
        match args {
            ["network", "create", name] => state.networks.push((*name).to_string()),
            ["compose", "up", ..] => {
                if let Some(dir) = cwd {
                    state.running.insert(dir.to_path_buf(), compose_services(dir));
                }
            }
            ["compose", "down"] => {
                if let Some(dir) = cwd {
                    state.running.remove(dir);
                }
            }
            _ => {}
        }
    }
}

impl CommandRunner for FakeRunner {
    fn capture_with_env(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
        env: &[(&str, &str)],
    ) -> DeployResult<CommandOutput> {
        let call = Call {
            env: env
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            ..Call::default()
        };
        if self.record(program, args, cwd, call) {
            return Ok(CommandOutput {
                code: Some(1),
                stdout: String::new(),
                stderr: "simulated failure".into(),
            });
        }

        let state = self.state.borrow();
        let command = format_command(program, args);
        let scripted = state
            .outputs
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()));
        let stdout = match (scripted, args) {
            (Some((_, stdout)), _) => stdout.clone(),
            (None, ["network", "ls", ..]) => state.networks.join("\n"),
            (None, ["compose", "ps", ..]) => cwd
                .and_then(|dir| state.running.get(dir))
                .map(|services| services.join("\n"))
                .unwrap_or_default(),
            _ => String::new(),
        };

        Ok(CommandOutput {
            code: Some(0),
            stdout: format!("{stdout}\n"),
            stderr: String::new(),
        })
    }

    fn run_interactive(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
    ) -> DeployResult<()> {
        let call = Call {
            interactive: true,
            ..Call::default()
        };
        if self.record(program, args, cwd, call) {
            return Err(failure(program, args));
        }
        self.apply(args, cwd);
        Ok(())
    }

    fn run_with_stdin(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
        input: &[u8],
    ) -> DeployResult<()> {
        let call = Call {
            interactive: true,
            stdin: Some(String::from_utf8_lossy(input).into_owned()),
            ..Call::default()
        };
        if self.record(program, args, cwd, call) {
            return Err(failure(program, args));
        }
        Ok(())
    }
}

fn failure(program: &str, args: &[&str]) -> DeployError {
    DeployError::CommandFailed {
        command: format_command(program, args),
        code: Some(1),
    }
}

fn compose_services(dir: &Path) -> Vec<String> {
    let Ok(text) = fs::read_to_string(dir.join("docker-compose.yml")) else {
        return Vec::new();
    };
    let Ok(value) = serde_yaml::from_str::<serde_yaml::Value>(&text) else {
        return Vec::new();
    };
    value
        .get("services")
        .and_then(serde_yaml::Value::as_mapping)
        .map(|services| {
            services
                .keys()
                .filter_map(serde_yaml::Value::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Fresh home directory, removed when the guard drops.
pub fn home() -> (TempDir, Layout) {
    let tmp = tempfile::tempdir().expect("temp dir");
    let layout = Layout::new(tmp.path().join("mb"));
    (tmp, layout)
}

pub fn http_config() -> PersistedConfig {
    PersistedConfig {
        init_done: true,
        ..PersistedConfig::default()
    }
}

pub fn acme_config(contact: &str) -> PersistedConfig {
    PersistedConfig {
        init_done: true,
        enable_https: true,
        ssl_contact: contact.to_string(),
        ..PersistedConfig::default()
    }
}

pub fn static_config(cert: &str, key: &str) -> PersistedConfig {
    PersistedConfig {
        init_done: true,
        enable_https: true,
        ssl_cert: cert.to_string(),
        ssl_key: key.to_string(),
        ..PersistedConfig::default()
    }
}

/// Directory names directly under `dir`.
pub fn subdirs(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read dir")
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
