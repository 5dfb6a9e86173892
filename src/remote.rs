//! Client side of a deployment: ship a prepared compose document to
//! a server over SSH and run `master-builder deploy` there.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::info;
use url::{Host, Url};

use crate::cmd::CommandRunner;
use crate::deploy::{DeployRequest, validate_compose, validate_project_name};
use crate::error::{DeployError, DeployResult};
use crate::report;

const SSH: &str = "ssh";

/// Program invoked on the server unless told otherwise.
pub const DEFAULT_REMOTE_COMMAND: &str = "master-builder";

/// Where to connect, parsed from `ssh://[user@]host[:port]`.
///
/// Defaults to `root` on `localhost`, port 22. Passwords are
/// refused: `ssh` cannot take one non-interactively, so
/// authentication goes through keys or an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
}

impl FromStr for SshTarget {
    type Err = DeployError;

    fn from_str(s: &str) -> DeployResult<Self> {
        let url = Url::parse(s).map_err(|e| DeployError::InvalidSshUrl(e.to_string()))?;

        if url.scheme() != SSH {
            return Err(DeployError::InvalidSshUrl(
                "the protocol must be ssh://".into(),
            ));
        }
        if url.password().is_some() {
            return Err(DeployError::InvalidSshUrl(
                "passwords are not supported, use a key or an SSH agent".into(),
            ));
        }
        if !matches!(url.path(), "" | "/") {
            return Err(DeployError::InvalidSshUrl(
                "a path must not be specified".into(),
            ));
        }

        let host = match url.host() {
            Some(Host::Domain(d)) if !d.is_empty() => d.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => "localhost".to_string(),
        };
        let user = match url.username() {
            "" => "root".to_string(),
            user => user.to_string(),
        };

        Ok(Self {
            host,
            port: url.port().unwrap_or(22),
            user,
        })
    }
}

impl fmt::Display for SshTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

/// Runs commands on a server through the system `ssh` client.
pub struct SshSession<'a> {
    runner: &'a dyn CommandRunner,
    target: SshTarget,
    key: Option<PathBuf>,
}

impl<'a> SshSession<'a> {
    #[must_use]
    pub const fn new(runner: &'a dyn CommandRunner, target: SshTarget) -> Self {
        Self {
            runner,
            target,
            key: None,
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<PathBuf>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub const fn target(&self) -> &SshTarget {
        &self.target
    }

    /// Run `command` on the server with `input` on its stdin.
    pub fn exec_with_stdin(&self, command: &str, input: &[u8]) -> DeployResult<()> {
        let args = self.build_ssh_args(command);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.runner.run_with_stdin(SSH, &refs, None, input)
    }

    /// Deploy `request` with `remote_command` on the server. Fails
    /// when the remote deploy exits non-zero.
    pub fn deploy(&self, remote_command: &str, request: &DeployRequest) -> DeployResult<()> {
        validate_compose(&request.compose)?;
        let command = deploy_command(remote_command, request)?;

        report::action(&format!("Deploying {} to {}", request.project, self.target));
        info!(project = %request.project, target = %self.target, "remote deploy started");
        self.exec_with_stdin(&command, request.compose.as_bytes())
    }

    fn build_ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            "ConnectTimeout=10".to_string(),
            "-p".to_string(),
            self.target.port.to_string(),
        ];
        if let Some(key) = &self.key {
            args.push("-i".to_string());
            args.push(key.to_string_lossy().into_owned());
        }
        args.push(format!("{}@{}", self.target.user, self.target.host));
        args.push(command.to_string());
        args
    }
}

/// The command line the server runs for `request`. Every argument
/// is shell-quoted; `remote_command` is used as written so it may
/// carry a path or a `sudo` prefix.
pub fn deploy_command(remote_command: &str, request: &DeployRequest) -> DeployResult<String> {
    validate_project_name(&request.project)?;
    if remote_command.trim().is_empty() {
        return Err(DeployError::InvalidConfiguration(
            "the remote command must not be empty".into(),
        ));
    }

    let mut args = vec!["deploy".to_string(), request.project.clone()];
    for hook in &request.before {
        args.extend(["--before".to_string(), hook.to_string()]);
    }
    for hook in &request.after {
        args.extend(["--after".to_string(), hook.to_string()]);
    }
    if !request.pull {
        args.push("--no-pull".to_string());
    }

    let quoted = shlex::try_join(args.iter().map(String::as_str))
        .map_err(|_| DeployError::InvalidHookFormat(args.join(" ")))?;
    Ok(format!("{} {quoted}", remote_command.trim()))
}
