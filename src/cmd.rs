use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{DeployError, DeployResult};

/// Result of a captured command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Turn a non-zero exit into [`DeployError::CommandFailed`].
    pub fn check(self, program: &str, args: &[&str]) -> DeployResult<Self> {
        if self.success() {
            Ok(self)
        } else {
            debug!(code = ?self.code, stderr = %self.stderr.trim(), "command failed");
            Err(DeployError::CommandFailed {
                command: format_command(program, args),
                code: self.code,
            })
        }
    }
}

/// Executes external programs on behalf of the orchestrator.
///
/// Everything that talks to the container runtime or to a remote
/// host goes through this trait so it can be swapped for a fake in
/// tests.
pub trait CommandRunner {
    /// Run a command with extra environment variables and capture
    /// its output. The exit code is returned to the caller, not
    /// checked.
    fn capture_with_env(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
        env: &[(&str, &str)],
    ) -> DeployResult<CommandOutput>;

    /// Run a command with stdin/stdout/stderr inherited. Fails if
    /// the command returns a non-zero exit code.
    fn run_interactive(&self, program: &str, args: &[&str], cwd: Option<&Path>) -> DeployResult<()>;

    /// Run a command that reads `input` on stdin, with
    /// stdout/stderr inherited. Fails on a non-zero exit code.
    fn run_with_stdin(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
        input: &[u8],
    ) -> DeployResult<()>;

    /// [`capture_with_env`](Self::capture_with_env) without extra
    /// variables.
    fn capture(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
    ) -> DeployResult<CommandOutput> {
        self.capture_with_env(program, args, cwd, &[])
    }
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemRunner {
    fn capture_with_env(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
        env: &[(&str, &str)],
    ) -> DeployResult<CommandOutput> {
        debug!(command = %format_command(program, args), ?cwd, "capturing command");

        let output = command(program, args, cwd)
            .envs(env.iter().copied())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| spawn_error(program, e))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn run_interactive(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
    ) -> DeployResult<()> {
        let rendered = format_command(program, args);
        eprintln!("--> Running: {rendered}");
        debug!(command = %rendered, ?cwd, "running command");

        let status = command(program, args, cwd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| spawn_error(program, e))?;

        if status.success() {
            Ok(())
        } else {
            Err(DeployError::CommandFailed {
                command: rendered,
                code: status.code(),
            })
        }
    }

    fn run_with_stdin(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
        input: &[u8],
    ) -> DeployResult<()> {
        let rendered = format_command(program, args);
        eprintln!("--> Running: {rendered}");
        debug!(command = %rendered, ?cwd, bytes = input.len(), "piping stdin to command");

        let mut child = command(program, args, cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| spawn_error(program, e))?;

        if let Some(stdin) = &mut child.stdin {
            stdin.write_all(input)?;
        }
        drop(child.stdin.take());

        let status = child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(DeployError::CommandFailed {
                command: rendered,
                code: status.code(),
            })
        }
    }
}

fn command(program: &str, args: &[&str], cwd: Option<&Path>) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    cmd
}

fn spawn_error(program: &str, e: std::io::Error) -> DeployError {
    if e.kind() == std::io::ErrorKind::NotFound {
        DeployError::CommandNotFound(program.to_string())
    } else {
        DeployError::Io(e)
    }
}

/// Render a command line for display, shell-quoting where needed.
#[must_use]
pub fn format_command(program: &str, args: &[&str]) -> String {
    let mut parts = vec![program];
    parts.extend_from_slice(args);
    shlex::try_join(parts.iter().copied()).unwrap_or_else(|_| parts.join(" "))
}
