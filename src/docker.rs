use std::path::Path;

use tracing::debug;

use crate::cmd::CommandRunner;
use crate::error::DeployResult;

const DOCKER: &str = "docker";

/// Typed access to the `docker compose` and `docker network`
/// subcommands the orchestrator relies on.
#[derive(Clone, Copy)]
pub struct Docker<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> Docker<'a> {
    #[must_use]
    pub const fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// `docker compose up -d`, optionally forcing an image pull.
    pub fn compose_up(&self, dir: &Path, pull: bool) -> DeployResult<()> {
        let mut args = vec!["compose", "up", "-d"];
        if pull {
            args.extend(["--pull", "always"]);
        }
        self.runner.run_interactive(DOCKER, &args, Some(dir))
    }

    pub fn compose_down(&self, dir: &Path) -> DeployResult<()> {
        self.runner
            .run_interactive(DOCKER, &["compose", "down"], Some(dir))
    }

    pub fn compose_pull(&self, dir: &Path) -> DeployResult<()> {
        self.runner
            .run_interactive(DOCKER, &["compose", "pull"], Some(dir))
    }

    /// Run a one-off command in a fresh container of `service`,
    /// removed afterwards.
    pub fn compose_run(&self, dir: &Path, service: &str, command: &[String]) -> DeployResult<()> {
        let mut args = vec!["compose", "run", "-T", "--rm", service];
        args.extend(command.iter().map(String::as_str));
        self.runner.run_interactive(DOCKER, &args, Some(dir))
    }

    /// Pass arbitrary arguments through to `docker compose`.
    pub fn compose(&self, dir: &Path, args: &[String]) -> DeployResult<()> {
        let mut full = vec!["compose"];
        full.extend(args.iter().map(String::as_str));
        self.runner.run_interactive(DOCKER, &full, Some(dir))
    }

    /// The fully resolved model of the compose project at `dir`, as
    /// printed by `docker compose config --format json`. `env` is
    /// added to the environment used for interpolation.
    pub fn compose_config(&self, dir: &Path, env: &[(&str, &str)]) -> DeployResult<String> {
        let args = ["compose", "config", "--format", "json"];
        let output = self
            .runner
            .capture_with_env(DOCKER, &args, Some(dir), env)?
            .check(DOCKER, &args)?;
        Ok(output.stdout)
    }

    /// Names of the services currently running in the compose
    /// project at `dir`. A failing query counts as nothing running.
    pub fn running_services(&self, dir: &Path) -> DeployResult<Vec<String>> {
        let output = self.runner.capture(
            DOCKER,
            &["compose", "ps", "--services", "--filter", "status=running"],
            Some(dir),
        )?;
        if !output.success() {
            debug!(code = ?output.code, stderr = %output.stderr.trim(), "compose ps failed");
        }
        Ok(non_empty_lines(&output.stdout))
    }

    /// Names of all networks known to the runtime.
    pub fn networks(&self) -> DeployResult<Vec<String>> {
        let output = self
            .runner
            .capture(DOCKER, &["network", "ls", "--format", "{{.Name}}"], None)?;
        if !output.success() {
            debug!(code = ?output.code, stderr = %output.stderr.trim(), "network ls failed");
        }
        Ok(non_empty_lines(&output.stdout))
    }

    pub fn create_network(&self, name: &str) -> DeployResult<()> {
        self.runner
            .run_interactive(DOCKER, &["network", "create", name], None)
    }
}

fn non_empty_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(ToString::to_string)
        .collect()
}
