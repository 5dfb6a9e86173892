pub mod lock;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{Layout, PersistedConfig};
use crate::docker::Docker;
use crate::error::{DeployError, DeployResult};
use crate::hook::Hook;
use crate::ingress::Ingress;
use crate::report;

pub use lock::ProjectLock;

/// File name of the compose definition inside a deployment.
pub const COMPOSE_FILE: &str = "docker-compose.yml";

/// A new version of a project to bring up.
///
/// # Example
///
/// ```
/// use master_builder::deploy::DeployRequest;
///
/// let request = DeployRequest::new("app", "services: {}\n")
///     .before(["web:./manage.py migrate".parse().unwrap()])
///     .pull(false);
///
/// assert_eq!(request.project, "app");
/// assert_eq!(request.before.len(), 1);
/// assert!(!request.pull);
/// ```
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub project: String,
    pub compose: String,
    pub before: Vec<Hook>,
    pub after: Vec<Hook>,
    pub pull: bool,
}

impl DeployRequest {
    #[must_use]
    pub fn new(project: &str, compose: &str) -> Self {
        Self {
            project: project.to_string(),
            compose: compose.to_string(),
            before: Vec::new(),
            after: Vec::new(),
            pull: true,
        }
    }

    /// Add hooks run before the new version starts.
    #[must_use]
    pub fn before(mut self, hooks: impl IntoIterator<Item = Hook>) -> Self {
        self.before.extend(hooks);
        self
    }

    /// Add hooks run once the new version is up.
    #[must_use]
    pub fn after(mut self, hooks: impl IntoIterator<Item = Hook>) -> Self {
        self.after.extend(hooks);
        self
    }

    /// Whether `compose up` pulls images first. On by default.
    #[must_use]
    pub const fn pull(mut self, pull: bool) -> Self {
        self.pull = pull;
        self
    }
}

/// Result of a successful deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    pub id: String,
    pub directory: PathBuf,
    /// Ids of the previous deployments that were taken down.
    pub decommissioned: Vec<String>,
}

/// Stages, starts, and swaps versioned deployments of a project.
pub struct Deployer<'a> {
    layout: &'a Layout,
    config: &'a PersistedConfig,
    docker: Docker<'a>,
}

impl<'a> Deployer<'a> {
    #[must_use]
    pub const fn new(layout: &'a Layout, config: &'a PersistedConfig, docker: Docker<'a>) -> Self {
        Self {
            layout,
            config,
            docker,
        }
    }

    /// Bring up a new deployment and decommission every other one
    /// of the same project.
    ///
    /// A failure aborts the remaining steps. Steps already done are
    /// kept: the new directory may exist, and some or all previous
    /// deployments may already be gone.
    pub fn deploy(&self, request: &DeployRequest) -> DeployResult<DeployOutcome> {
        validate_project_name(&request.project)?;
        validate_compose(&request.compose)?;

        let ingress = Ingress::new(self.layout, self.config, self.docker)?;
        ingress.ensure_network()?;

        let project_dir = self.layout.project_dir(&request.project);
        let _lock = ProjectLock::acquire(&project_dir, &request.project)?;

        let id = Uuid::new_v4().to_string();
        let deploy_dir = project_dir.join(&id);

        report::action(&format!("Creating new deployment for {}", request.project));
        fs::create_dir(&deploy_dir)?;
        fs::write(deploy_dir.join(COMPOSE_FILE), &request.compose)?;
        info!(project = %request.project, deployment = %id, "deployment staged");

        let result = self.roll_out(request, &ingress, &project_dir, &id);
        if result.is_err() {
            warn!(
                project = %request.project,
                deployment = %id,
                "deploy interrupted; completed steps were not rolled back"
            );
        }

        Ok(DeployOutcome {
            decommissioned: result?,
            directory: deploy_dir,
            id,
        })
    }

    fn roll_out(
        &self,
        request: &DeployRequest,
        ingress: &Ingress<'_>,
        project_dir: &Path,
        id: &str,
    ) -> DeployResult<Vec<String>> {
        let deploy_dir = project_dir.join(id);

        if !request.before.is_empty() {
            report::action("Running before commands");
            self.run_hooks(&deploy_dir, &request.before)?;
        }

        report::action("Deploying new version");
        self.docker.compose_up(&deploy_dir, request.pull)?;

        report::action("Stop old deployments");
        let mut decommissioned = Vec::new();
        for (old_id, old_dir) in sibling_deployments(project_dir, id)? {
            self.docker.compose_down(&old_dir)?;
            fs::remove_dir_all(&old_dir)?;
            info!(project = %request.project, deployment = %old_id, "deployment removed");
            decommissioned.push(old_id);
        }

        report::action("Ensure Traefik is started");
        ingress.start()?;

        if !request.after.is_empty() {
            report::action("Running after commands");
            self.run_hooks(&deploy_dir, &request.after)?;
        }

        Ok(decommissioned)
    }

    fn run_hooks(&self, deploy_dir: &Path, hooks: &[Hook]) -> DeployResult<()> {
        for hook in hooks {
            self.docker
                .compose_run(deploy_dir, &hook.service, &hook.command)?;
        }
        Ok(())
    }
}

/// The most recently modified deployment directory of a project.
pub fn latest_deployment(layout: &Layout, project: &str) -> DeployResult<PathBuf> {
    validate_project_name(project)?;
    let project_dir = layout.project_dir(project);

    let entries = match fs::read_dir(&project_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(DeployError::NoDeployments(project.to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let mut latest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if latest.as_ref().is_none_or(|(t, _)| modified > *t) {
            latest = Some((modified, entry.path()));
        }
    }

    latest
        .map(|(_, path)| path)
        .ok_or_else(|| DeployError::NoDeployments(project.to_string()))
}

/// Project names become directory names, so they must be a single
/// plain path component.
pub fn validate_project_name(project: &str) -> DeployResult<()> {
    let valid = !project.is_empty()
        && project != "."
        && project != ".."
        && !project.contains(['/', '\\'])
        && !project.chars().any(char::is_control);

    if valid {
        Ok(())
    } else {
        Err(DeployError::InvalidProjectName(project.to_string()))
    }
}

/// The compose document must be non-empty, parseable YAML.
pub fn validate_compose(text: &str) -> DeployResult<()> {
    if text.trim().is_empty() {
        return Err(DeployError::InvalidComposeInput(
            "the content of docker-compose.yml is expected on stdin".into(),
        ));
    }

    serde_yaml::from_str::<serde_yaml::Value>(text)
        .map_err(|e| DeployError::InvalidComposeInput(e.to_string()))?;
    Ok(())
}

/// Deployment directories of a project other than `keep`, sorted by
/// id.
fn sibling_deployments(project_dir: &Path, keep: &str) -> DeployResult<Vec<(String, PathBuf)>> {
    let mut siblings = Vec::new();
    for entry in fs::read_dir(project_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name != keep {
            siblings.push((name, entry.path()));
        }
    }
    siblings.sort();
    Ok(siblings)
}
