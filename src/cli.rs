use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::cmd::CommandRunner;
use crate::config::{HOME_ENV, Layout};
use crate::deploy::{self, DeployRequest, Deployer};
use crate::docker::Docker;
use crate::error::{DeployError, DeployResult};
use crate::hook::Hook;
use crate::ingress::Ingress;
use crate::init::{self, InitOptions};
use crate::prepare::{self, Environments, PrepareOptions};
use crate::remote::{DEFAULT_REMOTE_COMMAND, SshSession, SshTarget};
use crate::report;

/// Deploy and manage your applications on a single VM with Docker
/// Compose.
#[derive(Debug, Parser)]
#[command(name = "master-builder", version)]
pub struct Cli {
    /// Directory holding deployments, ingress files, and settings
    #[arg(long, global = true, env = HOME_ENV)]
    pub home: Option<PathBuf>,

    /// Increase log verbosity (-v for info, -vv for debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register static values required for the project to work
    Init {
        /// Serve traffic over HTTPS
        #[arg(long)]
        enable_https: bool,

        /// Email address for the SSL certificate contact
        #[arg(long, conflicts_with_all = ["ssl_key", "ssl_cert"])]
        ssl_contact: Option<String>,

        /// Private key of a static certificate
        #[arg(long, requires = "ssl_cert")]
        ssl_key: Option<PathBuf>,

        /// Static certificate (full chain)
        #[arg(long, requires = "ssl_key")]
        ssl_cert: Option<PathBuf>,
    },

    /// Deploy a project, reading its docker-compose.yml from stdin
    Deploy {
        /// Project name
        project: String,

        /// Command to run before deployment
        #[arg(long, value_name = "SERVICE:COMMAND")]
        before: Vec<String>,

        /// Command to run after deployment
        #[arg(long, value_name = "SERVICE:COMMAND")]
        after: Vec<String>,

        /// Do not pull images before deployment
        #[arg(long)]
        no_pull: bool,
    },

    /// Manage the Traefik ingress
    Ingress {
        #[command(subcommand)]
        action: IngressAction,
    },

    /// Run Docker Compose commands in the current deployment of a
    /// project
    Compose {
        /// Project name
        project: String,

        /// Arguments passed to `docker compose`
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Print the compose document a push would send, without
    /// connecting anywhere
    Prepare {
        /// Project name
        project: String,

        #[command(flatten)]
        prepare: PrepareArgs,
    },

    /// Prepare a local compose project and deploy it on a server
    /// over SSH
    Push {
        /// Server to deploy to, as ssh://[user@]host[:port]
        #[arg(long, env = "MB_SSH_URL")]
        ssh_url: String,

        /// Project name
        project: String,

        #[command(flatten)]
        prepare: PrepareArgs,

        /// Private key used by ssh
        #[arg(long)]
        ssh_key: Option<PathBuf>,

        /// master-builder command on the server
        #[arg(long, default_value = DEFAULT_REMOTE_COMMAND)]
        remote_command: String,

        /// Command to run before deployment
        #[arg(long, value_name = "SERVICE:COMMAND")]
        before: Vec<String>,

        /// Command to run after deployment
        #[arg(long, value_name = "SERVICE:COMMAND")]
        after: Vec<String>,

        /// Do not pull images before deployment
        #[arg(long)]
        no_pull: bool,
    },
}

/// How to turn a local compose project into a deployable document.
#[derive(Debug, Clone, Args)]
pub struct PrepareArgs {
    /// Directory holding the compose project
    #[arg(long, default_value = ".")]
    pub compose_dir: PathBuf,

    /// Image name for built services, e.g.
    /// registry.example.com/app/${service.name}:1.2
    #[arg(long, env = "MB_IMAGE_TEMPLATE")]
    pub image_tpl: Option<String>,

    /// YAML file of extra environment variables per component
    #[arg(long)]
    pub env_file: Option<PathBuf>,
}

impl PrepareArgs {
    fn options(&self, project: &str) -> DeployResult<PrepareOptions> {
        let environments = match &self.env_file {
            Some(path) => prepare::parse_environments(&read_file(path)?)?,
            None => Environments::new(),
        };

        let mut options = PrepareOptions::new(&self.compose_dir, project)
            .environments(environments);
        if let Some(template) = &self.image_tpl {
            options = options.image_template(template);
        }
        Ok(options)
    }
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum IngressAction {
    /// Start the Traefik ingress
    Start,
    /// Stop the Traefik ingress
    Stop,
    /// Pull the latest Traefik image and restart if running
    Update,
    /// Check the status of the Traefik ingress
    Status,
}

impl Cli {
    /// Dispatch the parsed command.
    pub fn execute(&self, runner: &dyn CommandRunner) -> DeployResult<()> {
        let docker = Docker::new(runner);

        match &self.command {
            Command::Init {
                enable_https,
                ssl_contact,
                ssl_key,
                ssl_cert,
            } => {
                let options = InitOptions {
                    enable_https: *enable_https,
                    ssl_contact: ssl_contact.clone(),
                    ssl_key: ssl_key.clone(),
                    ssl_cert: ssl_cert.clone(),
                };
                cmd_init(&self.layout()?, &options)
            }
            Command::Deploy {
                project,
                before,
                after,
                no_pull,
            } => {
                let request = DeployRequest::new(project, &read_compose_input()?)
                    .before(Hook::parse_all(before)?)
                    .after(Hook::parse_all(after)?)
                    .pull(!no_pull);
                cmd_deploy(&self.layout()?, docker, &request)
            }
            Command::Ingress { action } => cmd_ingress(&self.layout()?, docker, *action),
            Command::Compose { project, args } => {
                cmd_compose(&self.layout()?, docker, project, args)
            }
            Command::Prepare { project, prepare } => {
                let compose = prepare::prepare(docker, &prepare.options(project)?)?;
                print!("{compose}");
                Ok(())
            }
            Command::Push {
                ssh_url,
                project,
                prepare,
                ssh_key,
                remote_command,
                before,
                after,
                no_pull,
            } => {
                let target: SshTarget = ssh_url.parse()?;
                let compose = prepare::prepare(docker, &prepare.options(project)?)?;
                let request = DeployRequest::new(project, &compose)
                    .before(Hook::parse_all(before)?)
                    .after(Hook::parse_all(after)?)
                    .pull(!no_pull);

                let mut session = SshSession::new(runner, target);
                if let Some(key) = ssh_key {
                    session = session.with_key(key);
                }
                cmd_push(&session, remote_command, &request)
            }
        }
    }

    /// The home layout, only resolved by commands that use it.
    fn layout(&self) -> DeployResult<Layout> {
        self.home
            .as_ref()
            .map_or_else(Layout::detect, |home| Ok(Layout::new(home)))
    }
}

fn cmd_init(layout: &Layout, options: &InitOptions) -> DeployResult<()> {
    init::run(&layout.config_store(), options)?;
    report::success("Initialization done.");
    Ok(())
}

fn cmd_deploy(layout: &Layout, docker: Docker<'_>, request: &DeployRequest) -> DeployResult<()> {
    let config = layout.config_store().load_initialized()?;
    let outcome = Deployer::new(layout, &config, docker).deploy(request)?;

    report::success(&format!(
        "Deployment of {} completed successfully ({}).",
        request.project, outcome.id
    ));
    Ok(())
}

fn cmd_push(
    session: &SshSession<'_>,
    remote_command: &str,
    request: &DeployRequest,
) -> DeployResult<()> {
    session.deploy(remote_command, request)?;

    report::success(&format!(
        "Deployment of {} on {} completed successfully.",
        request.project,
        session.target()
    ));
    Ok(())
}

fn cmd_ingress(layout: &Layout, docker: Docker<'_>, action: IngressAction) -> DeployResult<()> {
    let config = layout.config_store().load_initialized()?;
    let ingress = Ingress::new(layout, &config, docker)?;

    match action {
        IngressAction::Start => {
            if ingress.start()? {
                report::success("Traefik ingress started successfully.");
            } else {
                report::success("Traefik ingress is already running.");
            }
        }
        IngressAction::Stop => {
            if ingress.stop()? {
                report::success("Traefik ingress stopped successfully.");
            } else {
                report::success("Traefik ingress is not running.");
            }
        }
        IngressAction::Update => {
            ingress.update()?;
            report::success("Traefik ingress updated successfully.");
        }
        IngressAction::Status => {
            let status = if ingress.is_running()? {
                "running"
            } else {
                "not running"
            };
            println!("Traefik status: {status}");
        }
    }
    Ok(())
}

fn cmd_compose(
    layout: &Layout,
    docker: Docker<'_>,
    project: &str,
    args: &[String],
) -> DeployResult<()> {
    layout.config_store().load_initialized()?;
    let dir = deploy::latest_deployment(layout, project)?;
    docker.compose(&dir, args)
}

/// Read the compose document piped on stdin. A terminal on stdin
/// means the user forgot the pipe.
fn read_compose_input() -> DeployResult<String> {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Err(DeployError::InvalidComposeInput(
            "the content of docker-compose.yml is expected on stdin".into(),
        ));
    }

    let mut compose = String::new();
    stdin.read_to_string(&mut compose)?;
    Ok(compose)
}

fn read_file(path: &Path) -> DeployResult<String> {
    if !path.is_file() {
        return Err(DeployError::FileNotFound(path.display().to_string()));
    }
    Ok(std::fs::read_to_string(path)?)
}
