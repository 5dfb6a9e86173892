pub mod template;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{Layout, PersistedConfig};
use crate::docker::Docker;
use crate::error::{DeployError, DeployResult};
use crate::report;

/// Compose service name of the proxy.
pub const SERVICE_NAME: &str = "traefik";

/// Shared network joined by the proxy and every deployment.
pub const NETWORK_NAME: &str = "traefik";

/// How the proxy terminates traffic, derived from the persisted
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressMode {
    /// Plain HTTP on port 80.
    Http,
    /// HTTPS with certificates issued automatically via ACME.
    Acme { contact: String },
    /// HTTPS with a certificate and key supplied as files.
    StaticCert { cert: PathBuf, key: PathBuf },
}

impl IngressMode {
    pub fn from_config(config: &PersistedConfig) -> DeployResult<Self> {
        if !config.enable_https {
            return Ok(Self::Http);
        }

        if !config.ssl_contact.is_empty() {
            Ok(Self::Acme {
                contact: config.ssl_contact.clone(),
            })
        } else if !config.ssl_key.is_empty() && !config.ssl_cert.is_empty() {
            Ok(Self::StaticCert {
                cert: PathBuf::from(&config.ssl_cert),
                key: PathBuf::from(&config.ssl_key),
            })
        } else {
            Err(DeployError::InvalidConfiguration(
                "HTTPS is enabled but neither an SSL contact nor a \
                 certificate and key are configured"
                    .into(),
            ))
        }
    }

    #[must_use]
    pub const fn needs_dynamic_file(&self) -> bool {
        matches!(self, Self::StaticCert { .. })
    }
}

/// What a convergence step did to a file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChange {
    Unchanged,
    Created,
    Updated,
    Deleted,
}

impl FileChange {
    #[must_use]
    pub const fn verb(self) -> &'static str {
        match self {
            Self::Unchanged => "Keeping",
            Self::Created => "Creating",
            Self::Updated => "Updating",
            Self::Deleted => "Deleting",
        }
    }
}

/// Converges the shared Traefik proxy toward the state implied by
/// the configuration. Every operation is idempotent and relies only
/// on what is on disk and what the runtime reports.
pub struct Ingress<'a> {
    layout: &'a Layout,
    mode: IngressMode,
    docker: Docker<'a>,
}

impl<'a> Ingress<'a> {
    pub fn new(
        layout: &'a Layout,
        config: &PersistedConfig,
        docker: Docker<'a>,
    ) -> DeployResult<Self> {
        Ok(Self {
            layout,
            mode: IngressMode::from_config(config)?,
            docker,
        })
    }

    #[must_use]
    pub const fn mode(&self) -> &IngressMode {
        &self.mode
    }

    /// Write the proxy compose file if it differs from the
    /// rendered one.
    pub fn ensure_compose_file(&self) -> DeployResult<FileChange> {
        let desired = template::render_compose(&self.mode, self.layout)?;

        if matches!(self.mode, IngressMode::Acme { .. }) {
            fs::create_dir_all(self.layout.letsencrypt_dir())?;
        }

        sync_file(
            &self.layout.ingress_compose_file(),
            &desired,
            "Traefik Docker Compose file",
        )
    }

    /// Write the dynamic TLS file in static-certificate mode and
    /// delete any leftover one in the other modes.
    pub fn ensure_dynamic_file(&self) -> DeployResult<FileChange> {
        let path = self.layout.dynamic_file();

        if !self.mode.needs_dynamic_file() {
            return match fs::remove_file(&path) {
                Ok(()) => {
                    report::action("Deleting Traefik dynamic configuration file");
                    Ok(FileChange::Deleted)
                }
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(FileChange::Unchanged),
                Err(e) => Err(e.into()),
            };
        }

        let desired = template::render_dynamic()?;
        sync_file(&path, &desired, "Traefik dynamic configuration file")
    }

    /// Create the shared network unless it is already listed.
    /// Returns whether it was created.
    pub fn ensure_network(&self) -> DeployResult<bool> {
        if self.docker.networks()?.iter().any(|n| n == NETWORK_NAME) {
            debug!(network = NETWORK_NAME, "network already present");
            return Ok(false);
        }

        report::action("Creating Traefik network");
        self.docker.create_network(NETWORK_NAME)?;
        Ok(true)
    }

    pub fn is_running(&self) -> DeployResult<bool> {
        self.ensure_compose_file()?;
        let running = self.docker.running_services(&self.layout.ingress_dir())?;
        Ok(running.iter().any(|s| s == SERVICE_NAME))
    }

    /// Bring the proxy up. Returns `false` when it was already
    /// running.
    pub fn start(&self) -> DeployResult<bool> {
        self.ensure_compose_file()?;
        self.ensure_dynamic_file()?;
        self.ensure_network()?;

        if self.is_running()? {
            return Ok(false);
        }

        report::action("Starting Traefik ingress");
        self.docker.compose_up(&self.layout.ingress_dir(), false)?;
        Ok(true)
    }

    /// Take the proxy down. Returns `false` when it was not
    /// running.
    pub fn stop(&self) -> DeployResult<bool> {
        self.ensure_compose_file()?;

        if !self.is_running()? {
            return Ok(false);
        }

        report::action("Stopping Traefik ingress");
        self.docker.compose_down(&self.layout.ingress_dir())?;
        Ok(true)
    }

    /// Pull the latest proxy image and restart the proxy if it was
    /// running. The restart is not zero-downtime.
    pub fn update(&self) -> DeployResult<()> {
        self.ensure_compose_file()?;

        report::action("Pulling latest Traefik image");
        self.docker.compose_pull(&self.layout.ingress_dir())?;

        if self.is_running()? {
            self.stop()?;
            self.start()?;
        }
        Ok(())
    }
}

/// Write `desired` to `path` unless it already holds exactly that
/// content.
fn sync_file(path: &Path, desired: &str, what: &str) -> DeployResult<FileChange> {
    let change = match fs::read_to_string(path) {
        Ok(existing) if existing == desired => return Ok(FileChange::Unchanged),
        Ok(_) => FileChange::Updated,
        Err(e) if e.kind() == ErrorKind::NotFound => FileChange::Created,
        Err(e) => return Err(e.into()),
    };

    report::action(&format!("{} {what}", change.verb()));
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, desired)?;
    debug!(path = %path.display(), ?change, "file written");

    Ok(change)
}
