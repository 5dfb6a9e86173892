use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DeployError, DeployResult};

/// Environment variable overriding the home directory.
pub const HOME_ENV: &str = "MB_HOME";

const HOME_DIR_NAME: &str = ".master-builder";
const CONFIG_FILE: &str = "config.yml";

/// Filesystem layout of an installation, rooted at its home
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    home: PathBuf,
}

impl Layout {
    #[must_use]
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Use `$MB_HOME` when set, `$HOME/.master-builder` otherwise.
    pub fn detect() -> DeployResult<Self> {
        if let Some(home) = std::env::var_os(HOME_ENV) {
            return Ok(Self::new(home));
        }
        let home = std::env::var_os("HOME").ok_or_else(|| DeployError::EnvMissing("HOME".into()))?;
        Ok(Self::new(PathBuf::from(home).join(HOME_DIR_NAME)))
    }

    #[must_use]
    pub fn home(&self) -> &Path {
        &self.home
    }

    #[must_use]
    pub fn deployments_dir(&self) -> PathBuf {
        self.home.join("deployments")
    }

    #[must_use]
    pub fn project_dir(&self, project: &str) -> PathBuf {
        self.deployments_dir().join(project)
    }

    #[must_use]
    pub fn ingress_dir(&self) -> PathBuf {
        self.home.join("ingress")
    }

    #[must_use]
    pub fn ingress_compose_file(&self) -> PathBuf {
        self.ingress_dir().join("docker-compose.yml")
    }

    /// Traefik dynamic configuration, only used with static
    /// certificates.
    #[must_use]
    pub fn dynamic_file(&self) -> PathBuf {
        self.ingress_dir().join("dynamic.yaml")
    }

    /// ACME certificate storage.
    #[must_use]
    pub fn letsencrypt_dir(&self) -> PathBuf {
        self.home.join("letsencrypt")
    }

    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.home.join(CONFIG_FILE)
    }

    #[must_use]
    pub fn config_store(&self) -> ConfigStore {
        ConfigStore::new(self.config_file())
    }
}

/// One-time setup choices, written by `init` and read by every
/// other command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedConfig {
    pub init_done: bool,
    pub enable_https: bool,
    pub ssl_contact: String,
    pub ssl_key: String,
    pub ssl_cert: String,
}

impl PersistedConfig {
    pub const fn require_initialized(&self) -> DeployResult<()> {
        if self.init_done {
            Ok(())
        } else {
            Err(DeployError::NotInitialized)
        }
    }
}

/// Reads and writes the [`PersistedConfig`] record.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record, falling back to defaults when it does not
    /// exist yet.
    pub fn load(&self) -> DeployResult<PersistedConfig> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no configuration yet, using defaults");
            return Ok(PersistedConfig::default());
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(PersistedConfig::default());
        }

        serde_yaml::from_str(&content).map_err(|e| DeployError::ConfigCorrupt {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    /// Overwrite the record. The new content is written next to
    /// the target and renamed into place.
    pub fn save(&self, config: &PersistedConfig) -> DeployResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(config)?;
        let tmp = self.path.with_extension("yml.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), "configuration saved");
        Ok(())
    }

    /// Load the record and fail unless `init` has been run.
    pub fn load_initialized(&self) -> DeployResult<PersistedConfig> {
        let config = self.load()?;
        config.require_initialized()?;
        Ok(config)
    }
}
