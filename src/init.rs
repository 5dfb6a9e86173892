use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::info;

use crate::config::{ConfigStore, PersistedConfig};
use crate::error::{DeployError, DeployResult};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
});

const MAX_EMAIL_LEN: usize = 254;
const MAX_LOCAL_PART_LEN: usize = 64;

/// Choices made once when setting up an installation.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub enable_https: bool,
    pub ssl_contact: Option<String>,
    pub ssl_key: Option<PathBuf>,
    pub ssl_cert: Option<PathBuf>,
}

impl InitOptions {
    #[must_use]
    pub fn http() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn acme(contact: &str) -> Self {
        Self {
            enable_https: true,
            ssl_contact: Some(contact.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn static_cert(key: impl Into<PathBuf>, cert: impl Into<PathBuf>) -> Self {
        Self {
            enable_https: true,
            ssl_key: Some(key.into()),
            ssl_cert: Some(cert.into()),
            ..Self::default()
        }
    }

    /// Check the options and turn them into the record to persist.
    pub fn validate(&self) -> DeployResult<PersistedConfig> {
        let contact = self.ssl_contact.as_deref().filter(|c| !c.is_empty());
        let key = self.ssl_key.as_deref().filter(|p| !p.as_os_str().is_empty());
        let cert = self.ssl_cert.as_deref().filter(|p| !p.as_os_str().is_empty());

        if !self.enable_https {
            if contact.is_some() || key.is_some() || cert.is_some() {
                return Err(DeployError::InvalidConfiguration(
                    "SSL options require --enable-https".into(),
                ));
            }
            return Ok(PersistedConfig {
                init_done: true,
                ..PersistedConfig::default()
            });
        }

        match (contact, key, cert) {
            (Some(contact), None, None) => {
                if !validate_email(contact) {
                    return Err(DeployError::InvalidEmail(contact.to_string()));
                }
                Ok(PersistedConfig {
                    init_done: true,
                    enable_https: true,
                    ssl_contact: contact.to_string(),
                    ..PersistedConfig::default()
                })
            }
            (None, Some(key), Some(cert)) => Ok(PersistedConfig {
                init_done: true,
                enable_https: true,
                ssl_key: existing_file(key)?,
                ssl_cert: existing_file(cert)?,
                ..PersistedConfig::default()
            }),
            (Some(_), _, _) => Err(DeployError::InvalidConfiguration(
                "--ssl-contact cannot be combined with --ssl-key/--ssl-cert".into(),
            )),
            (None, Some(_), None) | (None, None, Some(_)) => Err(DeployError::InvalidConfiguration(
                "--ssl-key and --ssl-cert must be given together".into(),
            )),
            (None, None, None) => Err(DeployError::InvalidConfiguration(
                "enabling HTTPS requires either an email address for the SSL \
                 certificate contact (--ssl-contact) or a certificate and key \
                 (--ssl-cert, --ssl-key)"
                    .into(),
            )),
        }
    }
}

/// Validate the options and overwrite the stored configuration.
pub fn run(store: &ConfigStore, options: &InitOptions) -> DeployResult<PersistedConfig> {
    let config = options.validate()?;
    store.save(&config)?;
    info!(https = config.enable_https, "initialization saved");
    Ok(config)
}

/// Check an address for use as the ACME contact.
#[must_use]
pub fn validate_email(email: &str) -> bool {
    if email.len() > MAX_EMAIL_LEN || !EMAIL_RE.is_match(email) {
        return false;
    }

    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };

    local.len() <= MAX_LOCAL_PART_LEN
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

/// Certificate files are mounted from the ingress directory, so
/// they must exist and are stored as absolute paths.
fn existing_file(path: &Path) -> DeployResult<String> {
    if !path.is_file() {
        return Err(DeployError::FileNotFound(path.display().to_string()));
    }
    let absolute = std::path::absolute(path)?;
    Ok(absolute.to_string_lossy().into_owned())
}
