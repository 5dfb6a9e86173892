use std::path::PathBuf;

pub type DeployResult<T> = Result<T, DeployError>;

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("please run `master-builder init` first")]
    NotInitialized,

    #[error("configuration file {} is corrupt: {message}", path.display())]
    ConfigCorrupt { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid email address: {0:?}")]
    InvalidEmail(String),

    #[error("invalid docker-compose.yml: {0}")]
    InvalidComposeInput(String),

    #[error("invalid command format: {0}, expected <service>:<command>")]
    InvalidHookFormat(String),

    #[error("invalid project name: {0:?}")]
    InvalidProjectName(String),

    #[error("no deployments found for project {0}")]
    NoDeployments(String),

    #[error("another deployment of {0} is in progress")]
    DeployLocked(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("invalid SSH URL: {0}")]
    InvalidSshUrl(String),

    #[error("invalid image template: {0}")]
    InvalidImageTemplate(String),

    #[error("invalid environment: {0}")]
    InvalidEnvironment(String),

    #[error("environment variable missing: {0}")]
    EnvMissing(String),

    #[error("command failed: {command}")]
    CommandFailed { command: String, code: Option<i32> },

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl DeployError {
    /// Errors caused by invalid input or state, shown to the user
    /// as a short message without diagnostics.
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized
                | Self::ConfigCorrupt { .. }
                | Self::InvalidConfiguration(_)
                | Self::InvalidEmail(_)
                | Self::InvalidComposeInput(_)
                | Self::InvalidHookFormat(_)
                | Self::InvalidProjectName(_)
                | Self::NoDeployments(_)
                | Self::DeployLocked(_)
                | Self::FileNotFound(_)
                | Self::InvalidSshUrl(_)
                | Self::InvalidImageTemplate(_)
                | Self::InvalidEnvironment(_)
                | Self::EnvMissing(_)
                | Self::CommandNotFound(_)
        )
    }
}
