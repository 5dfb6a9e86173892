use std::fmt;
use std::str::FromStr;

use crate::error::{DeployError, DeployResult};

/// A one-off command run inside a service of a deployment, written
/// as `<service>:<command>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hook {
    pub service: String,
    pub command: Vec<String>,
}

impl Hook {
    /// Parse every entry, failing on the first malformed one.
    pub fn parse_all<S: AsRef<str>>(entries: &[S]) -> DeployResult<Vec<Self>> {
        entries.iter().map(|e| e.as_ref().parse()).collect()
    }
}

impl FromStr for Hook {
    type Err = DeployError;

    fn from_str(s: &str) -> DeployResult<Self> {
        let invalid = || DeployError::InvalidHookFormat(s.to_string());

        let (service, command) = s.split_once(':').ok_or_else(invalid)?;
        let service = service.trim();
        if service.is_empty() {
            return Err(invalid());
        }

        let command = shlex::split(command).ok_or_else(invalid)?;

        Ok(Self {
            service: service.to_string(),
            command,
        })
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let command = shlex::try_join(self.command.iter().map(String::as_str))
            .unwrap_or_else(|_| self.command.join(" "));
        write!(f, "{}:{command}", self.service)
    }
}
