use tracing::info;

use crate::error::DeployError;

/// Announce a step that is about to change something.
pub fn action(message: &str) {
    eprintln!("\n==[ {message} ]==\n");
    info!(action = message);
}

/// Announce the successful end of a command.
pub fn success(message: &str) {
    eprintln!("\n{message}");
}

/// The line printed for an error that ends the process.
///
/// Invalid input gets a one-line message, a failed command its
/// return code, and anything else the full error chain.
#[must_use]
pub fn fatal_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<DeployError>() {
        Some(DeployError::CommandFailed { command, code }) => {
            let code = code.map_or_else(|| "none (killed)".to_string(), |c| c.to_string());
            format!("Error: command failed with return code {code}: {command}")
        }
        Some(e) if e.is_user_facing() => format!("Error: {e}"),
        _ => format!("Error: {err:?}"),
    }
}
