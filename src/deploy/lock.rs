use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::error::{DeployError, DeployResult};

const LOCK_FILE: &str = ".deploy.lock";

/// Exclusive advisory lock over one project's deployments, released
/// on drop.
#[derive(Debug)]
pub struct ProjectLock {
    file: File,
    path: PathBuf,
}

impl ProjectLock {
    /// Take the lock without waiting. Fails with
    /// [`DeployError::DeployLocked`] if another process holds it.
    pub fn acquire(project_dir: &Path, project: &str) -> DeployResult<Self> {
        fs::create_dir_all(project_dir)?;
        let path = project_dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                debug!(path = %path.display(), "project lock acquired");
                Ok(Self { file, path })
            }
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                Err(DeployError::DeployLocked(project.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!(path = %self.path.display(), error = %e, "failed to release project lock");
        }
    }
}
