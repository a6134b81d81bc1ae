//! Working directory and shutdown teardown

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use crate::error::RendererResult;
use crate::traits::GeneratorLauncher;
use shared::{process_debug, process_warn, ProcessId};

const WORKDIR_PREFIX: &str = "workshop-renderer";

/// Temporary directory owned by the process for its whole lifetime
#[derive(Debug)]
pub struct WorkingDirectory {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl WorkingDirectory {
    pub fn create() -> RendererResult<Self> {
        let dir = tempfile::Builder::new().prefix(WORKDIR_PREFIX).tempdir()?;
        Ok(Self {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory and everything in it
    pub fn remove(&mut self) -> RendererResult<()> {
        if let Some(dir) = self.dir.take() {
            dir.close()?;
            process_debug!(ProcessId::current(), "🧹 Removed working directory {}", self.path.display());
        }
        Ok(())
    }
}

/// Hook run last during teardown
pub type CleanupHook = Box<dyn FnOnce() + Send>;

/// Everything that has to happen when the proxy stops
///
/// Run exactly once, whether the server returned on its own or a signal
/// arrived.
pub struct Teardown {
    launcher: Arc<dyn GeneratorLauncher>,
    workdir: WorkingDirectory,
    hook: Option<CleanupHook>,
}

impl Teardown {
    pub fn new(launcher: Arc<dyn GeneratorLauncher>, workdir: WorkingDirectory) -> Self {
        Self {
            launcher,
            workdir,
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: CleanupHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    /// Stop the generator, remove the working directory, run the hook
    ///
    /// Failures are logged and do not stop the remaining steps.
    pub async fn run(mut self) {
        if let Err(e) = self.launcher.stop().await {
            process_warn!(ProcessId::current(), "⚠️ Failed to stop generator: {}", e);
        }

        if let Err(e) = self.workdir.remove() {
            process_warn!(ProcessId::current(), "⚠️ Failed to remove working directory: {}", e);
        }

        if let Some(hook) = self.hook.take() {
            hook();
        }
    }
}
