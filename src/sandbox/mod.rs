//! Isolated execution of generated workspaces.
//!
//! A container is an isolated environment with a filesystem, an optional
//! bulk-mount capability, and process spawning. The capability split is
//! explicit: [`Container::bulk_mount`] is checked once when a
//! [`materialize::Materializer`] is constructed, not probed per call.
//!
//! Containers are owned per session by a [`SandboxSession`]: lazily booted
//! on first need, reused across runs, and destroyed on stop. Nothing in
//! this module holds a process-wide container.

pub mod decode;
pub mod local;
pub mod materialize;
pub mod runner;
pub mod url;

pub use decode::OutputChunk;
pub use materialize::{Materializer, WriteMethod};
pub use runner::{LogSink, PreviewSink, RunOptions, run_workspace};
pub use url::UrlDetector;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::SandboxError;
use crate::workspace::FileTree;

// ── Container capabilities ───────────────────────────────────────────

/// Filesystem surface every container exposes. Paths are slash-separated
/// and relative to the container root.
#[async_trait]
pub trait ContainerFs: Send + Sync {
    async fn mkdir(&self, path: &str) -> Result<()>;
    async fn write_file(&self, path: &str, contents: &str) -> Result<()>;
    async fn read_file(&self, path: &str) -> Result<String>;
}

/// Optional capability: write a whole tree in one operation.
#[async_trait]
pub trait BulkMount: Send + Sync {
    async fn mount(&self, tree: &FileTree) -> Result<()>;
}

/// A spawned process inside a container, with combined output.
#[async_trait]
pub trait ContainerProcess: Send {
    /// The next chunk of output, or `None` once the stream ends.
    async fn next_chunk(&mut self) -> Option<OutputChunk>;

    /// Request termination of this process.
    async fn kill(&mut self) -> Result<()>;
}

/// An isolated execution environment.
#[async_trait]
pub trait Container: ContainerFs {
    /// The bulk-mount capability, if this container has one.
    fn bulk_mount(&self) -> Option<&dyn BulkMount>;

    /// Spawn a shell command rooted at the container root.
    async fn spawn(&self, command: &str) -> Result<Box<dyn ContainerProcess>>;

    /// Terminate everything running inside the container.
    async fn kill(&self) -> Result<()>;

    /// Release the container's resources.
    async fn dispose(&self) -> Result<()>;
}

/// Boots containers on demand for a session.
#[async_trait]
pub trait ContainerFactory: Send + Sync {
    async fn boot(&self) -> Result<Arc<dyn Container>>;
}

// ── Sandbox configuration ────────────────────────────────────────────

/// Configuration for sandbox runs, loaded from `.devroom/sandbox.toml`.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Shell used for install and run invocations.
    pub shell: String,
    /// Host directory under which container roots are created. Defaults to
    /// the system temp directory.
    pub base_dir: Option<PathBuf>,
    /// Upper bound on a dependency install, in seconds.
    pub install_timeout: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            shell: "bash".to_string(),
            base_dir: None,
            install_timeout: 600,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SandboxToml {
    sandbox: Option<SandboxSection>,
}

#[derive(Debug, Deserialize)]
struct SandboxSection {
    shell: Option<String>,
    base_dir: Option<PathBuf>,
    install_timeout: Option<u64>,
}

impl SandboxConfig {
    /// Load sandbox config from `.devroom/sandbox.toml` under the given
    /// directory. Returns defaults if the file doesn't exist.
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(".devroom").join("sandbox.toml");
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let toml: SandboxToml = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        let mut config = Self::default();
        if let Some(section) = toml.sandbox {
            if let Some(shell) = section.shell {
                config.shell = shell;
            }
            if let Some(base_dir) = section.base_dir {
                config.base_dir = Some(base_dir);
            }
            if let Some(install_timeout) = section.install_timeout {
                config.install_timeout = install_timeout;
            }
        }
        Ok(config)
    }
}

// ── Per-session sandbox ownership ────────────────────────────────────

/// The sandbox owned by one client session.
///
/// The container is created lazily on first acquire and reused across
/// runs. At most one run and one install are tracked at a time; starting
/// a run while one is active is a caller error. Stopping kills and
/// disposes the container (both best-effort) and clears the cached handle
/// so the next run boots fresh.
pub struct SandboxSession {
    factory: Arc<dyn ContainerFactory>,
    container: Option<Arc<dyn Container>>,
    run_task: Option<tokio::task::JoinHandle<()>>,
    install_active: bool,
}

impl SandboxSession {
    pub fn new(factory: Arc<dyn ContainerFactory>) -> Self {
        Self {
            factory,
            container: None,
            run_task: None,
            install_active: false,
        }
    }

    /// The session's container, booting one on first use.
    pub async fn acquire(&mut self) -> Result<Arc<dyn Container>, SandboxError> {
        if let Some(container) = &self.container {
            return Ok(container.clone());
        }
        let container = self
            .factory
            .boot()
            .await
            .map_err(|e| SandboxError::Boot(e.to_string()))?;
        self.container = Some(container.clone());
        Ok(container)
    }

    /// Whether a run's streaming task is still alive.
    pub fn run_active(&self) -> bool {
        self.run_task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn install_active(&self) -> bool {
        self.install_active
    }

    pub(crate) fn set_install_active(&mut self, active: bool) {
        self.install_active = active;
    }

    pub(crate) fn track_run(&mut self, task: tokio::task::JoinHandle<()>) {
        self.run_task = Some(task);
    }

    /// Stop the sandbox: graceful kill, then dispose, each error-swallowed,
    /// then drop the cached container so a subsequent run starts fresh.
    pub async fn stop(&mut self) {
        if let Some(container) = self.container.take() {
            if let Err(e) = container.kill().await {
                tracing::debug!("sandbox kill failed: {e}");
            }
            if let Err(e) = container.dispose().await {
                tracing::debug!("sandbox dispose failed: {e}");
            }
        }
        if let Some(task) = self.run_task.take() {
            task.abort();
        }
        self.install_active = false;
    }
}
