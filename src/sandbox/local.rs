//! Host-process container.
//!
//! The closest local analog of a browser-side execution environment: a
//! throwaway directory under the temp root backs the filesystem, and
//! commands run through a shell with output combined into one stream.
//! This container has no bulk-mount capability, so materialization always
//! takes the per-file path.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{
    BulkMount, Container, ContainerFactory, ContainerFs, ContainerProcess, OutputChunk,
    SandboxConfig,
};

pub struct LocalContainer {
    root: PathBuf,
    shell: String,
    kill_tx: broadcast::Sender<()>,
}

impl LocalContainer {
    pub async fn boot(config: &SandboxConfig) -> Result<Self> {
        let base = config.base_dir.clone().unwrap_or_else(std::env::temp_dir);
        let root = base.join(format!("devroom-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Failed to create sandbox root {}", root.display()))?;
        let (kill_tx, _) = broadcast::channel(4);
        Ok(Self {
            root,
            shell: config.shell.clone(),
            kill_tx,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn host_path(&self, path: &str) -> Result<PathBuf> {
        let rel = path.trim_start_matches('/');
        if Path::new(rel)
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            anyhow::bail!("path escapes container root: {path}");
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl ContainerFs for LocalContainer {
    async fn mkdir(&self, path: &str) -> Result<()> {
        let host = self.host_path(path)?;
        tokio::fs::create_dir_all(&host)
            .await
            .with_context(|| format!("mkdir {}", host.display()))
    }

    async fn write_file(&self, path: &str, contents: &str) -> Result<()> {
        let host = self.host_path(path)?;
        tokio::fs::write(&host, contents)
            .await
            .with_context(|| format!("write {}", host.display()))
    }

    async fn read_file(&self, path: &str) -> Result<String> {
        let host = self.host_path(path)?;
        tokio::fs::read_to_string(&host)
            .await
            .with_context(|| format!("read {}", host.display()))
    }
}

#[async_trait]
impl Container for LocalContainer {
    fn bulk_mount(&self) -> Option<&dyn BulkMount> {
        None
    }

    async fn spawn(&self, command: &str) -> Result<Box<dyn ContainerProcess>> {
        let mut child = Command::new(&self.shell)
            .arg("-c")
            // Subshell so the redirect combines stderr for the whole command.
            .arg(format!("( {command} ) 2>&1"))
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn '{command}'"))?;

        let stdout = child
            .stdout
            .take()
            .context("child stdout was not captured")?;

        Ok(Box::new(LocalProcess {
            child,
            stdout,
            kill_rx: self.kill_tx.subscribe(),
            kill_seen: false,
        }))
    }

    async fn kill(&self) -> Result<()> {
        // No receivers just means nothing is running.
        let _ = self.kill_tx.send(());
        Ok(())
    }

    async fn dispose(&self) -> Result<()> {
        tokio::fs::remove_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to remove sandbox root {}", self.root.display()))
    }
}

struct LocalProcess {
    child: Child,
    stdout: ChildStdout,
    kill_rx: broadcast::Receiver<()>,
    kill_seen: bool,
}

#[async_trait]
impl ContainerProcess for LocalProcess {
    async fn next_chunk(&mut self) -> Option<OutputChunk> {
        let mut buf = [0u8; 4096];
        loop {
            if self.kill_seen {
                // A grandchild that survived the kill can hold the pipe
                // open; bound the drain instead of waiting for EOF.
                let read = tokio::time::timeout(
                    std::time::Duration::from_millis(500),
                    self.stdout.read(&mut buf),
                )
                .await;
                return match read {
                    Ok(Ok(n)) if n > 0 => Some(OutputChunk::Bytes(buf[..n].to_vec())),
                    _ => None,
                };
            }
            tokio::select! {
                read = self.stdout.read(&mut buf) => {
                    return match read {
                        Ok(0) | Err(_) => None,
                        Ok(n) => Some(OutputChunk::Bytes(buf[..n].to_vec())),
                    };
                }
                signal = self.kill_rx.recv() => {
                    // Drain remaining output after the kill lands.
                    self.kill_seen = true;
                    if signal.is_ok() {
                        let _ = self.child.start_kill();
                    }
                }
            }
        }
    }

    async fn kill(&mut self) -> Result<()> {
        self.child.start_kill().context("Failed to kill process")
    }
}

/// Boots [`LocalContainer`]s with a fixed configuration.
pub struct LocalContainerFactory {
    config: SandboxConfig,
}

impl LocalContainerFactory {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ContainerFactory for LocalContainerFactory {
    async fn boot(&self) -> Result<Arc<dyn Container>> {
        Ok(Arc::new(LocalContainer::boot(&self.config).await?))
    }
}
