//! Writing a file tree into a container.
//!
//! Two strategies exist: a single bulk mount when the container has that
//! capability, and a recursive per-directory-then-per-file fallback. The
//! strategy is chosen once, when the materializer is constructed; a failed
//! mount still falls back to per-file writes. The result always names the
//! method that wrote the tree — there is no silent partial success.

use crate::errors::SandboxError;
use crate::workspace::{FileTree, TreeOp};

use super::Container;

/// How a tree reached the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMethod {
    Mount,
    WriteFile,
}

impl WriteMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMethod::Mount => "mount",
            WriteMethod::WriteFile => "writeFile",
        }
    }
}

/// Writes file trees into one container.
pub struct Materializer<'a> {
    container: &'a dyn Container,
    bulk_capable: bool,
}

impl<'a> Materializer<'a> {
    /// The capability check happens here, once, not per call.
    pub fn new(container: &'a dyn Container) -> Self {
        Self {
            bulk_capable: container.bulk_mount().is_some(),
            container,
        }
    }

    /// Write the whole tree, reporting the method used.
    pub async fn write_tree(&self, tree: &FileTree) -> Result<WriteMethod, SandboxError> {
        if self.bulk_capable {
            let bulk = self
                .container
                .bulk_mount()
                .expect("capability checked at construction");
            match bulk.mount(tree).await {
                Ok(()) => return Ok(WriteMethod::Mount),
                Err(e) => {
                    tracing::warn!("bulk mount failed, falling back to per-file writes: {e}");
                }
            }
        }

        self.write_per_file(tree)
            .await
            .map(|_| WriteMethod::WriteFile)
            .map_err(|e| SandboxError::Materialize(e.to_string()))
    }

    /// Per-file fallback: parents before children, mkdir errors on
    /// already-existing directories tolerated, write errors fatal.
    async fn write_per_file(&self, tree: &FileTree) -> anyhow::Result<()> {
        for op in tree.flatten() {
            match op {
                TreeOp::Mkdir(path) => {
                    if let Err(e) = self.container.mkdir(&path).await {
                        tracing::debug!("mkdir {path} failed (continuing): {e}");
                    }
                }
                TreeOp::Write { path, contents } => {
                    self.container
                        .write_file(&path, &contents)
                        .await
                        .map_err(|e| anyhow::anyhow!("write {path}: {e}"))?;
                }
            }
        }
        Ok(())
    }
}
