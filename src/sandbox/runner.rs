//! Install, start, and stream a materialized workspace.
//!
//! The runner owns the whole execute path: materialize the tree, install
//! dependencies when a package manifest is present, pick the run command,
//! then hand the process to a long-lived streaming task that decodes
//! output into the log sink and watches for a preview URL. The streaming
//! task runs until the process exits or the sandbox is stopped; it is not
//! tied to whatever view started the run.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::errors::SandboxError;
use crate::workspace::FileTree;

use super::materialize::{Materializer, WriteMethod};
use super::url::UrlDetector;
use super::{ContainerProcess, SandboxConfig, SandboxSession};

/// Append-only sink for decoded process output.
pub type LogSink = mpsc::UnboundedSender<String>;
/// Receives each detected preview URL exactly once per detection.
pub type PreviewSink = mpsc::UnboundedSender<String>;

/// One install invocation, second tool as fallback for the first.
const INSTALL_COMMAND: &str = "(pnpm install --no-frozen-lockfile || npm install --no-audit --no-fund)";

/// Tunables for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub install_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            install_timeout: Duration::from_secs(600),
        }
    }
}

impl From<&SandboxConfig> for RunOptions {
    fn from(config: &SandboxConfig) -> Self {
        Self {
            install_timeout: Duration::from_secs(config.install_timeout),
        }
    }
}

/// Execute a workspace tree in the session's sandbox.
///
/// Returns the materialization method once the run process is spawned and
/// streaming; all subsequent output arrives through the sinks. Errors that
/// reach the caller are also reported into the log sink, so a UI driven
/// purely by logs sees every failure as text.
pub async fn run_workspace(
    session: &mut SandboxSession,
    tree: &FileTree,
    options: &RunOptions,
    logs: LogSink,
    preview: PreviewSink,
) -> Result<WriteMethod, SandboxError> {
    if session.run_active() {
        return Err(SandboxError::RunInProgress);
    }
    let container = session.acquire().await?;

    let _ = logs.send("Writing workspace to container...\n".to_string());
    let method = match Materializer::new(container.as_ref()).write_tree(tree).await {
        Ok(method) => method,
        Err(e) => {
            let _ = logs.send(format!("Write failed: {e}\n"));
            return Err(e);
        }
    };
    let _ = logs.send(format!("Workspace written ({})\n", method.as_str()));

    let root = tree.root_name();
    let has_manifest = tree.has_root_file("package.json");

    if has_manifest {
        if session.install_active() {
            return Err(SandboxError::InstallInProgress);
        }
        session.set_install_active(true);
        install_dependencies(container.as_ref(), root, options, &logs).await;
        session.set_install_active(false);
    }

    let run_command = resolve_run_command(container.as_ref(), root, has_manifest).await;
    let _ = logs.send(format!("Starting: {run_command}\n"));

    let process = container
        .spawn(&run_command)
        .await
        .map_err(|e| SandboxError::SpawnFailed {
            command: run_command.clone(),
            message: e.to_string(),
        })
        .inspect_err(|e| {
            let _ = logs.send(format!("{e}\n"));
        })?;

    let task = tokio::spawn(stream_run_output(process, logs, preview));
    session.track_run(task);
    Ok(method)
}

/// Install failures never abort the run; the workspace may still start.
async fn install_dependencies(
    container: &dyn super::Container,
    root: &str,
    options: &RunOptions,
    logs: &LogSink,
) {
    let _ = logs.send("Installing dependencies...\n".to_string());
    let command = format!("cd {root} && {INSTALL_COMMAND}");

    let mut process = match container.spawn(&command).await {
        Ok(process) => process,
        Err(e) => {
            let _ = logs.send(format!("Dependency install failed (continuing): {e}\n"));
            return;
        }
    };

    let drain = async {
        while let Some(chunk) = process.next_chunk().await {
            let _ = logs.send(chunk.decode());
        }
    };
    if tokio::time::timeout(options.install_timeout, drain)
        .await
        .is_err()
    {
        let _ = logs.send("Dependency install timed out (continuing)\n".to_string());
    }
}

/// Default to the fixed interpreter invocation; prefer a manifest-declared
/// start script when one exists. Manifest read failures keep the default.
async fn resolve_run_command(
    container: &dyn super::Container,
    root: &str,
    has_manifest: bool,
) -> String {
    let default = format!("cd {root} && node index.js");
    if !has_manifest {
        return default;
    }
    let Ok(raw) = container.read_file(&format!("{root}/package.json")).await else {
        return default;
    };
    let Ok(manifest) = serde_json::from_str::<serde_json::Value>(&raw) else {
        return default;
    };
    if manifest
        .get("scripts")
        .and_then(|scripts| scripts.get("start"))
        .is_some()
    {
        format!("cd {root} && npm run start")
    } else {
        default
    }
}

/// Long-lived per-run task: decode output into the log sink and surface
/// each detected preview URL once. Closed sinks are ignored — the run
/// may outlive the view that started it.
async fn stream_run_output(
    mut process: Box<dyn ContainerProcess>,
    logs: LogSink,
    preview: PreviewSink,
) {
    let mut detector = UrlDetector::new();
    while let Some(chunk) = process.next_chunk().await {
        let text = chunk.decode();
        if let Some(url) = detector.push(&text) {
            let _ = preview.send(url);
        }
        let _ = logs.send(text);
    }
}
