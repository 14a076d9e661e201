use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use devroom::config::Config;
use devroom::sandbox::local::LocalContainerFactory;
use devroom::sandbox::{RunOptions, SandboxConfig, SandboxSession, run_workspace};
use devroom::workspace::{FileTree, Workspace};

#[derive(Parser)]
#[command(name = "devroom")]
#[command(version, about = "Collaborative project rooms with an AI workspace runner")]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the collaboration server
    Serve {
        /// Port to serve on (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind all interfaces and relax CORS
        #[arg(long)]
        dev: bool,
    },
    /// Execute a workspace reply file in a local sandbox
    Run {
        /// Path to a file holding an AI workspace reply (JSON, fenced or not)
        workspace_file: PathBuf,

        /// Root directory name inside the sandbox
        #[arg(long, default_value = "app")]
        root: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Serve { port, dev } => {
            let mut config = Config::from_env();
            if let Some(port) = port {
                config.port = port;
            }
            config.dev_mode = dev;
            devroom::server::start_server(config).await
        }
        Commands::Run {
            workspace_file,
            root,
        } => run_workspace_file(&workspace_file, &root).await,
    }
}

fn init_tracing(verbose: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// The full pipeline from the terminal: parse, materialize, install, run,
/// stream logs, and print the preview URL when the server announces one.
async fn run_workspace_file(path: &Path, root: &str) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let workspace =
        Workspace::parse(&raw).context("File does not contain a workspace reply")?;
    let tree = FileTree::from_workspace(&workspace, root);
    println!("Workspace: {} files", tree.file_count());

    let sandbox_config = SandboxConfig::load(Path::new("."))?;
    let options = RunOptions::from(&sandbox_config);
    let mut session = SandboxSession::new(Arc::new(LocalContainerFactory::new(sandbox_config)));

    let (logs_tx, mut logs_rx) = mpsc::unbounded_channel();
    let (preview_tx, mut preview_rx) = mpsc::unbounded_channel();

    run_workspace(&mut session, &tree, &options, logs_tx, preview_tx).await?;

    loop {
        tokio::select! {
            line = logs_rx.recv() => match line {
                Some(line) => print!("{line}"),
                None => break,
            },
            url = preview_rx.recv() => {
                if let Some(url) = url {
                    println!("\nPreview: {url}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopping sandbox...");
                break;
            }
        }
    }

    session.stop().await;
    Ok(())
}
