//! glasshouse command line.
//!
//! Usage:
//!   glasshouse serve [--bind ADDR] [--seed-dir DIR]
//!   glasshouse run SCRIPT [--input FILE]... [--out-dir DIR]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use glasshouse::bridge;
use glasshouse::config::{self, GlasshouseConfig};
use glasshouse::logging;
use glasshouse::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "glasshouse")]
#[command(version, about = "Stateless sandboxed code execution service")]
struct Cli {
    /// Configuration file (defaults to ./glasshouse.toml, then the XDG config dir)
    #[arg(long, env = "GLASSHOUSE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Directory whose files are copied into every fresh sandbox
    #[arg(long, env = "GLASSHOUSE_SEED_DIR", global = true)]
    seed_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Socket address to listen on
        #[arg(long, env = "GLASSHOUSE_BIND")]
        bind: Option<String>,
    },

    /// Execute one script locally and print the result as JSON
    Run {
        /// Script to execute
        script: PathBuf,

        /// File to place in the sandbox home directory (repeatable)
        #[arg(long = "input", value_name = "FILE")]
        inputs: Vec<PathBuf>,

        /// Directory to write output files into
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let source = cli.config.clone().or_else(config::locate);
    let mut config = match &source {
        Some(path) => config::from_path(path)?,
        None => GlasshouseConfig::default(),
    };
    if let Some(seed_dir) = cli.seed_dir {
        config.sandbox.seed_dir = seed_dir;
    }

    logging::init(&config.logging).context("failed to initialize logging")?;
    match &source {
        Some(path) => tracing::debug!(path = %path.display(), "configuration loaded"),
        None => tracing::debug!("no configuration file found, using defaults"),
    }

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            serve(config).await
        }
        Commands::Run {
            script,
            inputs,
            out_dir,
        } => run(config, &script, &inputs, out_dir.as_deref()).await,
    }
}

async fn start_service(config: &GlasshouseConfig) -> Result<ExecutionService> {
    let manager = Arc::new(SandboxManager::with_rhai(config.sandbox.clone()));
    manager
        .initialize()
        .await
        .context("sandbox initialization failed")?;
    Ok(ExecutionService::new(manager))
}

async fn serve(config: GlasshouseConfig) -> Result<()> {
    let service = start_service(&config).await?;
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;

    let fatal = service.subscribe_fatal();
    glasshouse::server::serve(
        listener,
        service.clone(),
        config.server.max_body_bytes,
        shutdown_signal(fatal),
    )
    .await?;
    service.manager().terminate();

    let reason = service.subscribe_fatal().borrow().clone();
    if let Some(reason) = reason {
        bail!("sandbox can no longer be recycled: {reason}");
    }
    tracing::info!("shut down");
    Ok(())
}

/// Resolves on Ctrl-C or once the service reports a fatal sandbox error.
async fn shutdown_signal(mut fatal: watch::Receiver<Option<String>>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    let failed = async {
        let closed = fatal.wait_for(Option::is_some).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("shutdown requested"),
        () = failed => tracing::error!("shutting down after a fatal sandbox error"),
    }
}

async fn run(
    config: GlasshouseConfig,
    script: &Path,
    inputs: &[PathBuf],
    out_dir: Option<&Path>,
) -> Result<()> {
    let code = std::fs::read_to_string(script)
        .with_context(|| format!("failed to read script '{}'", script.display()))?;

    let mut request = ExecutionRequest::new(code);
    for input in inputs {
        let bytes = std::fs::read(input)
            .with_context(|| format!("failed to read input '{}'", input.display()))?;
        let name = input
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("input '{}' has no usable file name", input.display()))?;
        let wire = bridge::encode(name, &bytes);
        request = request.with_file(wire.filename, wire.b64_data);
    }

    let service = start_service(&config).await?;
    let result = service.submit(request).await;
    println!("{}", serde_json::to_string(&result)?);

    if let Some(out_dir) = out_dir {
        write_outputs(out_dir, &result)?;
    }
    if let Some(error) = &result.error {
        bail!("execution failed with {}", error.kind);
    }
    Ok(())
}

fn write_outputs(out_dir: &Path, result: &ExecutionResult) -> Result<()> {
    for file in &result.output_files {
        bridge::validate_filename(&file.filename)
            .map_err(|reason| anyhow::anyhow!("refusing to write output: {reason}"))?;
        let bytes = bridge::decode(file)?;

        let target = out_dir.join(&file.filename);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create '{}'", parent.display()))?;
        }
        std::fs::write(&target, bytes)
            .with_context(|| format!("failed to write '{}'", target.display()))?;
        tracing::info!(path = %target.display(), "wrote output file");
    }
    Ok(())
}
