//! Deployment webhook listener.
//!
//! Receives signed Git push events and runs the deploy script for pushes to
//! `main` or `master`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use portal_core::AppConfig;
use portal_core::webhook::{self, ScriptDeployer, WebhookConfig, WebhookState};
use tracing::{debug, info, warn};

/// Trigger deployments from signed Git push webhooks.
#[derive(Parser, Debug)]
#[command(name = "deploy-webhook")]
#[command(author, version, about)]
struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    quiet: bool,

    /// Port to listen on (overrides WEBHOOK_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Interface to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: std::net::IpAddr,

    /// Shared HMAC secret (overrides WEBHOOK_SECRET)
    #[arg(long)]
    secret: Option<String>,

    /// Script run with bash on deployment (overrides DEPLOY_SCRIPT)
    #[arg(long)]
    deploy_script: Option<PathBuf>,

    /// Directory the deploy script runs in
    #[arg(long)]
    working_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut settings = AppConfig::from_env()
        .context("invalid configuration")?
        .webhook;
    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(secret) = args.secret.clone() {
        settings.secret = Some(secret);
    }
    if let Some(script) = args.deploy_script.clone() {
        settings.deploy_script = script;
    }
    debug!(port = settings.port, script = %settings.deploy_script.display(), "webhook settings");

    let mut deployer = ScriptDeployer::new(&settings.deploy_script);
    if let Some(dir) = &args.working_dir {
        deployer = deployer.with_working_dir(dir);
    }
    let state = WebhookState::new(WebhookConfig::from_settings(&settings), Arc::new(deployer));

    let addr = SocketAddr::new(args.host, settings.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    webhook::serve(listener, state, shutdown_signal()).await?;
    info!("webhook stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
