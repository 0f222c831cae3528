//! CLI entry point for the site gateway.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use portal_core::auth::token_from_cookie_header;
use portal_core::proxy::{self, ProxyConfig, ProxyState};
use portal_core::{
    ApiClient, AppConfig, DownloadOptions, DownloadOutcome, Downloader, FileThemeBackend,
    NotificationService, Session, SystemAppearance, ThemeManager,
};
use tracing::{debug, info, warn};

mod cli;

use cli::{Cli, Command, DownloadArgs, ServeArgs, ThemeAction, ThemeArgs};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?cli, "CLI arguments parsed");

    let config = AppConfig::from_env().context("invalid configuration")?;

    match cli.command {
        Command::Serve(args) => run_serve(config, args).await,
        Command::Download(args) => run_download(&config, args, cli.quiet).await,
        Command::Theme(args) => run_theme(&config, args),
    }
}

async fn run_serve(config: AppConfig, args: ServeArgs) -> Result<()> {
    let config = config
        .with_proxy_overrides(args.listen, args.upstream.as_deref(), args.prefix.as_deref())
        .context("invalid serve options")?;

    let state = ProxyState::new(ProxyConfig::from_app_config(&config)?)?;
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    proxy::serve(listener, state, shutdown_signal()).await?;
    info!("proxy stopped");
    Ok(())
}

async fn run_download(config: &AppConfig, args: DownloadArgs, quiet: bool) -> Result<()> {
    let session = Session::new();
    let token = args
        .token
        .clone()
        .or_else(|| args.cookie.as_deref().and_then(token_from_cookie_header));
    if let Some(token) = token {
        session.set_token(token);
    }

    let notifier = NotificationService::new();
    let client = ApiClient::from_config(config, Arc::new(session), notifier.clone())?;
    let downloader = Downloader::new(&client, &args.output_dir)?;

    let mut options = DownloadOptions::new().method(args.method);
    if let Some(filename) = &args.filename {
        options = options.filename(filename);
    }
    for (key, value) in &args.query {
        options = options.query(key, value);
    }
    if let Some(body) = &args.body {
        let body = serde_json::from_str(body).context("--body is not valid JSON")?;
        options = options.body(body);
    }

    let bar = (args.progress && !quiet).then(progress_bar);
    if let Some(bar) = &bar {
        let bar = bar.clone();
        options = options.on_progress(Arc::new(move |progress| {
            bar.set_length(progress.total);
            bar.set_position(progress.loaded);
        }));
    } else if args.progress {
        // Streaming is still wanted without a visible bar.
        options = options.on_progress(Arc::new(|_| {}));
    }

    let result = downloader.download(&args.url, options).await;
    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }
    for toast in notifier.toasts() {
        warn!(
            kind = %toast.kind,
            message = toast.message.as_deref().unwrap_or(""),
            "{}",
            toast.title
        );
    }

    match result? {
        DownloadOutcome::Saved {
            path,
            filename,
            bytes,
        } => {
            info!(%filename, bytes, "download complete");
            println!("{}", path.display());
        }
        DownloadOutcome::Cancelled => info!("download cancelled"),
    }
    Ok(())
}

fn run_theme(config: &AppConfig, args: ThemeArgs) -> Result<()> {
    let path = args.file.unwrap_or_else(|| config.theme_file.clone());
    let backend = FileThemeBackend::new(path, SystemAppearance::default());
    let manager = ThemeManager::new(Arc::new(backend));

    match args.action.unwrap_or(ThemeAction::Get) {
        ThemeAction::Get => {}
        ThemeAction::Set { theme } => manager.set_theme(theme)?,
        ThemeAction::Toggle => {
            manager.toggle()?;
        }
    }
    println!("{} ({})", manager.theme(), manager.effective());
    Ok(())
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {bytes}/{total_bytes} ({percent}%) {eta}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
