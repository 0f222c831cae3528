//! CLI argument definitions using clap derive macros.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use portal_core::{DownloadMethod, Theme};

/// Site gateway and API tooling.
///
/// Serves the reverse proxy in front of the backend API, downloads files
/// through the API client, and manages the stored theme preference.
#[derive(Parser, Debug)]
#[command(name = "portal")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the reverse proxy in front of the upstream API
    Serve(ServeArgs),
    /// Download a file through the API client
    Download(DownloadArgs),
    /// Show or change the stored theme preference
    Theme(ThemeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to listen on (overrides PORTAL_LISTEN)
    #[arg(short, long)]
    pub listen: Option<SocketAddr>,

    /// Upstream API origin (overrides PORTAL_API_TARGET)
    #[arg(short, long)]
    pub upstream: Option<String>,

    /// Path prefix to forward (overrides PORTAL_PROXY_PREFIX)
    #[arg(short, long)]
    pub prefix: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    /// File URL, absolute or relative to the API base
    pub url: String,

    /// Directory to save the file into
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Save under this name instead of the server-provided one
    #[arg(short, long)]
    pub filename: Option<String>,

    /// HTTP method (GET or POST)
    #[arg(short = 'X', long, default_value_t = DownloadMethod::Get)]
    pub method: DownloadMethod,

    /// Stream the body and show a progress bar
    #[arg(long)]
    pub progress: bool,

    /// Bearer token for the API
    #[arg(long, env = "PORTAL_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Cookie header to read the `token` cookie from
    #[arg(long, conflicts_with = "token")]
    pub cookie: Option<String>,

    /// Query parameter as KEY=VALUE (repeatable)
    #[arg(long = "query", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub query: Vec<(String, String)>,

    /// JSON request body
    #[arg(long)]
    pub body: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ThemeArgs {
    /// Preference file (overrides PORTAL_THEME_FILE)
    #[arg(long)]
    pub file: Option<PathBuf>,

    #[command(subcommand)]
    pub action: Option<ThemeAction>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeAction {
    /// Print the stored preference and what it resolves to (default)
    Get,
    /// Store a preference: light, dark, or system
    Set {
        theme: Theme,
    },
    /// Switch between light and dark
    Toggle,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
