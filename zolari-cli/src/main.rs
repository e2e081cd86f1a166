//! Zolari CLI: terminal client for the Zolari research co-pilot.
//!
//! One-shot subcommands for login, submission and results, plus a live
//! `watch` view and an interactive prompt.

mod commands;
mod repl;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Zolari: Your AI-Powered Research Co-pilot
#[derive(Parser, Debug)]
#[command(name = "zolari", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (holds `.zolari/config.toml`)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand (starts the interactive prompt if omitted)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Manage the login session
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
    /// Submit a research request
    Submit {
        /// What to research
        #[arg(short, long)]
        topic: String,
        /// Research type, e.g. "Market Analysis" or "technology-trends"
        #[arg(long = "type")]
        research_type: Option<String>,
        /// Depth from 1 (overview) to 5 (in-depth)
        #[arg(long)]
        depth: Option<String>,
        /// Standard, High or Low
        #[arg(long)]
        urgency: Option<String>,
    },
    /// Show your research requests and their progress
    Results,
    /// Live view that refreshes every 30 seconds (Ctrl-C to exit)
    Watch,
    /// Interactive prompt
    Run,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum AuthAction {
    /// Log in through the browser
    Login,
    /// Finish a login with the URL the browser was redirected to
    Callback {
        /// Full redirect URL, including `code` and `state`
        url: String,
    },
    /// Show the current session
    Status,
    /// End the session
    Logout,
    /// Renew the access token now
    Refresh,
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default configuration file
    Init,
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = zolari_core::config::log_dir();
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "zolari.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    match cli.command {
        Some(command) => commands::handle_command(command, &workspace).await,
        None => commands::handle_command(Commands::Run, &workspace).await,
    }
}
