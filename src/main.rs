//! expose
//!
//! A CLI tool for exposing a local HTTP service to the internet.
//!
//! The tool drives a local ngrok agent: it opens a single HTTP tunnel to a
//! local port, prints the public URL, and closes the tunnel again when the
//! operator presses Enter (or Ctrl+C).

#![deny(clippy::correctness)]
#![warn(clippy::suspicious)]
#![warn(clippy::style)]
#![warn(clippy::complexity)]
#![warn(clippy::perf)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod client;
mod config;
mod error;
mod protocol;

use client::console::{self, CLOSED_MESSAGE, CLOSE_PROMPT};
use client::{AgentApi, TunnelManager};
use config::Config;
use protocol::Protocol;

#[derive(Parser, Debug)]
#[command(name = "expose")]
#[command(author, version, about = "Expose a local port to the internet")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Local port to expose
    #[arg(short, long, global = true, value_parser = clap::value_parser!(u16).range(1..))]
    port: Option<u16>,

    /// API URL of an already running ngrok agent
    #[arg(long, global = true, env = "EXPOSE_AGENT_API_URL")]
    api_url: Option<String>,

    /// ngrok authtoken
    #[arg(long, global = true, env = "NGROK_AUTHTOKEN", hide_env_values = true)]
    authtoken: Option<String>,

    /// Open the public URL in the default browser
    #[arg(long, global = true)]
    open: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Expose the local port until Enter is pressed (default)
    Start,

    /// Save your ngrok authtoken
    Authtoken {
        /// Token from the ngrok dashboard
        token: String,
    },

    /// List tunnels on a running agent
    Tunnels,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load().unwrap_or_else(|e| {
        warn!("Ignoring config file: {:#}", e);
        Config::default()
    });

    // CLI/env > config file > defaults
    if let Some(port) = cli.port {
        config.tunnel.port = port;
    }
    if cli.api_url.is_some() {
        config.agent.api_url = cli.api_url.clone();
    }
    if cli.authtoken.is_some() {
        config.agent.authtoken = cli.authtoken.clone();
    }

    match cli.command {
        None | Some(Commands::Start) => run_start(&config, cli.open).await,
        Some(Commands::Authtoken { token }) => run_authtoken(token),
        Some(Commands::Tunnels) => run_tunnels(&config).await,
    }
}

async fn run_start(config: &Config, open_browser: bool) -> Result<()> {
    let mut manager = TunnelManager::launch(&config.agent)
        .await?
        .with_upstream_check(config.tunnel.check_upstream);

    let mut session = manager.open(config.tunnel.port, Protocol::Http).await?;

    print!(
        "{}",
        console::render_banner(&config.tunnel.app_name, session.public_url())
    );

    if open_browser && open::that(session.public_url()).is_err() {
        println!("(Could not open browser automatically)");
    }

    tokio::select! {
        result = console::await_operator_signal(CLOSE_PROMPT) => {
            result.context("Failed to read from stdin")?;
        }
        _ = tokio::signal::ctrl_c() => {
            println!();
            info!("Interrupted, closing tunnel");
        }
    }

    manager.close(&mut session).await?;
    if let Some(uptime) = session.uptime() {
        info!(
            "{} tunnel for port {} was public for {}s",
            session.protocol(),
            session.local_port(),
            uptime.num_seconds()
        );
    }
    manager.shutdown().await?;

    println!("{}", CLOSED_MESSAGE);
    Ok(())
}

fn run_authtoken(token: String) -> Result<()> {
    let token = token.trim().to_string();

    if token.is_empty() {
        anyhow::bail!("No token provided");
    }

    if token.chars().any(char::is_whitespace) {
        anyhow::bail!("Invalid token format. Tokens cannot contain whitespace");
    }

    let path = Config::config_path()?;
    Config::save_authtoken(&path, &token)?;

    println!("Authtoken saved to {:?}", path);
    println!("You can now run: expose");

    Ok(())
}

async fn run_tunnels(config: &Config) -> Result<()> {
    let api_url = config.agent.api_url.as_deref().ok_or_else(|| {
        error::TunnelError::NoAgent(
            "set --api-url or agent.api_url to the running agent's address".to_string(),
        )
    })?;

    let api = AgentApi::new(api_url)?;
    let tunnels = api
        .list_tunnels()
        .await
        .with_context(|| format!("Failed to list tunnels from {}", api.base_url()))?;

    if tunnels.is_empty() {
        println!("No tunnels open on {}", api.base_url());
        return Ok(());
    }

    println!("Tunnels on {}:", api.base_url());
    println!();
    for tunnel in tunnels {
        println!(
            "  {} ({}) {} -> {}",
            tunnel.name, tunnel.proto, tunnel.public_url, tunnel.config.addr
        );
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
