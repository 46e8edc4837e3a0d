use anyhow::{Context, Result};
use clap::Parser;
use logship_agent::Agent;
use logship_core::AgentConfig;
use logship_transport::ApiClient;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// logship - forwards local log files to a remote collection endpoint
#[derive(Parser, Debug)]
#[command(name = "logship")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long, default_value = "logship.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the default configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --print-config
    if args.print_config {
        let config = AgentConfig::default();
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    // Load and validate configuration; any problem here is fatal
    let config = AgentConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    config.validate()?;

    let level = if args.verbose || config.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(application = %config.application, "Starting logship");

    let transport = Arc::new(ApiClient::from_config(&config)?);
    let mut agent = Agent::new(config, transport);
    agent.start().await?;

    info!("logship is running, send SIGINT or SIGTERM to stop");
    wait_for_shutdown_signal().await;

    info!("Shutdown signal received, draining");
    agent.stop().await;

    Ok(())
}

/// Block until SIGINT or SIGTERM arrives
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
