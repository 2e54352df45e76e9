//! dirmock - CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use dirmock::{console, scaffold, server, MockEngine, MockServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "dirmock",
    about = "Directory-driven mock server - file-based stubs and failure simulation",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "dirmock.yaml")]
    config: PathBuf,

    /// Rule directory (overrides the config file)
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Listen address (overrides the config file)
    #[arg(short, long, value_name = "ADDR")]
    listen: Option<SocketAddr>,

    /// Response delay in milliseconds
    #[arg(long, value_name = "MS")]
    delay: Option<u64>,

    /// Fraction of requests answered with a random error (0.0 - 1.0)
    #[arg(long, value_name = "RATE")]
    error_rate: Option<f64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Do not read operator commands from stdin
    #[arg(long)]
    no_console: bool,

    /// Write a sample rule tree into the rule directory before starting
    #[arg(long)]
    init: bool,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        println!("{}", scaffold::DEFAULT_CONFIG);
        return Ok(());
    }

    let mut config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        MockServerConfig::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration");
        MockServerConfig::default()
    };

    if let Some(dir) = args.dir {
        config.mocks_dir = dir;
    }
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(delay) = args.delay {
        config.settings.delay_ms = delay;
    }
    if let Some(rate) = args.error_rate {
        config.settings.error_rate = rate;
    }
    if args.no_console {
        config.settings.console = false;
    }
    config.validate()?;

    if args.validate {
        println!("Configuration is valid (rules in {})", config.mocks_dir.display());
        return Ok(());
    }

    if args.init {
        let written = scaffold::init(
            &config.mocks_dir,
            &config.settings.scenarios_dir,
            &config.settings.templates_dir,
        )?;
        println!("Wrote {} sample files to {}", written.len(), config.mocks_dir.display());
    }

    if !config.mocks_dir.is_dir() {
        tracing::warn!(
            dir = %config.mocks_dir.display(),
            "Rule directory does not exist, every request will 404 (use --init for samples)"
        );
    }

    let engine = Arc::new(MockEngine::from_dir(
        config.mocks_dir.clone(),
        config.settings.clone(),
    ));

    if config.settings.console {
        tokio::spawn(console::run(engine.clone()));
    }

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    info!(
        address = %config.listen,
        rules = %config.mocks_dir.display(),
        "Starting mock server"
    );

    server::serve(listener, engine).await?;

    Ok(())
}
