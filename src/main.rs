// Netpulse - network throughput collector
// Main entry point

use anyhow::Result;
use clap::Parser;
use netpulse::collector::Collector;
use netpulse::config::Config;
use netpulse::measure::{CliEngine, LibraryEngine, Measurer, Target};
use netpulse::resilience::{RecoveryStrategy, RetryCoordinator};
use netpulse::storage::{Archive, AtomicWriter, MainStore};
use netpulse::version::build_info;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "netpulse")]
#[command(author, about, long_about = None)]
#[command(disable_version_flag = true)]
struct Cli {
    /// Run continuously every --interval seconds
    #[arg(long)]
    daemon: bool,

    /// Seconds between cycles in daemon mode
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,

    /// Comma-separated server ids to measure
    #[arg(long, value_name = "ID,ID")]
    servers: Option<String>,

    /// List N nearby servers and exit
    #[arg(long, value_name = "N")]
    list_servers: Option<usize>,

    /// Fail if the speed test CLI is not installed
    #[arg(long, conflicts_with = "no_primary")]
    require_primary: bool,

    /// Never use the speed test CLI even if present
    #[arg(long)]
    no_primary: bool,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the dataset and archive
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Write the effective configuration to PATH and exit
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,

    /// Show version information
    #[arg(short = 'V', long)]
    version: bool,

    /// Show detailed build information
    #[arg(long)]
    build_info: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("{}", build_info().format_display());
        return Ok(());
    }

    if cli.build_info {
        println!("{}", build_info().format_display());
        println!("\n{}", build_info().format_build_info());
        return Ok(());
    }

    init_logging(cli.debug, cli.log_file.as_ref())?;

    let config = effective_config(&cli)?;

    if let Some(path) = &cli.write_config {
        config.save(path.clone())?;
        println!("Wrote configuration to {}", path.display());
        return Ok(());
    }

    if let Some(count) = cli.list_servers {
        return list_servers(&config, count).await;
    }

    run_collector(&config, cli.daemon).await
}

fn init_logging(debug: bool, log_file: Option<&PathBuf>) -> Result<()> {
    let level = if debug { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let builder = tracing_subscriber::fmt().with_max_level(level).with_target(false);

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
            let subscriber = builder
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false) // Disable ANSI colors in log file
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        None => {
            let subscriber = builder.with_writer(std::io::stderr).finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

/// Config file, then environment, then command-line flags
fn effective_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.clone())?;

    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    if let Some(interval) = cli.interval {
        config.interval_secs = interval;
    }
    if let Some(servers) = &cli.servers {
        config.servers = servers
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if cli.no_primary {
        config.use_primary = false;
        config.require_primary = false;
    }
    if cli.require_primary {
        config.use_primary = true;
        config.require_primary = true;
    }

    // Reject bad server ids before any measurement starts
    config.targets()?;
    Ok(config)
}

async fn list_servers(config: &Config, count: usize) -> Result<()> {
    let engine = LibraryEngine::new(config.servers_url.clone())?;
    match engine.list_servers(count).await {
        Ok(servers) if !servers.is_empty() => {
            println!("\nNearby servers:");
            for server in servers {
                println!("{:>6}  {}  ({})  {}", server.id, server.label, server.country, server.host);
            }
        }
        Ok(_) => println!("No server list available."),
        Err(e) => {
            tracing::warn!(error = %e, "could not list servers");
            println!("No server list available.");
        }
    }
    Ok(())
}

async fn run_collector(config: &Config, daemon: bool) -> Result<()> {
    let writer = AtomicWriter::default();
    let store = MainStore::new(config.main_path(), config.main_retention_days, writer.clone());
    let archive = Archive::new(config.archive_dir(), config.archive_retention_files, writer);

    let primary = CliEngine::new(
        config.primary_command.clone(),
        Duration::from_secs(config.primary_timeout_secs),
    );
    let secondary = LibraryEngine::new(config.servers_url.clone())?;
    let measurer = Measurer::new(primary, secondary, config.engine_policy());

    let retry = RetryCoordinator::new(
        config.max_attempts,
        RecoveryStrategy::ExponentialBackoff {
            base_delay: Duration::from_secs(config.initial_backoff_secs),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
        },
    );

    let targets: Vec<Target> = config.targets()?;
    let mut collector = Collector::new(measurer, retry, store, archive, targets);
    collector.prepare()?;

    tracing::info!(
        data_dir = %config.data_dir().display(),
        targets = collector.targets().len(),
        daemon,
        "netpulse collector starting"
    );

    if daemon {
        collector.run_daemon(config.interval_secs, config.jitter_secs).await
    } else {
        collector.run_cycle().await.map(|_| ())
    }
}
