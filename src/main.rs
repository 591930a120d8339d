use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

mod config;
mod coordinator;
mod error;
mod messages;
mod sampler;
mod shutdown;
mod tracker;
mod writer;

use config::Config;
use coordinator::Coordinator;
use sampler::{LaunchableIndex, ProcessSampler, SysinfoSampler, X11Windows};
use shutdown::ShutdownSignal;

/// Log how long each foreground application stays active
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Config file (defaults to <config dir>/app-logger/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory that receives log files
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Delay between samples, in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Print the current foreground apps once and exit
    #[arg(long)]
    once: bool,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match cli.config.clone().or_else(Config::default_path) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };

    if let Some(dir) = &cli.log_dir {
        config.log_dir = Some(dir.clone());
    }
    if let Some(interval) = cli.interval_ms {
        config.interval_ms = interval;
    }

    Ok(config)
}

fn build_sampler(config: &Config) -> SysinfoSampler<X11Windows> {
    let mut dirs = config.application_dirs.clone();
    dirs.extend(LaunchableIndex::default_dirs());

    let mut index = LaunchableIndex::from_dirs(&dirs);
    for app in &config.extra_apps {
        index.insert(app.clone());
    }
    if index.is_empty() {
        tracing::warn!("No launchable applications found, nothing will be logged");
    } else {
        tracing::info!("Found {} launchable applications", index.len());
    }

    SysinfoSampler::new(X11Windows::new(), index)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let mut sampler = build_sampler(&config);

    if cli.once {
        let mut apps: Vec<_> = sampler.sample()?.into_iter().collect();
        apps.sort();
        for app in apps {
            println!("{}", app);
        }
        return Ok(());
    }

    let interval = config.interval();
    let mut coordinator =
        Coordinator::new(sampler, interval, move |name| config.resolve_log_path(name));

    let mut shutdown = ShutdownSignal::new()?;

    if let Err(e) = coordinator.start().await {
        tracing::error!("Error initiating files - exiting.");
        return Err(e).context("Failed to start logging");
    }
    if let Some(path) = coordinator.log_path() {
        tracing::info!("Press Ctrl-C to stop, log is {}", path.display());
    }

    let signal = shutdown.wait().await;
    tracing::info!("Shutting down from {:?}", coordinator.state());

    coordinator.stop().await;
    signal
}
