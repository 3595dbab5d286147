use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shardmon::config::Config;
use shardmon::error::ConfigError;
use shardmon::control::monitor::shutdown_channel;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shardmon")]
#[command(about = "Health aggregation for the control plane of a sharded Redis cluster")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the stats monitor until interrupted
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "config/dev.toml")]
        config: PathBuf,
    },
    /// Run one refresh cycle of each kind and print the overview as JSON
    Probe {
        /// Path to configuration file
        #[arg(short, long, default_value = "config/dev.toml")]
        config: PathBuf,
    },
    /// Generate an example configuration file
    Config {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Validate configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => run_monitor(config).await?,
        Commands::Probe { config } => probe_once(config).await?,
        Commands::Config { output } => generate_config(output)?,
        Commands::Validate { config } => validate_config(config)?,
        Commands::Version => show_version(),
    }

    Ok(())
}

async fn run_monitor(config_path: PathBuf) -> Result<()> {
    let config = Config::load_from_file(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    init_logging(&config)?;

    info!(version = env!("CARGO_PKG_VERSION"), config = ?config_path, "starting shardmon");
    info!(
        product = %config.product.name,
        groups = config.topology.groups.len(),
        sentinels = config.topology.sentinel.servers.len(),
        proxies = config.topology.proxies.len(),
        "topology loaded"
    );

    let monitor = shardmon::build_monitor(&config).context("Failed to build monitor")?;
    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
        }
        let _ = shutdown_tx.send(true);
    });

    monitor.run(shutdown_rx).await;
    Ok(())
}

async fn probe_once(config_path: PathBuf) -> Result<()> {
    let config = Config::load_from_file(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    init_logging(&config)?;

    let monitor = shardmon::build_monitor(&config).context("Failed to build monitor")?;
    let overview = monitor.run_once().await.context("Refresh cycle failed")?;
    println!("{}", serde_json::to_string_pretty(&overview)?);
    Ok(())
}

fn generate_config(output: PathBuf) -> Result<()> {
    println!("Generating configuration file: {:?}", output);

    Config::create_example_config(&output).context("Failed to generate config")?;

    println!("Configuration file generated successfully!");
    println!("Edit the file to match your environment and run:");
    println!("  shardmon run --config {:?}", output);

    Ok(())
}

fn validate_config(config_path: PathBuf) -> Result<()> {
    println!("Validating configuration file: {:?}", config_path);

    match Config::load_from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration file is valid");
            println!("  Product: {}", config.product.name);
            println!(
                "  Intervals: redis {}s, proxy {}s, probe timeout {}ms",
                config.health.redis_interval_sec,
                config.health.proxy_interval_sec,
                config.health.probe_timeout_ms
            );
            println!("  Groups: {}", config.topology.groups.len());
            for group in &config.topology.groups {
                println!("    group-{}: {}", group.id, group.servers.join(", "));
            }
            println!("  Sentinels: {}", config.topology.sentinel.servers.len());
            println!("  Proxies: {}", config.topology.proxies.len());
        }
        Err(e) => {
            eprintln!("✗ Configuration file validation failed:");
            match &e {
                ConfigError::IoError(msg) => eprintln!("  File error: {}", msg),
                ConfigError::ParseError(msg) => eprintln!("  Parse error: {}", msg),
                ConfigError::ValidationError(msg) => eprintln!("  Validation error: {}", msg),
                ConfigError::SerializeError(msg) => eprintln!("  Serialization error: {}", msg),
            }
            return Err(e.into());
        }
    }

    Ok(())
}

fn show_version() {
    println!("shardmon v{}", env!("CARGO_PKG_VERSION"));
    println!("Health aggregation for the control plane of a sharded Redis cluster");
    println!();
    println!("Target: {}", std::env::consts::ARCH);
    println!();
    println!("Features:");
    println!("  • Deadline-bounded probes of data servers, sentinels and proxies");
    println!("  • Cycle-consistent published stats");
    println!("  • Automatic online of stuck proxies");
}

fn init_logging(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match config.logging.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(level = %config.logging.level, format = %config.logging.format, "logging initialized");
    Ok(())
}
