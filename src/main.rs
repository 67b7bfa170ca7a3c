use anyhow::Result;
use clap::{Parser, Subcommand};

use stresskit::config::{CpuConfig, NetMode, NetworkConfig, RamConfig, StressConfig, Tunables};
use stresskit::coordinator;
use stresskit::report::render_summary;

#[derive(Parser)]
#[command(
    name = "stresskit",
    about = "CPU, memory, and network stress testing from the command line",
    version,
    long_about = None
)]
struct Cli {
    /// Emit the final summary as JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stress CPU cores with prime-counting workers
    Cpu {
        /// Number of cores to use (default: all logical CPUs)
        #[arg(long)]
        cores: Option<usize>,

        /// Duration in seconds
        #[arg(long, default_value = "60")]
        duration: u64,
    },

    /// Stress memory by allocating and continuously touching it
    Ram {
        /// Total memory to allocate, in MB
        #[arg(long, default_value = "1024")]
        size: u64,

        /// Number of worker threads
        #[arg(long, default_value = "4")]
        threads: usize,

        /// Duration in seconds
        #[arg(long, default_value = "60")]
        duration: u64,
    },

    /// Stress the network with a TCP byte-stream server or client
    Network {
        /// Role: server or client
        #[arg(long)]
        mode: String,

        /// Host address to bind (server) or connect to (client)
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// TCP port
        #[arg(long, default_value = "9999")]
        port: u16,

        /// Number of client connection workers (client mode only)
        #[arg(long, default_value = "4")]
        clients: usize,

        /// Duration in seconds
        #[arg(long, default_value = "60")]
        duration: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match build_config(cli.command) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(e.exit_code());
        }
    };

    let tunables = Tunables::load_or_default();

    match coordinator::execute(config, tunables).await {
        Ok(result) => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", render_summary(&result));
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

fn build_config(command: Commands) -> Result<StressConfig, stresskit::error::StressError> {
    let config = match command {
        Commands::Cpu { cores, duration } => StressConfig::Cpu(CpuConfig {
            cores: cores.unwrap_or_else(default_cores),
            duration_secs: duration,
        }),
        Commands::Ram {
            size,
            threads,
            duration,
        } => StressConfig::Ram(RamConfig {
            size_mb: size,
            threads,
            duration_secs: duration,
        }),
        Commands::Network {
            mode,
            host,
            port,
            clients,
            duration,
        } => StressConfig::Network(NetworkConfig {
            mode: mode.parse::<NetMode>()?,
            host,
            port,
            clients,
            duration_secs: duration,
        }),
    };
    config.validate()?;
    Ok(config)
}

fn default_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
