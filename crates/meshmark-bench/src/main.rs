//! Meshmark - DHT overlay benchmark CLI

use anyhow::Result;
use clap::Parser;
use meshmark_bench::config::Config;
use meshmark_bench::logging;
use meshmark_dht::UdpNode;
use std::path::Path;

#[derive(Parser)]
#[command(name = "meshmark")]
#[command(about = "Benchmark a DHT overlay", long_about = None)]
struct Cli {
    /// Number of nodes
    #[arg(long)]
    nodes: usize,

    /// Number of values to be set
    #[arg(long)]
    sets: usize,

    /// Number of gets to be performed
    #[arg(long)]
    gets: usize,

    /// Base port for the first node (overrides config)
    #[arg(long)]
    base_port: Option<u16>,

    /// Log file path (overrides config)
    #[arg(long)]
    log_file: Option<String>,

    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(Path::new(path))?,
        None => Config::default(),
    };
    if let Some(base_port) = cli.base_port {
        config.base_port = base_port;
    }
    if let Some(log_file) = &cli.log_file {
        config.log_file = log_file.clone();
    }

    // The logger lives for exactly this run
    let _guard = logging::init_run_logger(Path::new(&config.log_file), cli.verbose)?;

    let op_timeout = config.op_timeout();
    let mut factory = || UdpNode::with_timeout(op_timeout);
    let mut rng = rand::thread_rng();

    let summary = meshmark_bench::run(
        &mut factory,
        &config,
        cli.nodes,
        cli.sets,
        cli.gets,
        &mut rng,
    )
    .await?;

    println!("Average set latency: {:?}", summary.average_set);
    println!("Average get latency: {:?}", summary.average_get);

    Ok(())
}
