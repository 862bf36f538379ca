//! Meshmark - benchmarking harness for a DHT overlay
//!
//! The harness builds a cluster of overlay nodes in-process, joins them into
//! one overlay through a retrying bootstrap sequence, drives a set/get
//! workload against randomly chosen nodes and reports mean latencies. The
//! overlay protocol itself lives behind the [`meshmark_dht::Dht`] trait; the
//! harness only orchestrates it.

pub mod bootstrap;
pub mod cluster;
pub mod config;
pub mod error;
pub mod logging;
pub mod reaper;
pub mod stats;
pub mod workload;

pub use error::{BenchError, Result};

use bootstrap::BootstrapController;
use cluster::{Cluster, ClusterBuilder};
use config::Config;
use meshmark_dht::Dht;
use rand::Rng;
use stats::{LatencySummary, StatsAggregator};

/// Build the cluster, run the workload, report averages
///
/// Everything runs sequentially on the calling task: nodes are created and
/// joined in index order, the set phase strictly precedes the get phase.
/// Every node is stopped before this returns, on the error paths included.
pub async fn run<D, F, R>(
    factory: &mut F,
    config: &Config,
    nodes: usize,
    sets: usize,
    gets: usize,
    rng: &mut R,
) -> Result<LatencySummary>
where
    D: Dht,
    F: FnMut() -> D,
    R: Rng,
{
    let controller = BootstrapController::from_config(&config.bootstrap);
    let builder = ClusterBuilder::new(controller);
    let mut cluster = builder
        .create_cluster(factory, nodes, config.base_port, rng)
        .await?;

    let mut stats = StatsAggregator::new();
    let outcome = drive_workload(&cluster, sets, gets, &mut stats, rng).await;
    cluster.shutdown().await;
    outcome?;

    let summary = stats.summary();
    tracing::info!("average time for a set operation: {:?}", summary.average_set);
    tracing::info!("average time for a get operation: {:?}", summary.average_get);
    Ok(summary)
}

async fn drive_workload<D, R>(
    cluster: &Cluster<D>,
    sets: usize,
    gets: usize,
    stats: &mut StatsAggregator,
    rng: &mut R,
) -> Result<()>
where
    D: Dht,
    R: Rng,
{
    workload::run_set_phase(cluster, sets, stats, rng).await?;
    workload::run_get_phase(cluster, sets, gets, stats, rng).await
}
