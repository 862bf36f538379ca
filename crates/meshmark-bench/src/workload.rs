//! Put/get workload driver
//!
//! The set phase stores deterministic key/value pairs on randomly chosen
//! nodes; the get phase sweeps every stored key from a random sample of
//! distinct nodes. Every call is timed and recorded. Failed nodes stay in
//! the draw, so an operation error from one of them aborts the run the same
//! way any other operation error does.

use crate::cluster::Cluster;
use crate::stats::{Measurement, StatsAggregator};
use crate::{BenchError, Result};
use meshmark_dht::Dht;
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Instant;

/// Store `num_sets` values on randomly chosen nodes, timing each call
pub async fn run_set_phase<D, R>(
    cluster: &Cluster<D>,
    num_sets: usize,
    stats: &mut StatsAggregator,
    rng: &mut R,
) -> Result<()>
where
    D: Dht,
    R: Rng,
{
    for i in 1..=num_sets {
        let node = cluster
            .nodes()
            .choose(rng)
            .ok_or(BenchError::Sampling {
                requested: 1,
                cluster_size: 0,
            })?;
        let key = format!("key-{}", i);
        let value = format!("value-{}", i);

        let start = Instant::now();
        node.dht.set(&key, &value).await?;
        let elapsed = start.elapsed();

        tracing::info!("time taken to set value {}: {:?}", i, elapsed);
        stats.record(Measurement::set(key, elapsed));
    }
    Ok(())
}

/// Sweep every key from `num_gets` distinct randomly sampled nodes, timing
/// each call and logging the retrieved value
///
/// Retrieved values are reported, never asserted against what was set.
pub async fn run_get_phase<D, R>(
    cluster: &Cluster<D>,
    num_sets: usize,
    num_gets: usize,
    stats: &mut StatsAggregator,
    rng: &mut R,
) -> Result<()>
where
    D: Dht,
    R: Rng,
{
    if num_gets > cluster.len() {
        return Err(BenchError::Sampling {
            requested: num_gets,
            cluster_size: cluster.len(),
        });
    }

    let picks = rand::seq::index::sample(rng, cluster.len(), num_gets);
    for node_idx in picks.iter() {
        let node = &cluster.nodes()[node_idx];
        for i in 1..=num_sets {
            let key = format!("key-{}", i);

            let start = Instant::now();
            let value = node.dht.get(&key).await?;
            let elapsed = start.elapsed();

            tracing::info!(
                "time taken to get value {}: {:?}, value retrieved: {:?}",
                i,
                elapsed,
                value
            );
            stats.record(Measurement::get(key, elapsed, value));
        }
    }
    Ok(())
}
