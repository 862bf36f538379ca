//! End-to-end harness tests over real UDP overlay nodes
//!
//! These drive the full pipeline on loopback: cluster build, bootstrap,
//! workload phases and aggregation, without any mocking.

use meshmark_bench::bootstrap::BootstrapController;
use meshmark_bench::cluster::{ClusterBuilder, NodeState};
use meshmark_bench::config::Config;
use meshmark_bench::stats::StatsAggregator;
use meshmark_bench::workload;
use meshmark_dht::UdpNode;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;

/// Find a base port with `span` consecutive free ports after it
fn free_port_range(span: u16) -> u16 {
    for base in (42000u16..60000).step_by(103) {
        let all_free =
            (0..span).all(|i| std::net::UdpSocket::bind(("127.0.0.1", base + i)).is_ok());
        if all_free {
            return base;
        }
    }
    panic!("no free port range found");
}

fn node_factory() -> UdpNode {
    UdpNode::with_timeout(Duration::from_millis(200))
}

#[tokio::test]
async fn test_three_node_cluster_full_run() {
    let base = free_port_range(3);
    let builder = ClusterBuilder::new(BootstrapController::new(5, Duration::from_millis(10)));
    let mut rng = StdRng::seed_from_u64(42);

    let mut cluster = builder
        .create_cluster(&mut node_factory, 3, base, &mut rng)
        .await
        .unwrap();

    assert_eq!(cluster.len(), 3);
    for (i, node) in cluster.nodes().iter().enumerate() {
        assert_eq!(node.port, base + i as u16);
        // Loopback bootstrap succeeds, but a Failed node would also be an
        // acceptable terminal state for the build
        assert!(matches!(
            node.state,
            NodeState::Joined | NodeState::Failed
        ));
    }

    let mut stats = StatsAggregator::new();
    workload::run_set_phase(&cluster, 5, &mut stats, &mut rng)
        .await
        .unwrap();
    workload::run_get_phase(&cluster, 5, 2, &mut stats, &mut rng)
        .await
        .unwrap();

    // 5 sets; 2 distinct nodes each sweeping 5 keys
    assert_eq!(stats.set_count(), 5);
    assert_eq!(stats.get_count(), 10);
    let summary = stats.summary();
    assert_eq!(
        summary.average_get,
        stats.total_get_time().checked_div(10).unwrap()
    );

    cluster.shutdown().await;
    for node in cluster.nodes() {
        assert_eq!(node.state, NodeState::Stopped);
    }
}

#[tokio::test]
async fn test_oversized_get_sample_aborts_before_any_call() {
    let base = free_port_range(2);
    let builder = ClusterBuilder::new(BootstrapController::new(5, Duration::from_millis(10)));
    let mut rng = StdRng::seed_from_u64(42);

    let mut cluster = builder
        .create_cluster(&mut node_factory, 2, base, &mut rng)
        .await
        .unwrap();

    let mut stats = StatsAggregator::new();
    let result = workload::run_get_phase(&cluster, 1, 5, &mut stats, &mut rng).await;
    assert!(result.is_err());
    assert_eq!(stats.get_count(), 0);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_run_end_to_end_reports_summary() {
    let base = free_port_range(2);
    let config = Config {
        base_port: base,
        op_timeout_ms: 200,
        ..Config::default()
    };
    let mut factory = node_factory;
    let mut rng = StdRng::seed_from_u64(42);

    let summary = meshmark_bench::run(&mut factory, &config, 2, 3, 1, &mut rng)
        .await
        .unwrap();

    // Real loopback calls take nonzero time
    assert!(summary.average_set > Duration::ZERO);
    assert!(summary.average_get > Duration::ZERO);

    // The ports were released on shutdown
    for i in 0..2u16 {
        std::net::UdpSocket::bind(("127.0.0.1", base + i)).unwrap();
    }
}
