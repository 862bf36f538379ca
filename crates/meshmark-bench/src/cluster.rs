//! Cluster construction and node lifecycle
//!
//! A cluster is an ordered sequence of nodes; node i listens on
//! `base_port + i`. Node 0 seeds the overlay by bootstrapping against
//! itself, every later node joins through the bootstrap controller against
//! the nodes created before it. A node that exhausts its join attempts is
//! kept in the cluster as Failed and stays eligible for the workload.

use crate::bootstrap::BootstrapController;
use crate::Result;
use meshmark_dht::Dht;
use rand::Rng;
use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Created,
    Listening,
    Bootstrapping,
    Joined,
    Failed,
    Stopped,
}

/// One overlay node owned by the cluster
pub struct Node<D> {
    pub index: usize,
    pub port: u16,
    pub dht: D,
    pub state: NodeState,
}

impl<D> Node<D> {
    pub fn new(index: usize, port: u16, dht: D) -> Self {
        Self {
            index,
            port,
            dht,
            state: NodeState::Created,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], self.port))
    }
}

/// An ordered sequence of nodes, insertion order = creation order
pub struct Cluster<D> {
    nodes: Vec<Node<D>>,
}

impl<D: Dht> Cluster<D> {
    fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node<D>] {
        &self.nodes
    }

    /// Addresses of every node currently in the cluster
    pub fn addrs(&self) -> Vec<SocketAddr> {
        self.nodes.iter().map(Node::addr).collect()
    }

    /// Stop every node; called on every exit path from a run
    pub async fn shutdown(&mut self) {
        for node in &mut self.nodes {
            node.dht.stop().await;
            node.state = NodeState::Stopped;
        }
    }
}

pub struct ClusterBuilder {
    bootstrap: BootstrapController,
}

impl ClusterBuilder {
    pub fn new(bootstrap: BootstrapController) -> Self {
        Self { bootstrap }
    }

    /// Create `n` nodes on `base_port..base_port + n` and join them into one
    /// overlay
    ///
    /// On a fatal error every node created so far is stopped before the
    /// error propagates.
    pub async fn create_cluster<D, F, R>(
        &self,
        factory: &mut F,
        n: usize,
        base_port: u16,
        rng: &mut R,
    ) -> Result<Cluster<D>>
    where
        D: Dht,
        F: FnMut() -> D,
        R: Rng,
    {
        let mut cluster = Cluster::new();
        match self.build(&mut cluster, factory, n, base_port, rng).await {
            Ok(()) => Ok(cluster),
            Err(e) => {
                cluster.shutdown().await;
                Err(e)
            }
        }
    }

    async fn build<D, F, R>(
        &self,
        cluster: &mut Cluster<D>,
        factory: &mut F,
        n: usize,
        base_port: u16,
        rng: &mut R,
    ) -> Result<()>
    where
        D: Dht,
        F: FnMut() -> D,
        R: Rng,
    {
        if n == 0 {
            return Ok(());
        }

        // The seed node bootstraps against itself
        let mut seed = Node::new(0, base_port, factory());
        seed.dht.listen(base_port).await?;
        seed.state = NodeState::Listening;
        tracing::info!("node 0 created and listening on port {}", base_port);

        let self_addr = seed.addr();
        seed.state = NodeState::Bootstrapping;
        match seed.dht.bootstrap(&[self_addr]).await {
            Ok(_) => seed.state = NodeState::Joined,
            Err(e) => {
                seed.dht.stop().await;
                return Err(e.into());
            }
        }
        cluster.nodes.push(seed);

        for i in 1..n {
            let port = base_port + i as u16;
            let mut node = Node::new(i, port, factory());
            node.dht.listen(port).await?;
            node.state = NodeState::Listening;
            tracing::info!("node {} created and listening on port {}", i, port);

            // Candidate pool: the cluster contents at this moment, Joined or not
            let pool = cluster.addrs();
            match self.bootstrap.join(&mut node, &pool, factory, rng).await {
                Ok(_) => cluster.nodes.push(node),
                Err(e) => {
                    node.dht.stop().await;
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}
