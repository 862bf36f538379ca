//! Per-node bootstrap retry state machine
//!
//! Joining a node runs `Idle -> Attempting -> {Joined | Failed}`. An empty
//! bootstrap result is retried immediately; a transport error reclaims the
//! node's port, stops the instance, sleeps an exponentially growing backoff
//! and retries with a fresh instance on the same port. Exhausting the
//! attempts marks the node Failed without aborting the cluster build.

use crate::cluster::{Node, NodeState};
use crate::config::BootstrapConfig;
use crate::reaper;
use crate::{BenchError, Result};
use meshmark_dht::Dht;
use rand::seq::SliceRandom;
use rand::Rng;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinState {
    Idle,
    Attempting,
    Joined,
    Failed,
}

/// Outcome of a join sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinReport {
    pub state: JoinState,
    pub attempts: u32,
}

pub struct BootstrapController {
    max_attempts: u32,
    backoff_unit: Duration,
}

impl BootstrapController {
    pub fn new(max_attempts: u32, backoff_unit: Duration) -> Self {
        Self {
            max_attempts,
            backoff_unit,
        }
    }

    pub fn from_config(config: &BootstrapConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.backoff_unit_ms),
        )
    }

    /// Delay slept before the retry that follows failed attempt `attempt`
    /// (1-based): `2^(attempt-1)` backoff units
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_unit * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    /// Drive one node through the join sequence against the candidate pool
    ///
    /// The pool may contain nodes that are not yet Joined, or even Failed
    /// ones; the peer for each attempt is chosen uniformly at random from a
    /// snapshot of the pool. Returns an error only for failures the run
    /// cannot continue from (a bind failure while re-listening); exhausted
    /// attempts report `Failed` instead.
    pub async fn join<D, F, R>(
        &self,
        node: &mut Node<D>,
        pool: &[SocketAddr],
        factory: &mut F,
        rng: &mut R,
    ) -> Result<JoinReport>
    where
        D: Dht,
        F: FnMut() -> D,
        R: Rng,
    {
        let mut state = JoinState::Idle;
        let mut attempt = 0;
        node.state = NodeState::Bootstrapping;

        while attempt < self.max_attempts {
            attempt += 1;
            state = JoinState::Attempting;

            let peer = *pool.choose(rng).ok_or(BenchError::EmptyCandidatePool)?;
            match node.dht.bootstrap(&[peer]).await {
                Ok(contacted) if contacted.is_empty() => {
                    tracing::error!(
                        "attempt {} to connect node {} returned an empty result",
                        attempt,
                        node.index
                    );
                }
                Ok(contacted) => {
                    tracing::info!("contacted peers: {:?}", contacted);
                    tracing::info!(
                        "node {} successfully connected on attempt {}",
                        node.index,
                        attempt
                    );
                    state = JoinState::Joined;
                    break;
                }
                Err(e) => {
                    tracing::error!(
                        "attempt {} to connect node {} failed: {}",
                        attempt,
                        node.index,
                        e
                    );
                    if attempt == self.max_attempts {
                        tracing::error!(
                            "node {} failed to connect after {} attempts",
                            node.index,
                            self.max_attempts
                        );
                    } else {
                        // Reaping is best effort; a port nobody holds is fine
                        if let Err(reap_err) = reaper::reap_port(node.port) {
                            tracing::warn!("failed to reap port {}: {}", node.port, reap_err);
                        }
                        node.dht.stop().await;
                        tokio::time::sleep(self.backoff_delay(attempt)).await;

                        // Retry with a fresh instance on the node's original port
                        node.dht = factory();
                        node.dht.listen(node.port).await?;
                    }
                }
            }
        }

        if state == JoinState::Joined {
            node.state = NodeState::Joined;
        } else {
            state = JoinState::Failed;
            node.state = NodeState::Failed;
        }
        Ok(JoinReport {
            state,
            attempts: attempt,
        })
    }
}
