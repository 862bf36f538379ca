//! Error types for the benchmarking harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("DHT error: {0}")]
    Dht(#[from] meshmark_dht::DhtError),

    #[error("get sample of {requested} nodes exceeds cluster size {cluster_size}")]
    Sampling {
        requested: usize,
        cluster_size: usize,
    },

    #[error("bootstrap candidate pool is empty")]
    EmptyCandidatePool,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BenchError>;
