//! Meshmark DHT - a minimal UDP key-value overlay node
//!
//! This crate provides the node abstraction the benchmarking harness drives:
//! a five-operation interface (listen, bootstrap, set, get, stop) plus a
//! small real implementation over UDP. Values are replicated best-effort to
//! every known peer and lookups fan out one hop; there is no recursive
//! routing.

pub mod node;
pub mod proto;
pub mod storage;

use std::net::SocketAddr;
use thiserror::Error;

pub use node::UdpNode;

#[derive(Error, Debug)]
pub enum DhtError {
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        source: std::io::Error,
    },

    #[error("no bootstrap peer reachable")]
    Unreachable,

    #[error("timed out waiting for response from {0}")]
    Timeout(SocketAddr),

    #[error("node is not listening")]
    NotListening,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DhtError>;

/// The DHT node interface consumed by the harness
///
/// This trait abstracts over the overlay node, allowing for:
/// - The real UDP node in the benchmark binary
/// - Mock implementations for testing the orchestration logic
#[allow(async_fn_in_trait)]
pub trait Dht {
    /// Bind the given port and begin serving requests
    async fn listen(&mut self, port: u16) -> Result<()>;

    /// Contact the given peers to join the overlay
    ///
    /// Returns the subset of peers that answered. Fails with
    /// [`DhtError::Unreachable`] when none of a non-empty peer list answered.
    async fn bootstrap(&mut self, peers: &[SocketAddr]) -> Result<Vec<SocketAddr>>;

    /// Store a value under a key in the overlay
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Look up the value for a key, locally and then via known peers
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Release the node's socket and background task; idempotent
    async fn stop(&mut self);
}

pub mod mock {
    //! Mock DHT node for testing the harness without a network

    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Default behaviour when no scripted bootstrap outcome is queued
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum BootstrapBehavior {
        /// Succeed, echoing the peer list back as the contacted set
        Echo,
        /// Fail with [`DhtError::Unreachable`]
        Unreachable,
        /// Succeed with an empty contacted set
        Empty,
    }

    /// A scriptable in-memory DHT node
    pub struct MockDht {
        listening: Option<u16>,
        behavior: BootstrapBehavior,
        scripted: Mutex<VecDeque<Result<Vec<SocketAddr>>>>,
        bootstrap_calls: Mutex<Vec<Vec<SocketAddr>>>,
        set_calls: Mutex<Vec<(String, String)>>,
        get_calls: Mutex<Vec<String>>,
        store: Mutex<HashMap<String, String>>,
    }

    impl MockDht {
        /// Create a mock whose bootstraps succeed
        pub fn new() -> Self {
            Self::with_behavior(BootstrapBehavior::Echo)
        }

        /// Create a mock whose bootstraps fail with a transport error
        pub fn always_unreachable() -> Self {
            Self::with_behavior(BootstrapBehavior::Unreachable)
        }

        /// Create a mock whose bootstraps return an empty contacted set
        pub fn always_empty() -> Self {
            Self::with_behavior(BootstrapBehavior::Empty)
        }

        fn with_behavior(behavior: BootstrapBehavior) -> Self {
            Self {
                listening: None,
                behavior,
                scripted: Mutex::new(VecDeque::new()),
                bootstrap_calls: Mutex::new(Vec::new()),
                set_calls: Mutex::new(Vec::new()),
                get_calls: Mutex::new(Vec::new()),
                store: Mutex::new(HashMap::new()),
            }
        }

        /// Queue a one-shot bootstrap outcome, consumed before the default
        /// behaviour applies
        pub fn script_bootstrap(&self, outcome: Result<Vec<SocketAddr>>) {
            self.scripted.lock().unwrap().push_back(outcome);
        }

        /// Port passed to `listen`, if the node is currently listening
        pub fn listening_port(&self) -> Option<u16> {
            self.listening
        }

        /// Peer lists passed to `bootstrap`, in call order
        pub fn bootstrap_calls(&self) -> Vec<Vec<SocketAddr>> {
            self.bootstrap_calls.lock().unwrap().clone()
        }

        /// Key/value pairs passed to `set`, in call order
        pub fn set_calls(&self) -> Vec<(String, String)> {
            self.set_calls.lock().unwrap().clone()
        }

        /// Keys passed to `get`, in call order
        pub fn get_calls(&self) -> Vec<String> {
            self.get_calls.lock().unwrap().clone()
        }
    }

    impl Default for MockDht {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Dht for MockDht {
        async fn listen(&mut self, port: u16) -> Result<()> {
            self.listening = Some(port);
            Ok(())
        }

        async fn bootstrap(&mut self, peers: &[SocketAddr]) -> Result<Vec<SocketAddr>> {
            self.bootstrap_calls.lock().unwrap().push(peers.to_vec());
            if let Some(outcome) = self.scripted.lock().unwrap().pop_front() {
                return outcome;
            }
            match self.behavior {
                BootstrapBehavior::Echo => Ok(peers.to_vec()),
                BootstrapBehavior::Unreachable => Err(DhtError::Unreachable),
                BootstrapBehavior::Empty => Ok(Vec::new()),
            }
        }

        async fn set(&self, key: &str, value: &str) -> Result<()> {
            self.set_calls
                .lock()
                .unwrap()
                .push((key.to_string(), value.to_string()));
            self.store
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.get_calls.lock().unwrap().push(key.to_string());
            Ok(self.store.lock().unwrap().get(key).cloned())
        }

        async fn stop(&mut self) {
            self.listening = None;
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_scripted_outcomes_run_first() {
            let mut dht = MockDht::new();
            dht.script_bootstrap(Err(DhtError::Unreachable));

            let peer: SocketAddr = "127.0.0.1:9000".parse().unwrap();
            assert!(dht.bootstrap(&[peer]).await.is_err());

            // Script exhausted, default behaviour echoes the peer list
            let contacted = dht.bootstrap(&[peer]).await.unwrap();
            assert_eq!(contacted, vec![peer]);
            assert_eq!(dht.bootstrap_calls().len(), 2);
        }

        #[tokio::test]
        async fn test_mock_set_get_roundtrip() {
            let dht = MockDht::new();
            dht.set("key-1", "value-1").await.unwrap();
            assert_eq!(dht.get("key-1").await.unwrap().as_deref(), Some("value-1"));
            assert_eq!(dht.get("missing").await.unwrap(), None);
            assert_eq!(dht.set_calls().len(), 1);
            assert_eq!(dht.get_calls().len(), 2);
        }
    }
}
