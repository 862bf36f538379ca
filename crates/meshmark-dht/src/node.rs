//! UDP overlay node
//!
//! A node binds one UDP socket that serves both roles: a background receive
//! loop answers requests from other nodes and routes responses back to
//! pending requests issued from this node. Bootstrap exchanges peer lists,
//! `set` replicates to every known peer best-effort, and `get` falls back to
//! a one-hop fan-out when the key is not held locally.

use crate::proto::{Envelope, Message};
use crate::storage::KeyValueStore;
use crate::{Dht, DhtError, Result};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Request ID counter, initialized with a random offset to avoid collisions
/// across instances created within the same process
static REQUEST_COUNTER: LazyLock<AtomicU64> = LazyLock::new(|| {
    let mut buf = [0u8; 8];
    // If getrandom fails, use current time as fallback
    if getrandom::getrandom(&mut buf).is_err() {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        return AtomicU64::new(ts);
    }
    AtomicU64::new(u64::from_le_bytes(buf))
});

fn next_request_id() -> u64 {
    REQUEST_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Default per-request timeout
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_millis(500);

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Message>>>>;

struct Running {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    peers: Arc<Mutex<HashSet<SocketAddr>>>,
    store: Arc<Mutex<KeyValueStore>>,
    pending: PendingMap,
    server: JoinHandle<()>,
}

/// A single overlay node bound to one local UDP port
pub struct UdpNode {
    op_timeout: Duration,
    inner: Option<Running>,
}

impl UdpNode {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_OP_TIMEOUT)
    }

    /// Create a node with a custom per-request timeout
    pub fn with_timeout(op_timeout: Duration) -> Self {
        Self {
            op_timeout,
            inner: None,
        }
    }

    /// Peers this node currently knows about
    pub fn known_peers(&self) -> Vec<SocketAddr> {
        match &self.inner {
            Some(inner) => inner.peers.lock().unwrap().iter().copied().collect(),
            None => Vec::new(),
        }
    }

    fn running(&self) -> Result<&Running> {
        self.inner.as_ref().ok_or(DhtError::NotListening)
    }

    /// Send a request and wait for the correlated response
    async fn request(&self, to: SocketAddr, message: Message) -> Result<Message> {
        let inner = self.running()?;
        let request_id = next_request_id();
        let (tx, rx) = oneshot::channel();
        inner.pending.lock().unwrap().insert(request_id, tx);

        let bytes = Envelope::new(request_id, message).to_bytes()?;
        if let Err(e) = inner.socket.send_to(&bytes, to).await {
            inner.pending.lock().unwrap().remove(&request_id);
            return Err(e.into());
        }

        match tokio::time::timeout(self.op_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            // Sender dropped (node stopping) or timer expired
            Ok(Err(_)) => Err(DhtError::Timeout(to)),
            Err(_) => {
                inner.pending.lock().unwrap().remove(&request_id);
                Err(DhtError::Timeout(to))
            }
        }
    }
}

impl Default for UdpNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Dht for UdpNode {
    async fn listen(&mut self, port: u16) -> Result<()> {
        let socket = UdpSocket::bind(("127.0.0.1", port))
            .await
            .map_err(|source| DhtError::Bind { port, source })?;
        let socket = Arc::new(socket);
        let local_addr = socket.local_addr()?;

        let peers = Arc::new(Mutex::new(HashSet::new()));
        let store = Arc::new(Mutex::new(KeyValueStore::new()));
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let server = tokio::spawn(serve(
            Arc::clone(&socket),
            local_addr,
            Arc::clone(&peers),
            Arc::clone(&store),
            Arc::clone(&pending),
        ));

        self.inner = Some(Running {
            socket,
            local_addr,
            peers,
            store,
            pending,
            server,
        });
        Ok(())
    }

    async fn bootstrap(&mut self, peers: &[SocketAddr]) -> Result<Vec<SocketAddr>> {
        let local_addr = self.running()?.local_addr;
        let mut contacted = Vec::new();

        for &peer in peers {
            match self.request(peer, Message::Ping).await {
                Ok(Message::Pong { peers: known }) => {
                    contacted.push(peer);
                    let inner = self.running()?;
                    let mut set = inner.peers.lock().unwrap();
                    if peer != local_addr {
                        set.insert(peer);
                    }
                    for addr in known {
                        if addr != local_addr {
                            set.insert(addr);
                        }
                    }
                }
                Ok(other) => {
                    tracing::debug!("unexpected bootstrap response from {}: {:?}", peer, other);
                }
                Err(DhtError::Timeout(_)) => {
                    tracing::warn!("bootstrap peer {} did not answer", peer);
                }
                Err(e) => return Err(e),
            }
        }

        if contacted.is_empty() && !peers.is_empty() {
            return Err(DhtError::Unreachable);
        }
        Ok(contacted)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let inner = self.running()?;
        inner
            .store
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());

        let peers: Vec<SocketAddr> = inner.peers.lock().unwrap().iter().copied().collect();
        for peer in peers {
            match self
                .request(
                    peer,
                    Message::Store {
                        key: key.to_string(),
                        value: value.to_string(),
                    },
                )
                .await
            {
                Ok(Message::StoreAck) => {}
                Ok(other) => {
                    tracing::debug!("unexpected store response from {}: {:?}", peer, other);
                }
                Err(DhtError::Timeout(_)) => {
                    tracing::warn!("replica {} did not acknowledge store of {}", peer, key);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let inner = self.running()?;
        if let Some(value) = inner.store.lock().unwrap().get(key).cloned() {
            return Ok(Some(value));
        }

        let peers: Vec<SocketAddr> = inner.peers.lock().unwrap().iter().copied().collect();
        for peer in peers {
            match self
                .request(
                    peer,
                    Message::Lookup {
                        key: key.to_string(),
                    },
                )
                .await
            {
                Ok(Message::LookupResult { value: Some(value) }) => return Ok(Some(value)),
                Ok(Message::LookupResult { value: None }) => {}
                Ok(other) => {
                    tracing::debug!("unexpected lookup response from {}: {:?}", peer, other);
                }
                Err(DhtError::Timeout(_)) => {
                    tracing::warn!("peer {} did not answer lookup of {}", peer, key);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    async fn stop(&mut self) {
        if let Some(inner) = self.inner.take() {
            // Await the aborted task so its socket handle is dropped before
            // the port is considered free again
            inner.server.abort();
            let _ = inner.server.await;
            // Wake any request still waiting for a response
            inner.pending.lock().unwrap().clear();
        }
    }
}

/// Receive loop: answers requests and routes responses to pending requests
async fn serve(
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    peers: Arc<Mutex<HashSet<SocketAddr>>>,
    store: Arc<Mutex<KeyValueStore>>,
    pending: PendingMap,
) {
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                tracing::debug!("receive loop on {} ended: {}", local_addr, e);
                return;
            }
        };

        let envelope = match Envelope::from_bytes(&buf[..len]) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!("dropping malformed datagram from {}: {}", from, e);
                continue;
            }
        };

        if envelope.message.is_response() {
            if let Some(tx) = pending.lock().unwrap().remove(&envelope.request_id) {
                let _ = tx.send(envelope.message);
            }
            continue;
        }

        let reply = match envelope.message {
            Message::Ping => {
                let mut set = peers.lock().unwrap();
                if from != local_addr {
                    set.insert(from);
                }
                Message::Pong {
                    peers: set.iter().copied().collect(),
                }
            }
            Message::Store { key, value } => {
                store.lock().unwrap().insert(key, value);
                Message::StoreAck
            }
            Message::Lookup { key } => Message::LookupResult {
                value: store.lock().unwrap().get(&key).cloned(),
            },
            // is_response() handled these above
            Message::Pong { .. } | Message::StoreAck | Message::LookupResult { .. } => continue,
        };

        match Envelope::new(envelope.request_id, reply).to_bytes() {
            Ok(bytes) => {
                if let Err(e) = socket.send_to(&bytes, from).await {
                    tracing::debug!("failed to reply to {}: {}", from, e);
                }
            }
            Err(e) => tracing::debug!("failed to encode reply to {}: {}", from, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn free_port() -> u16 {
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.local_addr().unwrap().port()
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[tokio::test]
    async fn test_self_bootstrap_contacts_self() {
        let port = free_port();
        let mut node = UdpNode::new();
        node.listen(port).await.unwrap();

        let contacted = node.bootstrap(&[addr(port)]).await.unwrap();
        assert_eq!(contacted, vec![addr(port)]);
        // A node is never its own peer
        assert!(node.known_peers().is_empty());

        node.stop().await;
    }

    #[tokio::test]
    async fn test_two_nodes_set_and_get() {
        let (port_a, port_b) = (free_port(), free_port());
        let mut a = UdpNode::new();
        let mut b = UdpNode::new();
        a.listen(port_a).await.unwrap();
        b.listen(port_b).await.unwrap();

        let contacted = b.bootstrap(&[addr(port_a)]).await.unwrap();
        assert_eq!(contacted, vec![addr(port_a)]);
        assert_eq!(b.known_peers(), vec![addr(port_a)]);

        // The ping taught A about B, so the set replicates to B
        a.set("key-1", "value-1").await.unwrap();
        assert_eq!(b.get("key-1").await.unwrap().as_deref(), Some("value-1"));

        // A lookup miss everywhere yields None, not an error
        assert_eq!(b.get("key-2").await.unwrap(), None);

        a.stop().await;
        b.stop().await;
    }

    #[tokio::test]
    async fn test_bootstrap_pong_carries_known_peers() {
        let (port_a, port_b, port_c) = (free_port(), free_port(), free_port());
        let mut a = UdpNode::new();
        let mut b = UdpNode::new();
        let mut c = UdpNode::new();
        a.listen(port_a).await.unwrap();
        b.listen(port_b).await.unwrap();
        c.listen(port_c).await.unwrap();

        b.bootstrap(&[addr(port_a)]).await.unwrap();
        c.bootstrap(&[addr(port_a)]).await.unwrap();

        // A had already learned B, so C learns it from the pong
        let mut peers = c.known_peers();
        peers.sort();
        let mut expected = vec![addr(port_a), addr(port_b)];
        expected.sort();
        assert_eq!(peers, expected);

        a.stop().await;
        b.stop().await;
        c.stop().await;
    }

    #[tokio::test]
    async fn test_bootstrap_unreachable_peer() {
        let port = free_port();
        let dead_port = free_port();
        let mut node = UdpNode::with_timeout(Duration::from_millis(50));
        node.listen(port).await.unwrap();

        let result = node.bootstrap(&[addr(dead_port)]).await;
        assert!(matches!(result, Err(DhtError::Unreachable)));

        node.stop().await;
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let port = free_port();
        let mut first = UdpNode::new();
        let mut second = UdpNode::new();
        first.listen(port).await.unwrap();

        let result = second.listen(port).await;
        assert!(matches!(result, Err(DhtError::Bind { port: p, .. }) if p == port));

        first.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_releases_port() {
        let port = free_port();
        let mut node = UdpNode::new();
        node.listen(port).await.unwrap();
        node.stop().await;
        node.stop().await;

        assert!(matches!(node.set("k", "v").await, Err(DhtError::NotListening)));
        assert!(matches!(node.get("k").await, Err(DhtError::NotListening)));

        // The port can be rebound by a fresh instance
        let mut fresh = UdpNode::new();
        fresh.listen(port).await.unwrap();
        fresh.stop().await;
    }
}
