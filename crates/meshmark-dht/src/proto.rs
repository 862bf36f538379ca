//! Wire protocol for the UDP overlay
//!
//! Every datagram carries one [`Envelope`]: a request id used to correlate
//! responses with pending requests, plus the message itself.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Join probe; the receiver records the sender as a peer
    Ping,
    /// Reply to [`Message::Ping`], carrying the receiver's known peers
    Pong { peers: Vec<SocketAddr> },
    /// Replicate a key/value pair to the receiver
    Store { key: String, value: String },
    /// Reply to [`Message::Store`]
    StoreAck,
    /// Ask the receiver for its local value under a key
    Lookup { key: String },
    /// Reply to [`Message::Lookup`]
    LookupResult { value: Option<String> },
}

impl Message {
    /// Whether this message is a reply routed to a pending request
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            Message::Pong { .. } | Message::StoreAck | Message::LookupResult { .. }
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub request_id: u64,
    pub message: Message,
}

impl Envelope {
    pub fn new(request_id: u64, message: Message) -> Self {
        Self {
            request_id,
            message,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
