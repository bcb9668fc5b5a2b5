//! Store-and-forward messaging seams.
//!
//! ```text
//! EscrowActionEngine ── MessageTransport::send ──> network ──> MessageInbox
//!                                                                  │
//!                               InboxPoller ── InboundHandler <────┘
//! ```
//!
//! Delivery is at-least-once and unordered between peers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use escrow_types::{MarketplaceMessage, Result};

/// Acknowledgement returned by the transport after queuing a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendResponse {
    pub msgid: String,
    pub result: String,
}

/// A received message before it is decoded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboundMessage {
    pub msgid: String,
    pub from: String,
    pub to: String,
    pub received: DateTime<Utc>,
    pub text: String,
}

#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(
        &self,
        from: &str,
        to: &str,
        message: &MarketplaceMessage,
        encrypted: bool,
    ) -> Result<SendResponse>;
}

#[async_trait]
pub trait MessageInbox: Send + Sync {
    /// Messages not yet marked processed, oldest first.
    async fn fetch_unread(&self) -> Result<Vec<InboundMessage>>;

    async fn mark_processed(&self, msgid: &str) -> Result<()>;
}
