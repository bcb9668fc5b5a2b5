//! In-process message bus for tests and local simulations.
//!
//! Every sent message is appended to a shared log; each address reads its own
//! unread messages through an [`InMemoryInbox`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use escrow_types::{EscrowError, MarketplaceMessage, Result};

use crate::transport::{InboundMessage, MessageInbox, MessageTransport, SendResponse};

#[derive(Debug, Clone)]
struct Delivery {
    message: InboundMessage,
    encrypted: bool,
    processed: bool,
}

#[derive(Debug, Default)]
struct BusState {
    deliveries: Vec<Delivery>,
    offline: bool,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryBus {
    state: Arc<Mutex<BusState>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inbox view for one address.
    pub fn inbox(&self, address: impl Into<String>) -> InMemoryInbox {
        InMemoryInbox {
            bus: self.clone(),
            address: address.into(),
        }
    }

    /// Make subsequent sends fail until switched back.
    pub async fn set_offline(&self, offline: bool) {
        self.state.lock().await.offline = offline;
    }

    /// Inject a raw message, e.g. a non-escrow marketplace message.
    pub async fn deliver_raw(&self, from: &str, to: &str, text: impl Into<String>) -> String {
        let msgid = Uuid::new_v4().to_string();
        self.state.lock().await.deliveries.push(Delivery {
            message: InboundMessage {
                msgid: msgid.clone(),
                from: from.to_string(),
                to: to.to_string(),
                received: Utc::now(),
                text: text.into(),
            },
            encrypted: true,
            processed: false,
        });
        msgid
    }

    /// Mark a processed message unread again, simulating transport redelivery.
    pub async fn redeliver(&self, msgid: &str) -> bool {
        let mut state = self.state.lock().await;
        match state
            .deliveries
            .iter_mut()
            .find(|d| d.message.msgid == msgid)
        {
            Some(delivery) => {
                delivery.processed = false;
                true
            }
            None => false,
        }
    }

    /// All messages sent so far, decoded.
    pub async fn sent(&self) -> Vec<(InboundMessage, MarketplaceMessage)> {
        self.state
            .lock()
            .await
            .deliveries
            .iter()
            .filter_map(|d| {
                MarketplaceMessage::decode(&d.message.text)
                    .ok()
                    .flatten()
                    .map(|m| (d.message.clone(), m))
            })
            .collect()
    }

    pub async fn was_encrypted(&self, msgid: &str) -> Option<bool> {
        self.state
            .lock()
            .await
            .deliveries
            .iter()
            .find(|d| d.message.msgid == msgid)
            .map(|d| d.encrypted)
    }
}

#[async_trait]
impl MessageTransport for InMemoryBus {
    async fn send(
        &self,
        from: &str,
        to: &str,
        message: &MarketplaceMessage,
        encrypted: bool,
    ) -> Result<SendResponse> {
        let text = message.to_json()?;
        let mut state = self.state.lock().await;
        if state.offline {
            return Err(EscrowError::Transport("bus is offline".to_string()));
        }

        let msgid = Uuid::new_v4().to_string();
        state.deliveries.push(Delivery {
            message: InboundMessage {
                msgid: msgid.clone(),
                from: from.to_string(),
                to: to.to_string(),
                received: Utc::now(),
                text,
            },
            encrypted,
            processed: false,
        });

        Ok(SendResponse {
            msgid,
            result: "Sent.".to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct InMemoryInbox {
    bus: InMemoryBus,
    address: String,
}

#[async_trait]
impl MessageInbox for InMemoryInbox {
    async fn fetch_unread(&self) -> Result<Vec<InboundMessage>> {
        Ok(self
            .bus
            .state
            .lock()
            .await
            .deliveries
            .iter()
            .filter(|d| d.message.to == self.address && !d.processed)
            .map(|d| d.message.clone())
            .collect())
    }

    async fn mark_processed(&self, msgid: &str) -> Result<()> {
        let mut state = self.bus.state.lock().await;
        let delivery = state
            .deliveries
            .iter_mut()
            .find(|d| d.message.msgid == msgid && d.message.to == self.address)
            .ok_or_else(|| EscrowError::Transport(format!("unknown message {}", msgid)))?;
        delivery.processed = true;
        Ok(())
    }
}
