//! Bridges the inbox poller to the engine.

use std::sync::Arc;

use async_trait::async_trait;
use escrow_messaging::{Dispatch, InboundHandler, InboundMessage};
use escrow_types::{MarketplaceEvent, MarketplaceMessage, Result};
use tracing::debug;

use crate::engine::EscrowActionEngine;

/// Decodes inbound text and hands escrow actions to the engine. Anything that
/// is not an escrow action is reported unhandled so it stays in the inbox.
pub struct EscrowEventRouter {
    engine: Arc<EscrowActionEngine>,
}

impl EscrowEventRouter {
    pub fn new(engine: Arc<EscrowActionEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl InboundHandler for EscrowEventRouter {
    async fn handle(&self, message: &InboundMessage) -> Result<Dispatch> {
        let Some(decoded) = MarketplaceMessage::decode(&message.text)? else {
            debug!(msgid = %message.msgid, "Not an escrow action");
            return Ok(Dispatch::Unhandled);
        };

        let event = MarketplaceEvent {
            msgid: message.msgid.clone(),
            from: message.from.clone(),
            to: message.to.clone(),
            received: message.received,
            message: decoded,
        };
        self.engine.process_event(&event).await?;

        Ok(Dispatch::Handled)
    }
}
