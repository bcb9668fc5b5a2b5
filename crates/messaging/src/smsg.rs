//! Secure messaging (SMSG) transport over the daemon's JSON-RPC.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use escrow_bitcoin::BitcoinRpcClient;
use escrow_types::{EscrowError, MarketplaceMessage, Result};

use crate::transport::{InboundMessage, MessageInbox, MessageTransport, SendResponse};

pub struct SmsgTransport {
    rpc: Arc<BitcoinRpcClient>,
}

impl SmsgTransport {
    pub fn new(rpc: Arc<BitcoinRpcClient>) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl MessageTransport for SmsgTransport {
    async fn send(
        &self,
        from: &str,
        to: &str,
        message: &MarketplaceMessage,
        encrypted: bool,
    ) -> Result<SendResponse> {
        let text = message.to_json()?;

        let sent: Result<SmsgSendResult> = if encrypted {
            self.rpc
                .call("smsgsend", vec![json!(from), json!(to), json!(text)])
                .await
        } else {
            self.rpc
                .call("smsgsendanon", vec![json!(to), json!(text)])
                .await
        };
        let response =
            sent.map_err(|e| EscrowError::Transport(format!("smsg send failed: {}", e)))?;

        if !response.result.starts_with("Sent") {
            return Err(EscrowError::Transport(format!(
                "smsg send rejected: {}",
                response.result
            )));
        }

        info!(
            action = %message.mpaction.action_type(),
            from, to, msgid = %response.msgid,
            "Sent escrow message"
        );

        Ok(SendResponse {
            msgid: response.msgid,
            result: response.result,
        })
    }
}

#[async_trait]
impl MessageInbox for SmsgTransport {
    async fn fetch_unread(&self) -> Result<Vec<InboundMessage>> {
        let inbox: SmsgInbox = self
            .rpc
            .call(
                "smsginbox",
                vec![json!("unread"), json!(""), json!({ "updatestatus": false })],
            )
            .await
            .map_err(|e| EscrowError::Transport(format!("smsg inbox failed: {}", e)))?;

        debug!(count = inbox.messages.len(), "Fetched unread messages");

        Ok(inbox
            .messages
            .into_iter()
            .map(|m| InboundMessage {
                msgid: m.msgid,
                from: m.from,
                to: m.to,
                received: DateTime::from_timestamp(m.received, 0).unwrap_or_else(Utc::now),
                text: m.text,
            })
            .collect())
    }

    async fn mark_processed(&self, msgid: &str) -> Result<()> {
        let _: Value = self
            .rpc
            .call("smsg", vec![json!(msgid), json!({ "setread": true })])
            .await
            .map_err(|e| EscrowError::Transport(format!("smsg setread failed: {}", e)))?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SmsgSendResult {
    result: String,
    #[serde(default)]
    msgid: String,
}

#[derive(Debug, Deserialize)]
struct SmsgInbox {
    #[serde(default)]
    messages: Vec<SmsgMessage>,
}

#[derive(Debug, Deserialize)]
struct SmsgMessage {
    msgid: String,
    #[serde(default)]
    received: i64,
    from: String,
    to: String,
    text: String,
}
