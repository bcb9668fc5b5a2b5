//! Wire messages exchanged between buyer and seller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::request::EscrowActionType;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EscrowPayloadType {
    Lock,
    Release,
    RequestRefund,
    Refund,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EscrowPayload {
    #[serde(rename = "type")]
    pub kind: EscrowPayloadType,
    pub rawtx: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockInfo {
    #[serde(default)]
    pub memo: String,
}

/// Marketplace escrow action. The `action` tag selects the variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action")]
pub enum EscrowMessage {
    #[serde(rename = "MPA_LOCK")]
    Lock {
        item: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nonce: Option<String>,
        #[serde(default)]
        info: LockInfo,
        escrow: EscrowPayload,
    },
    #[serde(rename = "MPA_RELEASE")]
    Release {
        item: String,
        #[serde(default)]
        memo: String,
        escrow: EscrowPayload,
    },
    #[serde(rename = "MPA_REQUEST_REFUND")]
    RequestRefund {
        item: String,
        #[serde(default)]
        memo: String,
        escrow: EscrowPayload,
    },
    #[serde(rename = "MPA_REFUND")]
    Refund {
        item: String,
        accepted: bool,
        #[serde(default)]
        memo: String,
        escrow: EscrowPayload,
    },
}

impl EscrowMessage {
    pub fn action_type(&self) -> EscrowActionType {
        match self {
            EscrowMessage::Lock { .. } => EscrowActionType::Lock,
            EscrowMessage::Release { .. } => EscrowActionType::Release,
            EscrowMessage::RequestRefund { .. } => EscrowActionType::RequestRefund,
            EscrowMessage::Refund { .. } => EscrowActionType::Refund,
        }
    }

    /// Listing hash the action refers to.
    pub fn item(&self) -> &str {
        match self {
            EscrowMessage::Lock { item, .. }
            | EscrowMessage::Release { item, .. }
            | EscrowMessage::RequestRefund { item, .. }
            | EscrowMessage::Refund { item, .. } => item,
        }
    }

    pub fn escrow(&self) -> &EscrowPayload {
        match self {
            EscrowMessage::Lock { escrow, .. }
            | EscrowMessage::Release { escrow, .. }
            | EscrowMessage::RequestRefund { escrow, .. }
            | EscrowMessage::Refund { escrow, .. } => escrow,
        }
    }

    pub fn rawtx(&self) -> &str {
        &self.escrow().rawtx
    }
}

/// Envelope handed to the message transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarketplaceMessage {
    pub version: String,
    pub mpaction: EscrowMessage,
}

impl MarketplaceMessage {
    pub fn new(version: impl Into<String>, mpaction: EscrowMessage) -> Self {
        Self {
            version: version.into(),
            mpaction,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a received message body.
    ///
    /// Returns `Ok(None)` for text that is not JSON and for marketplace messages
    /// whose action is not an escrow action (listings, bids, ...); those belong to
    /// other consumers. A malformed escrow action is an error.
    pub fn decode(text: &str) -> Result<Option<Self>> {
        let Ok(value) = serde_json::from_str::<Value>(text) else {
            return Ok(None);
        };
        let action = value
            .get("mpaction")
            .and_then(|a| a.get("action"))
            .and_then(Value::as_str);

        match action.and_then(EscrowActionType::from_wire) {
            Some(_) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }
}

/// An inbound escrow message together with its transport metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarketplaceEvent {
    pub msgid: String,
    pub from: String,
    pub to: String,
    pub received: DateTime<Utc>,
    pub message: MarketplaceMessage,
}

/// Audit record of a received escrow action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionRecord {
    pub id: i64,
    pub action: EscrowActionType,
    pub listing_hash: String,
    pub sender: String,
    pub receiver: String,
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lock_message_wire_shape() {
        let msg = EscrowMessage::Lock {
            item: "abc".to_string(),
            nonce: Some("n1".to_string()),
            info: LockInfo {
                memo: "hello".to_string(),
            },
            escrow: EscrowPayload {
                kind: EscrowPayloadType::Lock,
                rawtx: "txid".to_string(),
            },
        };

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "action": "MPA_LOCK",
                "item": "abc",
                "nonce": "n1",
                "info": { "memo": "hello" },
                "escrow": { "type": "lock", "rawtx": "txid" }
            })
        );
    }

    #[test]
    fn test_decode_skips_non_escrow_actions() {
        let listing = json!({
            "version": "0.0.1.0",
            "mpaction": { "action": "MP_ITEM_ADD", "item": {} }
        });
        assert!(MarketplaceMessage::decode(&listing.to_string())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_decode_refund_message() {
        let refund = json!({
            "version": "0.0.1.0",
            "mpaction": {
                "action": "MPA_REFUND",
                "item": "hash",
                "accepted": true,
                "memo": "sorry",
                "escrow": { "type": "refund", "rawtx": "beef" }
            }
        });
        let msg = MarketplaceMessage::decode(&refund.to_string())
            .unwrap()
            .unwrap();
        assert_eq!(msg.mpaction.action_type(), EscrowActionType::Refund);
        assert_eq!(msg.mpaction.item(), "hash");
        assert_eq!(msg.mpaction.rawtx(), "beef");
    }

    #[test]
    fn test_decode_ignores_plain_text_and_rejects_malformed_escrow() {
        assert!(MarketplaceMessage::decode("not json").unwrap().is_none());

        let missing_escrow = json!({
            "version": "0.0.1.0",
            "mpaction": { "action": "MPA_LOCK", "item": "hash" }
        });
        assert!(MarketplaceMessage::decode(&missing_escrow.to_string()).is_err());
    }
}
