//! Commands accepted by the escrow engine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Protocol action identifier, as carried on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EscrowActionType {
    #[serde(rename = "MPA_LOCK")]
    Lock,
    #[serde(rename = "MPA_RELEASE")]
    Release,
    #[serde(rename = "MPA_REQUEST_REFUND")]
    RequestRefund,
    #[serde(rename = "MPA_REFUND")]
    Refund,
}

impl EscrowActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowActionType::Lock => "MPA_LOCK",
            EscrowActionType::Release => "MPA_RELEASE",
            EscrowActionType::RequestRefund => "MPA_REQUEST_REFUND",
            EscrowActionType::Refund => "MPA_REFUND",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "MPA_LOCK" => Some(EscrowActionType::Lock),
            "MPA_RELEASE" => Some(EscrowActionType::Release),
            "MPA_REQUEST_REFUND" => Some(EscrowActionType::RequestRefund),
            "MPA_REFUND" => Some(EscrowActionType::Refund),
            _ => None,
        }
    }
}

impl fmt::Display for EscrowActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action-specific fields of an [`EscrowRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowAction {
    Lock { nonce: Option<String> },
    Release,
    RequestRefund,
    Refund { accepted: bool },
}

impl EscrowAction {
    pub fn action_type(&self) -> EscrowActionType {
        match self {
            EscrowAction::Lock { .. } => EscrowActionType::Lock,
            EscrowAction::Release => EscrowActionType::Release,
            EscrowAction::RequestRefund => EscrowActionType::RequestRefund,
            EscrowAction::Refund { .. } => EscrowActionType::Refund,
        }
    }
}

/// A command against one order item. Transient, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowRequest {
    pub order_item_id: i64,
    pub action: EscrowAction,
    pub memo: String,
}

impl EscrowRequest {
    pub fn lock(order_item_id: i64, nonce: Option<String>, memo: impl Into<String>) -> Self {
        Self {
            order_item_id,
            action: EscrowAction::Lock { nonce },
            memo: memo.into(),
        }
    }

    pub fn release(order_item_id: i64, memo: impl Into<String>) -> Self {
        Self {
            order_item_id,
            action: EscrowAction::Release,
            memo: memo.into(),
        }
    }

    pub fn request_refund(order_item_id: i64, memo: impl Into<String>) -> Self {
        Self {
            order_item_id,
            action: EscrowAction::RequestRefund,
            memo: memo.into(),
        }
    }

    pub fn refund(order_item_id: i64, accepted: bool, memo: impl Into<String>) -> Self {
        Self {
            order_item_id,
            action: EscrowAction::Refund { accepted },
            memo: memo.into(),
        }
    }

    pub fn action_type(&self) -> EscrowActionType {
        self.action.action_type()
    }
}
