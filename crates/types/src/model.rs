//! Domain model read and written by the escrow protocol.
//!
//! These are hydrated views: an [`OrderItem`] carries its owning order, the
//! accepted bid, the referenced listing and the protocol scratch objects, so the
//! engine can make every decision from a single read.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EscrowError;

/// Keys used for [`OrderItemObject`] entries.
pub mod data_ids {
    /// Raw transaction artifact, overwritten at every protocol step.
    pub const RAWTX: &str = "rawtx";
    /// JSON array of the multisig participants' public keys.
    pub const PUBKEYS: &str = "pubkeys";
    /// Buyer's release/refund destination address.
    pub const ADDRESS: &str = "address";
    /// Multisig address created during lock.
    pub const ESCROW_ADDRESS: &str = "escrow_address";
}

/// Escrow protocol phase of one order line item.
///
/// ```text
/// AWAITING_ESCROW -> ESCROW_LOCKED -> SHIPPING  -> COMPLETE
///                                  \-> REFUNDING -> REFUNDED
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderItemStatus {
    AwaitingEscrow,
    EscrowLocked,
    Shipping,
    Complete,
    Refunding,
    Refunded,
}

impl OrderItemStatus {
    /// Position along the protocol; transitions never decrease it.
    pub fn rank(&self) -> u8 {
        match self {
            OrderItemStatus::AwaitingEscrow => 0,
            OrderItemStatus::EscrowLocked => 1,
            OrderItemStatus::Shipping | OrderItemStatus::Refunding => 2,
            OrderItemStatus::Complete | OrderItemStatus::Refunded => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderItemStatus::Complete | OrderItemStatus::Refunded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderItemStatus::AwaitingEscrow => "AWAITING_ESCROW",
            OrderItemStatus::EscrowLocked => "ESCROW_LOCKED",
            OrderItemStatus::Shipping => "SHIPPING",
            OrderItemStatus::Complete => "COMPLETE",
            OrderItemStatus::Refunding => "REFUNDING",
            OrderItemStatus::Refunded => "REFUNDED",
        }
    }
}

impl fmt::Display for OrderItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderItemStatus {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AWAITING_ESCROW" => Ok(OrderItemStatus::AwaitingEscrow),
            "ESCROW_LOCKED" => Ok(OrderItemStatus::EscrowLocked),
            "SHIPPING" => Ok(OrderItemStatus::Shipping),
            "COMPLETE" => Ok(OrderItemStatus::Complete),
            "REFUNDING" => Ok(OrderItemStatus::Refunding),
            "REFUNDED" => Ok(OrderItemStatus::Refunded),
            other => Err(EscrowError::Serialization(format!(
                "unknown order item status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BidAction {
    #[serde(rename = "MPA_BID")]
    Bid,
    #[serde(rename = "MPA_ACCEPT")]
    Accept,
    #[serde(rename = "MPA_REJECT")]
    Reject,
    #[serde(rename = "MPA_CANCEL")]
    Cancel,
}

impl BidAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BidAction::Bid => "MPA_BID",
            BidAction::Accept => "MPA_ACCEPT",
            BidAction::Reject => "MPA_REJECT",
            BidAction::Cancel => "MPA_CANCEL",
        }
    }
}

impl FromStr for BidAction {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MPA_BID" => Ok(BidAction::Bid),
            "MPA_ACCEPT" => Ok(BidAction::Accept),
            "MPA_REJECT" => Ok(BidAction::Reject),
            "MPA_CANCEL" => Ok(BidAction::Cancel),
            other => Err(EscrowError::Serialization(format!(
                "unknown bid action '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum EscrowType {
    /// Mutually assured destruction: both parties deposit.
    Mad,
    Multisig,
    Nop,
}

impl EscrowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowType::Mad => "MAD",
            EscrowType::Multisig => "MULTISIG",
            EscrowType::Nop => "NOP",
        }
    }
}

impl FromStr for EscrowType {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MAD" => Ok(EscrowType::Mad),
            "MULTISIG" => Ok(EscrowType::Multisig),
            "NOP" => Ok(EscrowType::Nop),
            other => Err(EscrowError::Serialization(format!(
                "unknown escrow type '{}'",
                other
            ))),
        }
    }
}

/// Escrow terms attached to a listing's payment information.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EscrowInfo {
    pub id: i64,
    pub escrow_type: EscrowType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Listing {
    pub hash: String,
    /// Seller's messaging address.
    pub seller: String,
    /// Set when the listing was published from a local template, i.e. we are the seller.
    pub template_id: Option<i64>,
    pub escrow: Option<EscrowInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bid {
    pub id: i64,
    pub action: BidAction,
    pub bidder: String,
    pub listing: Listing,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Order {
    pub id: i64,
    pub buyer: String,
    pub seller: String,
}

/// Typed key/value attribute attached to an order item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderItemObject {
    pub id: i64,
    pub order_item_id: i64,
    pub data_id: String,
    pub data_value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderItem {
    pub id: i64,
    pub item_hash: String,
    pub status: OrderItemStatus,
    pub order: Order,
    pub bid: Bid,
    pub objects: Vec<OrderItemObject>,
}

impl OrderItem {
    pub fn object(&self, data_id: &str) -> Option<&OrderItemObject> {
        self.objects.iter().find(|o| o.data_id == data_id)
    }

    /// Role is derived on every call from template ownership, never cached.
    pub fn is_seller(&self) -> bool {
        self.bid.listing.template_id.is_some()
    }

    pub fn escrow(&self) -> Option<&EscrowInfo> {
        self.bid.listing.escrow.as_ref()
    }
}
