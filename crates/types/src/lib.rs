//! Shared types for the marketplace escrow protocol.

pub mod artifact;
pub mod config;
pub mod error;
pub mod message;
pub mod model;
pub mod request;

pub use artifact::{RawTxArtifact, RawTxPhase};
pub use config::{EscrowConfig, SplitRatio};
pub use error::{ErrorKind, EscrowError, Result};
pub use message::{
    ActionRecord, EscrowMessage, EscrowPayload, EscrowPayloadType, LockInfo, MarketplaceEvent,
    MarketplaceMessage,
};
pub use model::{
    data_ids, Bid, BidAction, EscrowInfo, EscrowType, Listing, Order, OrderItem, OrderItemObject,
    OrderItemStatus,
};
pub use request::{EscrowAction, EscrowActionType, EscrowRequest};
