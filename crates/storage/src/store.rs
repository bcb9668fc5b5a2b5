//! Persistence seams used by the escrow engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use escrow_types::{
    ActionRecord, EscrowActionType, Listing, Order, OrderItem, OrderItemObject, OrderItemStatus,
    Result,
};

#[async_trait]
pub trait OrderItemStore: Send + Sync {
    /// Load a fully hydrated order item.
    async fn get(&self, order_item_id: i64) -> Result<Option<OrderItem>>;

    async fn update_status(&self, order_item_id: i64, status: OrderItemStatus)
        -> Result<OrderItem>;
}

#[async_trait]
pub trait OrderItemObjectStore: Send + Sync {
    async fn find_by_data_id(
        &self,
        order_item_id: i64,
        data_id: &str,
    ) -> Result<Option<OrderItemObject>>;

    /// Overwrite an existing object in place.
    async fn update(&self, id: i64, data_id: &str, data_value: &str) -> Result<OrderItemObject>;

    /// Insert a new object. A second live object for the same key is an integrity violation.
    async fn create(
        &self,
        order_item_id: i64,
        data_id: &str,
        data_value: &str,
    ) -> Result<OrderItemObject>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_listing(&self, hash: &str) -> Result<Option<Listing>>;

    /// Orders containing `listing_hash` between `buyer` and `seller`.
    async fn find_orders(&self, listing_hash: &str, buyer: &str, seller: &str)
        -> Result<Vec<Order>>;

    async fn find_order_item(&self, order_id: i64, item_hash: &str) -> Result<Option<OrderItem>>;
}

/// Received action to append to the audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewActionRecord {
    pub action: EscrowActionType,
    pub listing_hash: String,
    pub sender: String,
    pub receiver: String,
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

#[async_trait]
pub trait ActionLogStore: Send + Sync {
    async fn record(&self, entry: NewActionRecord) -> Result<ActionRecord>;

    async fn find_by_listing(&self, listing_hash: &str) -> Result<Vec<ActionRecord>>;
}

/// Everything the engine reads and writes.
pub trait EscrowStore: OrderItemStore + OrderItemObjectStore + OrderStore + ActionLogStore {}

impl<T> EscrowStore for T where T: OrderItemStore + OrderItemObjectStore + OrderStore + ActionLogStore
{}
